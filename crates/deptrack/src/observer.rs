#![forbid(unsafe_code)]

//! Container observers and property interceptors.
//!
//! An [`Observer`] is attached to exactly one container. It owns the
//! container's shape dependency (keys added/removed, sequence structure
//! changed) and, at construction, recursively instruments what the container
//! currently holds:
//!
//! - objects: an interceptor is installed on every enumerable own key;
//! - sequences: every element is observed (elements themselves are not
//!   intercepted, see [`crate::array`]).
//!
//! Keys added to an observed object *after* construction by plain assignment
//! are not intercepted. Only [`crate::set_property`] adds an observed key
//! after the fact. Dependents may rely on this, so it is kept as-is.
//!
//! # Interceptor semantics
//!
//! A read resolves the logical value (through a pre-existing getter, or the
//! stored value). With an active subscriber it then records the read on the
//! property's dependency, on the nested container's shape dependency when the
//! value is observed, and on every nested element's shape dependency when the
//! value is a sequence.
//!
//! A write is a no-op when the new value is identical to the current one, or
//! both are NaN. Otherwise the value is applied (through a pre-existing setter
//! or the stored slot), observed if it is a plain container (unless
//! `shallow`), and the property's dependency is notified.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::active;
use crate::array::ArrayRef;
use crate::config::config;
use crate::dep::Dep;
use crate::object::{Getter, ObjectRef, Setter};
use crate::registry::observe;
use crate::value::{Container, Value, WeakContainer};

/// Total number of observers ever attached.
static OBSERVERS_CREATED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total number of observers attached (for diagnostics/telemetry).
#[must_use]
pub fn observers_created_total() -> u64 {
    OBSERVERS_CREATED_TOTAL.load(Ordering::Relaxed)
}

/// Hook run before an intercepted write applies a changed value.
pub type CustomSetter = Rc<dyn Fn(&Value)>;

/// Options for [`define_reactive_with`].
#[derive(Clone, Default)]
pub struct ReactiveOptions {
    /// Runs on every changing write while development warnings are enabled.
    pub custom_setter: Option<CustomSetter>,
    /// Do not observe the value (neither at install time nor on write).
    pub shallow: bool,
}

impl ReactiveOptions {
    #[must_use]
    pub fn shallow() -> Self {
        Self {
            shallow: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_custom_setter(mut self, hook: impl Fn(&Value) + 'static) -> Self {
        self.custom_setter = Some(Rc::new(hook));
        self
    }
}

/// Per-container observer.
///
/// Reachable from its container through [`Value::observer`]; there is at most
/// one per container.
pub struct Observer {
    dep: Rc<Dep>,
    root_count: Cell<usize>,
    value: WeakContainer,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("root_count", &self.root_count.get())
            .finish()
    }
}

impl Observer {
    /// Attach a new observer to `container` and instrument its contents.
    ///
    /// The marker is attached before walking so self-referencing structures
    /// terminate.
    pub(crate) fn attach(container: &Container) -> Rc<Self> {
        let observer = Rc::new(Self {
            dep: Dep::new(),
            root_count: Cell::new(0),
            value: container.downgrade(),
        });
        container.attach_observer(Rc::clone(&observer));
        OBSERVERS_CREATED_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            target: "deptrack::observer",
            container = container.id().raw(),
            dep = observer.dep.id().raw(),
            "observer.attach"
        );

        match container {
            Container::Array(arr) => observe_array(&arr.to_vec()),
            Container::Object(obj) => walk(obj),
        }
        observer
    }

    /// The shape dependency of the observed container.
    #[must_use]
    pub fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }

    /// The observed container, while it is alive.
    #[must_use]
    pub fn value(&self) -> Option<Container> {
        self.value.upgrade()
    }

    /// How many root bindings reference this container.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }

    /// Whether the container is bound as a subscriber's root state.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.root_count.get() > 0
    }

    pub(crate) fn add_root_binding(&self) {
        self.root_count.set(self.root_count.get() + 1);
    }

    /// Record a read of the whole container by the active subscriber.
    ///
    /// For a sequence this also records reads of every nested element, since
    /// index reads are not intercepted.
    pub fn depend(&self) {
        if !active::has_active_subscriber() {
            return;
        }
        self.dep.depend();
        if let Some(Container::Array(arr)) = self.value() {
            depend_array(&arr);
        }
    }
}

fn walk(obj: &ObjectRef) {
    for key in obj.keys() {
        let value = active::untracked(|| obj.get(&key));
        define_reactive(obj, &key, value);
    }
}

/// Observe each of `items`.
pub(crate) fn observe_array(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Record reads of every element's shape dependency, recursing into nested
/// sequences.
pub fn depend_array(arr: &ArrayRef) {
    for item in arr.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

/// An installed property interceptor.
pub(crate) struct ReactiveSlot {
    dep: Rc<Dep>,
    value: RefCell<Value>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    child: RefCell<Option<Rc<Observer>>>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
}

impl ReactiveSlot {
    fn current(&self) -> Value {
        match &self.getter {
            Some(get) => get(),
            None => self.value.borrow().clone(),
        }
    }

    pub(crate) fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }

    pub(crate) fn get(&self) -> Value {
        let value = self.current();
        if active::has_active_subscriber() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep().depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
        value
    }

    pub(crate) fn set(&self, new_value: Value) {
        let current = self.current();
        if new_value == current || (new_value.is_nan() && current.is_nan()) {
            return;
        }
        if let Some(hook) = &self.custom_setter
            && config().dev_warnings
        {
            hook(&new_value);
        }
        match &self.setter {
            Some(set) => set(new_value.clone()),
            None => *self.value.borrow_mut() = new_value.clone(),
        }
        let child = if self.shallow {
            None
        } else {
            observe(&new_value, false)
        };
        *self.child.borrow_mut() = child;
        self.dep.notify();
    }
}

/// Install an interceptor for `key` on `obj`, holding `value`.
///
/// Returns whether the interceptor was installed.
pub fn define_reactive(obj: &ObjectRef, key: &str, value: Value) -> bool {
    define_reactive_with(obj, key, value, ReactiveOptions::default())
}

/// Install an interceptor for `key` on `obj` with explicit options.
///
/// Leaves a non-configurable property untouched. A pre-existing getter/setter
/// (including an interceptor installed earlier) is wrapped rather than
/// replaced. A new key on a non-extensible object is skipped. Returns `false`
/// when nothing was installed.
pub fn define_reactive_with(
    obj: &ObjectRef,
    key: &str,
    value: Value,
    options: ReactiveOptions,
) -> bool {
    let existing = obj.existing_property(key);
    if let Some(prop) = &existing
        && !prop.configurable
    {
        tracing::trace!(
            target: "deptrack::observer",
            container = obj.id().raw(),
            key,
            "non-configurable property left untouched"
        );
        return false;
    }
    let (getter, setter) = existing
        .map(|prop| (prop.getter, prop.setter))
        .unwrap_or_default();

    let child = if options.shallow {
        None
    } else {
        observe(&value, false)
    };
    let slot = Rc::new(ReactiveSlot {
        dep: Dep::new(),
        value: RefCell::new(value),
        getter,
        setter,
        child: RefCell::new(child),
        custom_setter: options.custom_setter,
        shallow: options.shallow,
    });
    let dep = slot.dep().id();
    let installed = obj.install_reactive(key, slot);
    if installed {
        tracing::trace!(
            target: "deptrack::observer",
            container = obj.id().raw(),
            key,
            dep = dep.raw(),
            "interceptor.install"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep::Subscriber;
    use crate::object::PropertyDescriptor;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        notified: Cell<u32>,
    }

    impl Subscriber for Counter {
        fn register_dependency(&self, _dep: &Rc<Dep>) {}
        fn notify_of_change(&self) {
            self.notified.set(self.notified.get() + 1);
        }
    }

    fn counter() -> (Rc<Counter>, Rc<dyn Subscriber>) {
        let counter = Rc::new(Counter::default());
        let sub: Rc<dyn Subscriber> = counter.clone();
        (counter, sub)
    }

    fn observed(doc: serde_json::Value) -> (Value, Rc<Observer>) {
        let value = Value::from(doc);
        let observer = observe(&value, false).expect("plain container is observable");
        (value, observer)
    }

    #[test]
    fn walk_installs_interceptors_on_every_key() {
        let (value, _) = observed(json!({"a": 1, "b": {"c": 2}}));
        let obj = value.as_object().unwrap();
        assert!(obj.is_reactive("a"));
        assert!(obj.is_reactive("b"));
        let nested = obj.get("b");
        assert!(nested.observer().is_some());
        assert!(nested.as_object().unwrap().is_reactive("c"));
    }

    #[test]
    fn read_then_write_notifies_once() {
        let (value, _) = observed(json!({"a": 1}));
        let obj = value.as_object().unwrap();
        let (counter, sub) = counter();

        let read = active::with_active_subscriber(&sub, || obj.get("a"));
        assert_eq!(read, Value::from(1));

        obj.set("a", Value::from(2));
        assert_eq!(counter.notified.get(), 1);
        obj.set("a", Value::from(2));
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn nan_over_nan_is_unchanged() {
        let obj = ObjectRef::new();
        define_reactive(&obj, "n", Value::from(f64::NAN));
        let (counter, sub) = counter();
        active::with_active_subscriber(&sub, || obj.get("n"));

        obj.set("n", Value::from(f64::NAN));
        assert_eq!(counter.notified.get(), 0);
        obj.set("n", Value::from(1));
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn read_outside_subscriber_records_nothing() {
        let (value, _) = observed(json!({"a": 1}));
        let obj = value.as_object().unwrap();
        let (counter, _sub) = counter();
        let _ = obj.get("a");
        obj.set("a", Value::from(5));
        assert_eq!(counter.notified.get(), 0);
    }

    #[test]
    fn nested_read_depends_on_child_shape() {
        let (value, _) = observed(json!({"inner": {"x": 1}}));
        let obj = value.as_object().unwrap();
        let (counter, sub) = counter();
        let inner = active::with_active_subscriber(&sub, || obj.get("inner"));

        inner.observer().unwrap().dep().notify();
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn sequence_read_depends_on_nested_elements() {
        let (value, _) = observed(json!({"rows": [{"id": 1}, [{"id": 2}]]}));
        let obj = value.as_object().unwrap();
        let (counter, sub) = counter();
        let rows = active::with_active_subscriber(&sub, || obj.get("rows"));
        let rows = rows.as_array().unwrap();

        rows.get(0).observer().unwrap().dep().notify();
        assert_eq!(counter.notified.get(), 1);

        let deep = rows.get(1).as_array().unwrap().get(0);
        deep.observer().unwrap().dep().notify();
        assert_eq!(counter.notified.get(), 2);
    }

    #[test]
    fn written_container_is_observed_lazily() {
        let (value, _) = observed(json!({"slot": null}));
        let obj = value.as_object().unwrap();
        let fresh = Value::from(json!({"k": 1}));
        assert!(fresh.observer().is_none());

        obj.set("slot", fresh.clone());
        assert!(fresh.observer().is_some());
    }

    #[test]
    fn shallow_does_not_observe() {
        let obj = ObjectRef::new();
        let child = Value::from(json!({"k": 1}));
        define_reactive_with(&obj, "child", child.clone(), ReactiveOptions::shallow());
        assert!(child.observer().is_none());

        let next = Value::from(json!({"k": 2}));
        obj.set("child", next.clone());
        assert!(next.observer().is_none());
    }

    #[test]
    fn non_configurable_is_left_untouched() {
        let obj = ObjectRef::new();
        obj.define_property("frozen", PropertyDescriptor::data(1).non_configurable());
        assert!(!define_reactive(&obj, "frozen", Value::from(1)));
        assert!(!obj.is_reactive("frozen"));
    }

    #[test]
    fn pre_existing_accessor_is_wrapped() {
        let backing = Rc::new(RefCell::new(Value::from(1)));
        let read = Rc::clone(&backing);
        let write = Rc::clone(&backing);
        let obj = ObjectRef::new();
        obj.define_accessor(
            "x",
            move || read.borrow().clone(),
            move |v| *write.borrow_mut() = v,
        );
        assert!(define_reactive(&obj, "x", Value::from(1)));
        assert!(obj.is_reactive("x"));

        let (counter, sub) = counter();
        assert_eq!(
            active::with_active_subscriber(&sub, || obj.get("x")),
            Value::from(1)
        );
        obj.set("x", Value::from(3));
        assert_eq!(*backing.borrow(), Value::from(3));
        assert_eq!(obj.get("x"), Value::from(3));
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn custom_setter_runs_on_change_only() {
        let calls = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&calls);
        let obj = ObjectRef::new();
        define_reactive_with(
            &obj,
            "p",
            Value::from(1),
            ReactiveOptions::default().with_custom_setter(move |_| seen.set(seen.get() + 1)),
        );
        obj.set("p", Value::from(1));
        assert_eq!(calls.get(), 0);
        obj.set("p", Value::from(2));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn custom_setter_skipped_without_dev_warnings() {
        use crate::config::{ObserverConfig, set_config};

        let calls = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&calls);
        let obj = ObjectRef::new();
        define_reactive_with(
            &obj,
            "p",
            Value::from(1),
            ReactiveOptions::default().with_custom_setter(move |_| seen.set(seen.get() + 1)),
        );
        let (counter, sub) = counter();
        active::with_active_subscriber(&sub, || obj.get("p"));

        let previous = set_config(ObserverConfig::default().with_dev_warnings(false));
        obj.set("p", Value::from(2));
        set_config(previous);

        assert_eq!(calls.get(), 0);
        assert_eq!(obj.get("p"), Value::from(2));
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn should_convert_toggle_gates_observation() {
        use crate::config::set_should_convert;

        let (value, _) = observed(json!({"slot": null}));
        let obj = value.as_object().unwrap();

        assert!(set_should_convert(false));
        let skipped = Value::from(json!({"k": 1}));
        obj.set("slot", skipped.clone());
        assert!(observe(&Value::from(json!({})), false).is_none());
        assert!(!set_should_convert(true));

        assert!(skipped.observer().is_none());
        let converted = Value::from(json!({"k": 2}));
        obj.set("slot", converted.clone());
        assert!(converted.observer().is_some());
    }

    #[test]
    fn self_referencing_object_terminates() {
        let obj = ObjectRef::new();
        obj.set("me", Value::from(obj.clone()));
        let value = Value::from(obj.clone());
        let observer = observe(&value, false).unwrap();
        assert!(obj.is_reactive("me"));
        assert!(Rc::ptr_eq(&observer, &obj.get("me").observer().unwrap()));
        // Break the cycle so the object can drop.
        obj.delete("me");
    }

    #[test]
    fn whole_container_depend() {
        let (value, observer) = observed(json!([{"a": 1}]));
        let (counter, sub) = counter();
        active::with_active_subscriber(&sub, || observer.depend());
        assert!(observer.dep().has_subscriber(&sub));

        let first = value.as_array().unwrap().get(0);
        first.observer().unwrap().dep().notify();
        assert_eq!(counter.notified.get(), 1);
    }

    #[test]
    fn observer_counter_advances() {
        let before = observers_created_total();
        let _ = observed(json!({"a": {"b": []}}));
        assert!(observers_created_total() >= before + 3);
    }
}
