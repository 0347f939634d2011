#![forbid(unsafe_code)]

//! Key/value containers.
//!
//! [`ObjectRef`] is a shared handle to an insertion-ordered property table.
//! Each property carries a descriptor (enumerable, configurable, writable) and
//! a slot that is one of:
//!
//! - a plain data value,
//! - a pre-existing accessor (getter/setter closures supplied by the host),
//! - an installed property interceptor (see [`crate::observer`]).
//!
//! Plain assignment through [`ObjectRef::set`] fires an interceptor's setter
//! when one is installed. Assigning a key the object does not have yet adds a
//! plain, non-reactive property even when the object is observed; use
//! [`crate::set_property`] to add an observed key after the fact.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::observer::{Observer, ReactiveSlot};
use crate::value::{ContainerId, Value};

/// Reader of an accessor property.
pub type Getter = Rc<dyn Fn() -> Value>;

/// Writer of an accessor property.
pub type Setter = Rc<dyn Fn(Value)>;

type PropertyTable = IndexMap<String, Property, ahash::RandomState>;

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
    Reactive(Rc<ReactiveSlot>),
}

#[derive(Clone)]
pub(crate) struct Property {
    slot: Slot,
    enumerable: bool,
    configurable: bool,
    writable: bool,
}

/// What an interceptor install needs to know about an existing property.
pub(crate) struct ExistingProperty {
    pub(crate) configurable: bool,
    pub(crate) getter: Option<Getter>,
    pub(crate) setter: Option<Setter>,
}

/// Attributes for [`ObjectRef::define_property`].
#[derive(Clone)]
pub struct PropertyDescriptor {
    slot: Slot,
    enumerable: bool,
    configurable: bool,
    writable: bool,
}

impl PropertyDescriptor {
    /// An enumerable, configurable, writable data property.
    #[must_use]
    pub fn data(value: impl Into<Value>) -> Self {
        Self {
            slot: Slot::Data(value.into()),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    /// An enumerable, configurable accessor property.
    #[must_use]
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self {
            slot: Slot::Accessor { get, set },
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    /// Forbid redefinition and deletion.
    #[must_use]
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    /// Hide the property from [`ObjectRef::keys`].
    #[must_use]
    pub fn non_enumerable(mut self) -> Self {
        self.enumerable = false;
        self
    }

    /// Ignore plain assignment to a data property.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

struct ObjectData {
    id: ContainerId,
    props: RefCell<PropertyTable>,
    extensible: Cell<bool>,
    instance: bool,
    observer: RefCell<Option<Rc<Observer>>>,
}

/// Shared handle to a key/value container.
///
/// Cloning an `ObjectRef` creates a new handle to the **same** object.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectData>);

/// Non-owning handle to an object.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectData>);

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakObjectRef")
    }
}

enum Read {
    Value(Value),
    Accessor(Option<Getter>),
    Reactive(Rc<ReactiveSlot>),
}

enum Write {
    Done,
    Accessor(Option<Setter>),
    Reactive(Rc<ReactiveSlot>),
}

impl ObjectRef {
    fn with_kind(instance: bool) -> Self {
        Self(Rc::new(ObjectData {
            id: ContainerId::next(),
            props: RefCell::new(PropertyTable::default()),
            extensible: Cell::new(true),
            instance,
            observer: RefCell::new(None),
        }))
    }

    /// A new, empty plain object.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(false)
    }

    /// A new object flagged as a framework instance. Instances are never
    /// observed and structural mutations on them are refused with a warning.
    #[must_use]
    pub fn instance() -> Self {
        Self::with_kind(true)
    }

    /// A plain object holding `entries` as data properties, in order.
    #[must_use]
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let obj = Self::new();
        {
            let mut props = obj.0.props.borrow_mut();
            for (key, value) in entries {
                props.insert(
                    key.into(),
                    Property {
                        slot: Slot::Data(value),
                        enumerable: true,
                        configurable: true,
                        writable: true,
                    },
                );
            }
        }
        obj
    }

    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn is_instance(&self) -> bool {
        self.0.instance
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Forbid adding new properties.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    /// Forbid adding, removing, or redefining properties, and make data
    /// properties read-only. Installed interceptors keep working.
    pub fn freeze(&self) {
        self.prevent_extensions();
        for prop in self.0.props.borrow_mut().values_mut() {
            prop.configurable = false;
            prop.writable = false;
        }
    }

    /// The observer attached to this object, if it has been observed.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Enumerable own keys, in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0
            .props
            .borrow()
            .iter()
            .filter(|(_, prop)| prop.enumerable)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of own properties, enumerable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.props.borrow().is_empty()
    }

    /// Read `key`. Reads through an installed interceptor are tracked.
    pub fn get(&self, key: &str) -> Value {
        let read = {
            let props = self.0.props.borrow();
            match props.get(key).map(|prop| &prop.slot) {
                None => Read::Value(Value::Undefined),
                Some(Slot::Data(value)) => Read::Value(value.clone()),
                Some(Slot::Accessor { get, .. }) => Read::Accessor(get.clone()),
                Some(Slot::Reactive(slot)) => Read::Reactive(Rc::clone(slot)),
            }
        };
        match read {
            Read::Value(value) => value,
            Read::Accessor(Some(get)) => get(),
            Read::Accessor(None) => Value::Undefined,
            Read::Reactive(slot) => slot.get(),
        }
    }

    /// Plain assignment of `key`.
    ///
    /// An installed interceptor's setter fires. A missing key is added as a
    /// plain data property if the object is extensible; otherwise the write
    /// is ignored, as are writes to read-only data properties.
    pub fn set(&self, key: &str, value: Value) {
        let write = {
            let mut props = self.0.props.borrow_mut();
            match props.get_mut(key) {
                Some(prop) => match &mut prop.slot {
                    Slot::Data(current) => {
                        if prop.writable {
                            *current = value.clone();
                        }
                        Write::Done
                    }
                    Slot::Accessor { set, .. } => Write::Accessor(set.clone()),
                    Slot::Reactive(slot) => Write::Reactive(Rc::clone(slot)),
                },
                None => {
                    if self.0.extensible.get() {
                        props.insert(
                            key.to_string(),
                            Property {
                                slot: Slot::Data(value.clone()),
                                enumerable: true,
                                configurable: true,
                                writable: true,
                            },
                        );
                    }
                    Write::Done
                }
            }
        };
        match write {
            Write::Done | Write::Accessor(None) => {}
            Write::Accessor(Some(set)) => set(value),
            Write::Reactive(slot) => slot.set(value),
        }
    }

    /// Plain delete of `key`; never notifies.
    ///
    /// Returns `false` only when the property exists and is non-configurable.
    pub fn delete(&self, key: &str) -> bool {
        let mut props = self.0.props.borrow_mut();
        match props.get(key) {
            Some(prop) if !prop.configurable => false,
            Some(_) => {
                props.shift_remove(key);
                true
            }
            None => true,
        }
    }

    /// Define or redefine `key`.
    ///
    /// Returns `false` without changing anything if the existing property is
    /// non-configurable, or if the key is new and the object is not
    /// extensible.
    pub fn define_property(&self, key: &str, descriptor: PropertyDescriptor) -> bool {
        let mut props = self.0.props.borrow_mut();
        match props.get_mut(key) {
            Some(prop) if !prop.configurable => false,
            Some(prop) => {
                *prop = Property {
                    slot: descriptor.slot,
                    enumerable: descriptor.enumerable,
                    configurable: descriptor.configurable,
                    writable: descriptor.writable,
                };
                true
            }
            None if !self.0.extensible.get() => false,
            None => {
                props.insert(
                    key.to_string(),
                    Property {
                        slot: descriptor.slot,
                        enumerable: descriptor.enumerable,
                        configurable: descriptor.configurable,
                        writable: descriptor.writable,
                    },
                );
                true
            }
        }
    }

    /// Define `key` as an enumerable, configurable accessor property.
    pub fn define_accessor(
        &self,
        key: &str,
        get: impl Fn() -> Value + 'static,
        set: impl Fn(Value) + 'static,
    ) -> bool {
        self.define_property(
            key,
            PropertyDescriptor::accessor(Some(Rc::new(get)), Some(Rc::new(set))),
        )
    }

    /// Whether `key` currently holds an installed interceptor.
    #[must_use]
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(
            self.0.props.borrow().get(key).map(|prop| &prop.slot),
            Some(Slot::Reactive(_))
        )
    }

    pub(crate) fn existing_property(&self, key: &str) -> Option<ExistingProperty> {
        let props = self.0.props.borrow();
        let prop = props.get(key)?;
        let (getter, setter) = match &prop.slot {
            Slot::Data(_) => (None, None),
            Slot::Accessor { get, set } => (get.clone(), set.clone()),
            Slot::Reactive(slot) => {
                let read = Rc::clone(slot);
                let write = Rc::clone(slot);
                (
                    Some(Rc::new(move || read.get()) as Getter),
                    Some(Rc::new(move |value| write.set(value)) as Setter),
                )
            }
        };
        Some(ExistingProperty {
            configurable: prop.configurable,
            getter,
            setter,
        })
    }

    /// Install an interceptor as an enumerable, configurable property.
    pub(crate) fn install_reactive(&self, key: &str, slot: Rc<ReactiveSlot>) -> bool {
        let mut props = self.0.props.borrow_mut();
        if !props.contains_key(key) && !self.0.extensible.get() {
            return false;
        }
        let prop = Property {
            slot: Slot::Reactive(slot),
            enumerable: true,
            configurable: true,
            writable: true,
        };
        match props.get_mut(key) {
            Some(existing) => *existing = prop,
            None => {
                props.insert(key.to_string(), prop);
            }
        }
        true
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_instance() { "Instance" } else { "Object" };
        write!(f, "{kind}{} ", self.id())?;
        f.debug_set().entries(self.keys()).finish()
    }
}
