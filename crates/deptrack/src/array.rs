#![forbid(unsafe_code)]

//! Sequence containers and the sequence mutation proxy.
//!
//! Individual index reads and writes on a sequence are not instrumented:
//! indices shift too often for per-index interceptors to pay off. Instead the
//! structure-changing operations on [`ArrayRef`] are interposed. On an
//! observed sequence each of them, after performing the underlying `Vec`
//! operation:
//!
//! 1. observes the elements it inserted (`push`, `unshift`, `splice`), then
//! 2. notifies the sequence's shape dependency exactly once.
//!
//! On an unobserved sequence they are plain `Vec` operations.
//!
//! [`ArrayRef::set_index`] is a raw write and is deliberately *not*
//! observable; route single-index writes through [`crate::set_property`].

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::observer::{Observer, observe_array};
use crate::value::{ContainerId, MAX_ARRAY_INDEX, Value};

struct ArrayData {
    id: ContainerId,
    items: RefCell<Vec<Value>>,
    extensible: Cell<bool>,
    observer: RefCell<Option<Rc<Observer>>>,
}

/// Shared handle to a sequence container.
///
/// Cloning an `ArrayRef` creates a new handle to the **same** sequence.
#[derive(Clone)]
pub struct ArrayRef(Rc<ArrayData>);

/// Non-owning handle to a sequence.
#[derive(Clone)]
pub struct WeakArrayRef(Weak<ArrayData>);

impl WeakArrayRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.0.upgrade().map(ArrayRef)
    }
}

impl fmt::Debug for WeakArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakArrayRef")
    }
}

impl ArrayRef {
    /// A new, empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// A sequence holding `items`.
    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            id: ContainerId::next(),
            items: RefCell::new(items),
            extensible: Cell::new(true),
            observer: RefCell::new(None),
        }))
    }

    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    /// Whether both handles refer to the same sequence.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Make this sequence ineligible for observation.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    /// The observer attached to this sequence, if it has been observed.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Untracked element read; `Undefined` past the end.
    #[must_use]
    pub fn get(&self, idx: usize) -> Value {
        self.0.items.borrow().get(idx).cloned().unwrap_or_default()
    }

    /// Snapshot of the current elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Raw index write, growing with holes if needed. Not observable.
    ///
    /// Returns `false` and leaves the sequence untouched when `idx` is above
    /// [`MAX_ARRAY_INDEX`] or the storage cannot grow to cover it.
    pub fn set_index(&self, idx: usize, value: Value) -> bool {
        if idx > MAX_ARRAY_INDEX {
            return false;
        }
        let Some(len) = idx.checked_add(1) else {
            return false;
        };
        let mut items = self.0.items.borrow_mut();
        if !grow_items(&mut items, len) {
            return false;
        }
        items[idx] = value;
        true
    }

    /// Raw length extension to at least `len`, filling with holes. Not
    /// observable. Returns `false` if the storage could not grow.
    pub(crate) fn grow_to(&self, len: usize) -> bool {
        grow_items(&mut self.0.items.borrow_mut(), len)
    }

    fn after_mutation(&self, method: &'static str, inserted: &[Value]) {
        let Some(observer) = self.observer() else {
            return;
        };
        if !inserted.is_empty() {
            observe_array(inserted);
        }
        tracing::trace!(
            target: "deptrack::array",
            container = self.id().raw(),
            method,
            inserted = inserted.len(),
            "array.mutate"
        );
        observer.dep().notify();
    }

    /// Append `items`; returns the new length.
    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = items.into_iter().collect();
        let len = {
            let mut current = self.0.items.borrow_mut();
            current.extend(inserted.iter().cloned());
            current.len()
        };
        self.after_mutation("push", &inserted);
        len
    }

    /// Remove and return the last element (`Undefined` if empty).
    pub fn pop(&self) -> Value {
        let popped = self.0.items.borrow_mut().pop().unwrap_or_default();
        self.after_mutation("pop", &[]);
        popped
    }

    /// Remove and return the first element (`Undefined` if empty).
    pub fn shift(&self) -> Value {
        let shifted = {
            let mut current = self.0.items.borrow_mut();
            if current.is_empty() {
                Value::Undefined
            } else {
                current.remove(0)
            }
        };
        self.after_mutation("shift", &[]);
        shifted
    }

    /// Prepend `items`, keeping their order; returns the new length.
    pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = items.into_iter().collect();
        let len = {
            let mut current = self.0.items.borrow_mut();
            current.splice(0..0, inserted.iter().cloned());
            current.len()
        };
        self.after_mutation("unshift", &inserted);
        len
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// `start` and the removed range are clamped to the current length.
    /// Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut current = self.0.items.borrow_mut();
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            current
                .splice(start..end, items.iter().cloned())
                .collect()
        };
        self.after_mutation("splice", &items);
        removed
    }

    /// Sort in place with `compare`.
    ///
    /// The comparator runs against a snapshot, so it may read this sequence.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut sorted = self.to_vec();
        sorted.sort_by(&mut compare);
        *self.0.items.borrow_mut() = sorted;
        self.after_mutation("sort", &[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.0.items.borrow_mut().reverse();
        self.after_mutation("reverse", &[]);
    }

    /// Shorten to `len` elements; no-op on the contents if already shorter.
    pub fn truncate(&self, len: usize) {
        self.0.items.borrow_mut().truncate(len);
        self.after_mutation("truncate", &[]);
    }
}

fn grow_items(items: &mut Vec<Value>, len: usize) -> bool {
    let Some(additional) = len.checked_sub(items.len()).filter(|&n| n > 0) else {
        return true;
    };
    if items.try_reserve(additional).is_err() {
        tracing::warn!(
            target: "deptrack::array",
            requested = len,
            "array.grow failed"
        );
        return false;
    }
    items.resize(len, Value::Undefined);
    true
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array{}(len={})", self.id(), self.len())
    }
}

impl FromIterator<Value> for ArrayRef {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}
