#![forbid(unsafe_code)]

//! The plain structured data model the engine observes.
//!
//! [`Value`] is a dynamically typed value. Containers ([`ObjectRef`],
//! [`ArrayRef`]) are shared handles: cloning a `Value` that holds a container
//! clones the handle, not the data, so the same container can be reachable
//! from several places exactly like a plain object graph.
//!
//! # Equality
//!
//! `PartialEq` is strict identity equality: primitives compare by value,
//! containers and opaque values by reference identity. `NaN` is unequal to
//! itself, as for `f64`. Use [`Value::is_nan`] where NaN-over-NaN must be
//! treated as "unchanged".

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::array::{ArrayRef, WeakArrayRef};
use crate::object::{ObjectRef, WeakObjectRef};
use crate::observer::Observer;

/// Largest magnitude below which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Largest valid sequence index (2^32 - 2).
///
/// Keys above this are treated as names, never as indices.
pub const MAX_ARRAY_INDEX: usize = 4_294_967_294;

/// Identity of a container, for logs and debug output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    pub(crate) fn next() -> Self {
        static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A host-specific value that is never observed (e.g. a rendered node).
#[derive(Clone)]
pub struct OpaqueRef(Rc<dyn Any>);

impl OpaqueRef {
    /// Wrap an arbitrary host value.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrow the wrapped value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Whether both handles refer to the same host value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque")
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value; also the hole left when a sequence grows past its end.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Opaque(OpaqueRef),
}

impl Value {
    /// Whether this is the not-a-number sentinel.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Number(n) if n.is_nan())
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this value is an object or a sequence.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// The container this value holds, if any.
    #[must_use]
    pub fn as_container(&self) -> Option<Container> {
        match self {
            Self::Object(obj) => Some(Container::Object(obj.clone())),
            Self::Array(arr) => Some(Container::Array(arr.clone())),
            _ => None,
        }
    }

    /// The observer attached to this value, if it is an observed container.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Self::Object(obj) => obj.observer(),
            Self::Array(arr) => arr.observer(),
            _ => None,
        }
    }

    /// Snapshot this value as JSON without recording any reads.
    ///
    /// `Undefined` becomes `null`, non-finite numbers become `null`, opaque
    /// values become `null`. A container reachable from itself is emitted as
    /// `null` at the point of recursion.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        crate::active::untracked(|| self.to_json_inner(&mut Vec::new()))
    }

    fn to_json_inner(&self, path: &mut Vec<ContainerId>) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Undefined | Self::Null | Self::Opaque(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                Json::from(*n as i64)
            }
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.to_string()),
            Self::Object(obj) => {
                if path.contains(&obj.id()) {
                    return Json::Null;
                }
                path.push(obj.id());
                let map = obj
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let value = obj.get(key.as_str()).to_json_inner(path);
                        (key, value)
                    })
                    .collect();
                path.pop();
                Json::Object(map)
            }
            Self::Array(arr) => {
                if path.contains(&arr.id()) {
                    return Json::Null;
                }
                path.push(arr.id());
                let items = arr
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(path))
                    .collect();
                path.pop();
                Json::Array(items)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "{obj:?}"),
            Self::Array(arr) => write!(f, "{arr:?}"),
            Self::Opaque(op) => write!(f, "{op:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

impl From<ArrayRef> for Value {
    fn from(arr: ArrayRef) -> Self {
        Self::Array(arr)
    }
}

impl From<OpaqueRef> for Value {
    fn from(op: OpaqueRef) -> Self {
        Self::Opaque(op)
    }
}

impl From<Container> for Value {
    fn from(container: Container) -> Self {
        match container {
            Container::Object(obj) => Self::Object(obj),
            Container::Array(arr) => Self::Array(arr),
        }
    }
}

impl From<serde_json::Value> for Value {
    /// Build fresh, unobserved containers from a JSON document.
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::from(s),
            Json::Array(items) => {
                Self::Array(ArrayRef::from_vec(items.into_iter().map(Self::from).collect()))
            }
            Json::Object(map) => Self::Object(ObjectRef::from_entries(
                map.into_iter().map(|(k, v)| (k, Self::from(v))),
            )),
        }
    }
}

/// An object-like or sequence-like value.
#[derive(Clone, Debug)]
pub enum Container {
    Object(ObjectRef),
    Array(ArrayRef),
}

impl Container {
    #[must_use]
    pub fn id(&self) -> ContainerId {
        match self {
            Self::Object(obj) => obj.id(),
            Self::Array(arr) => arr.id(),
        }
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Self::Object(obj) => obj.observer(),
            Self::Array(arr) => arr.observer(),
        }
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        match self {
            Self::Object(obj) => obj.is_extensible(),
            Self::Array(arr) => arr.is_extensible(),
        }
    }

    /// Plain structured data: anything but an instance-flagged object.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        match self {
            Self::Object(obj) => !obj.is_instance(),
            Self::Array(_) => true,
        }
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        match self {
            Self::Object(obj) => obj.attach_observer(observer),
            Self::Array(arr) => arr.attach_observer(observer),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        match self {
            Self::Object(obj) => WeakContainer::Object(obj.downgrade()),
            Self::Array(arr) => WeakContainer::Array(arr.downgrade()),
        }
    }
}

/// Non-owning reference from an observer back to its container.
#[derive(Clone, Debug)]
pub(crate) enum WeakContainer {
    Object(WeakObjectRef),
    Array(WeakArrayRef),
}

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<Container> {
        match self {
            Self::Object(obj) => obj.upgrade().map(Container::Object),
            Self::Array(arr) => arr.upgrade().map(Container::Array),
        }
    }
}

/// A property name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Index(usize),
    Name(String),
}

impl PropertyKey {
    /// The valid sequence index this key denotes, if any.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(idx) if *idx <= MAX_ARRAY_INDEX => Some(*idx),
            Self::Index(_) => None,
            Self::Name(_) => None,
        }
    }

    /// The key as an object property name.
    #[must_use]
    pub fn to_name(&self) -> String {
        match self {
            Self::Index(idx) => idx.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(idx) => write!(f, "{idx}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Canonical non-negative integer strings are indices: `"3"` is, `"03"`,
/// `"-1"` and `"1.5"` are not.
fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok().filter(|&idx| idx <= MAX_ARRAY_INDEX)
}

impl From<usize> for PropertyKey {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        parse_index(name).map_or_else(|| Self::Name(name.to_string()), Self::Index)
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        match parse_index(&name) {
            Some(idx) => Self::Index(idx),
            None => Self::Name(name),
        }
    }
}

impl From<&String> for PropertyKey {
    fn from(name: &String) -> Self {
        Self::from(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from("a"), Value::from("a".to_string()));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn nan_is_unequal_but_detectable() {
        let nan = Value::from(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.is_nan());
        assert!(!Value::from(0.0).is_nan());
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::from(json!({"x": 1}));
        let b = Value::from(json!({"x": 1}));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let doc = json!({"name": "ada", "tags": ["a", 1], "nested": {"n": 2.5}, "none": null});
        let value = Value::from(doc.clone());
        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn to_json_breaks_cycles() {
        let obj = ObjectRef::new();
        obj.set("self", Value::from(obj.clone()));
        assert_eq!(Value::from(obj).to_json(), json!({"self": null}));
    }

    #[test]
    fn property_key_parsing() {
        assert_eq!(PropertyKey::from("3"), PropertyKey::Index(3));
        assert_eq!(PropertyKey::from("0"), PropertyKey::Index(0));
        assert_eq!(PropertyKey::from("03"), PropertyKey::Name("03".into()));
        assert_eq!(PropertyKey::from("-1"), PropertyKey::Name("-1".into()));
        assert_eq!(PropertyKey::from("1.5"), PropertyKey::Name("1.5".into()));
        assert_eq!(PropertyKey::from(""), PropertyKey::Name(String::new()));
        assert_eq!(PropertyKey::from(7usize).to_name(), "7");
    }

    #[test]
    fn index_range_is_capped() {
        assert_eq!(
            PropertyKey::from("4294967294").as_index(),
            Some(MAX_ARRAY_INDEX)
        );
        assert_eq!(
            PropertyKey::from("4294967295"),
            PropertyKey::Name("4294967295".into())
        );
        assert_eq!(
            PropertyKey::from("18446744073709551615"),
            PropertyKey::Name("18446744073709551615".into())
        );
        assert_eq!(PropertyKey::from(usize::MAX).as_index(), None);
        assert_eq!(PropertyKey::from(usize::MAX).to_name(), usize::MAX.to_string());
    }

    #[test]
    fn opaque_values_downcast() {
        let op = OpaqueRef::new(42u8);
        assert_eq!(op.downcast_ref::<u8>(), Some(&42));
        assert!(op.downcast_ref::<u16>().is_none());
        assert_eq!(Value::from(op.clone()), Value::from(op));
    }
}
