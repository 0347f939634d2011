#![forbid(unsafe_code)]

//! Explicit structural mutations: adding and removing observed keys.

use crate::array::ArrayRef;
use crate::object::ObjectRef;
use crate::observer::define_reactive;
use crate::value::{PropertyKey, Value};
use crate::warning::{self, UsageWarning};

/// Set `key` on `target`, adding an observed property if needed.
///
/// - Sequence + valid index: the sequence grows to cover the index and the
///   element is replaced through the intercepted `splice`.
/// - Existing key: plain assignment (an installed interceptor fires).
/// - Unobserved object: plain assignment, nothing to notify.
/// - Observed object: an interceptor is installed for the new key and the
///   object's shape dependency is notified.
///
/// Adding to a root-bound container or an instance-flagged object is refused
/// with a usage warning. Returns `value` in every case.
pub fn set_property(target: &Value, key: impl Into<PropertyKey>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(arr) => set_index(arr, &key, value),
        Value::Object(obj) => set_key(obj, &key.to_name(), value),
        _ => {
            warning::emit(UsageWarning::SetOnPrimitive {
                key: key.to_name(),
            });
            value
        }
    }
}

fn set_index(arr: &ArrayRef, key: &PropertyKey, value: Value) -> Value {
    match key.as_index() {
        Some(idx) => {
            if arr.grow_to(idx) {
                arr.splice(idx, 1, vec![value.clone()]);
            }
        }
        None => warning::emit(UsageWarning::NonIndexKey {
            key: key.to_name(),
        }),
    }
    value
}

fn set_key(obj: &ObjectRef, key: &str, value: Value) -> Value {
    if obj.has_own(key) {
        obj.set(key, value.clone());
        return value;
    }
    let observer = obj.observer();
    if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.is_root()) {
        warning::emit(UsageWarning::AddToRoot {
            key: key.to_string(),
        });
        return value;
    }
    let Some(observer) = observer else {
        obj.set(key, value.clone());
        return value;
    };
    if define_reactive(obj, key, value.clone()) {
        observer.dep().notify();
    }
    value
}

/// Delete `key` from `target`, notifying if the container is observed.
///
/// - Sequence + valid index: removed through the intercepted `splice`.
/// - Absent key: no-op.
/// - Root-bound container or instance-flagged object: refused with a usage
///   warning.
pub fn delete_property(target: &Value, key: impl Into<PropertyKey>) {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.as_index() {
            Some(idx) => {
                arr.splice(idx, 1, Vec::new());
            }
            None => warning::emit(UsageWarning::NonIndexKey {
                key: key.to_name(),
            }),
        },
        Value::Object(obj) => delete_key(obj, &key.to_name()),
        _ => warning::emit(UsageWarning::DeleteOnPrimitive {
            key: key.to_name(),
        }),
    }
}

fn delete_key(obj: &ObjectRef, key: &str) {
    if !obj.has_own(key) {
        return;
    }
    let observer = obj.observer();
    if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.is_root()) {
        warning::emit(UsageWarning::DeleteOnRoot {
            key: key.to_string(),
        });
        return;
    }
    obj.delete(key);
    if let Some(observer) = observer {
        observer.dep().notify();
    }
}
