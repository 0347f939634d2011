#![forbid(unsafe_code)]

//! The observation registry.
//!
//! Every container carries a private marker slot pointing at its observer,
//! so re-observation finds the existing observer instead of wrapping twice.
//! The registry also counts root bindings: a container attached directly as
//! a subscriber's root state refuses ad-hoc key addition and removal.

use std::rc::Rc;

use crate::config::config;
use crate::observer::Observer;
use crate::value::Value;

/// Return the observer for `value`, creating one if allowed.
///
/// An existing observer is always returned. A new one is only created when
/// observation is enabled (conversion on, not server rendering) and `value`
/// is a plain, extensible container. Primitives, opaque values, and
/// instance-flagged objects yield `None`, as does a non-extensible container
/// (silently; no warning).
///
/// With `as_root`, the observer's root-binding count is incremented.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let container = value.as_container()?;
    let observer = match container.observer() {
        Some(existing) => existing,
        None => {
            if !config().observation_enabled()
                || !container.is_plain()
                || !container.is_extensible()
            {
                return None;
            }
            Observer::attach(&container)
        }
    };
    if as_root {
        observer.add_root_binding();
    }
    Some(observer)
}
