#![forbid(unsafe_code)]

//! Fine-grained dependency tracking over plain structured data.
//!
//! Observing an object graph installs an interceptor on every property and
//! interposes the structure-changing operations of every sequence. While a
//! subscriber is active (see [`active`]), every intercepted read records a
//! dependency edge; every intercepted write that changes a value notifies
//! exactly the subscribers that read it.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use deptrack::{Dep, Subscriber, Value, observe, with_active_subscriber};
//!
//! struct Flag(Cell<bool>);
//! impl Subscriber for Flag {
//!     fn register_dependency(&self, _dep: &Rc<Dep>) {}
//!     fn notify_of_change(&self) {
//!         self.0.set(true);
//!     }
//! }
//!
//! let state = Value::from(serde_json::json!({"count": 1}));
//! observe(&state, false);
//! let obj = state.as_object().unwrap();
//!
//! let flag = Rc::new(Flag(Cell::new(false)));
//! let sub: Rc<dyn Subscriber> = flag.clone();
//! with_active_subscriber(&sub, || obj.get("count"));
//!
//! obj.set("count", Value::from(2));
//! assert!(flag.0.get());
//! ```

pub mod active;
pub mod array;
pub mod config;
pub mod dep;
pub mod mutation;
pub mod object;
pub mod observer;
pub mod registry;
pub mod value;
pub mod warning;

pub use active::{
    ActiveSubscriberGuard, activate, current_subscriber, has_active_subscriber,
    pop_active_subscriber, push_active_subscriber, suspend_tracking, untracked,
    with_active_subscriber,
};
pub use array::{ArrayRef, WeakArrayRef};
pub use config::{
    ConversionGuard, ObserverConfig, config, set_config, set_should_convert, suspend_conversion,
};
pub use dep::{Dep, DepId, Subscriber, notifications_total};
pub use mutation::{delete_property, set_property};
pub use object::{Getter, ObjectRef, PropertyDescriptor, Setter, WeakObjectRef};
pub use observer::{
    CustomSetter, Observer, ReactiveOptions, define_reactive, define_reactive_with, depend_array,
    observers_created_total,
};
pub use registry::observe;
pub use value::{Container, ContainerId, MAX_ARRAY_INDEX, OpaqueRef, PropertyKey, Value};
pub use warning::{UsageWarning, clear_warn_handler, set_warn_handler};
