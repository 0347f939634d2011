#![forbid(unsafe_code)]

//! Usage warnings for disallowed mutations.
//!
//! Warnings are non-fatal: the offending operation becomes a no-op and the
//! warning is reported to the diagnostic channel, which is a `WARN` event
//! under the `deptrack::warn` tracing target plus an optional thread-local
//! handler. Nothing is reported while `dev_warnings` is off.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config::config;

/// A disallowed mutation that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageWarning {
    #[error(
        "avoid adding reactive property `{key}` to an instance or its root state at runtime; declare it upfront"
    )]
    AddToRoot { key: String },

    #[error("avoid deleting property `{key}` on an instance or its root state; set it to null instead")]
    DeleteOnRoot { key: String },

    #[error("cannot set reactive property `{key}` on an undefined, null, or primitive value")]
    SetOnPrimitive { key: String },

    #[error("cannot delete reactive property `{key}` on an undefined, null, or primitive value")]
    DeleteOnPrimitive { key: String },

    #[error("sequences have no named properties; `{key}` is not a valid index")]
    NonIndexKey { key: String },
}

impl UsageWarning {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddToRoot { .. } => "add_to_root",
            Self::DeleteOnRoot { .. } => "delete_on_root",
            Self::SetOnPrimitive { .. } => "set_on_primitive",
            Self::DeleteOnPrimitive { .. } => "delete_on_primitive",
            Self::NonIndexKey { .. } => "non_index_key",
        }
    }

    /// The property key the refused mutation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::AddToRoot { key }
            | Self::DeleteOnRoot { key }
            | Self::SetOnPrimitive { key }
            | Self::DeleteOnPrimitive { key }
            | Self::NonIndexKey { key } => key,
        }
    }
}

type WarnHandler = Rc<dyn Fn(&UsageWarning)>;

thread_local! {
    static HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Route warnings on this thread to `handler` in addition to tracing.
pub fn set_warn_handler(handler: impl Fn(&UsageWarning) + 'static) {
    HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the handler installed by [`set_warn_handler`].
pub fn clear_warn_handler() {
    HANDLER.with(|slot| slot.borrow_mut().take());
}

pub(crate) fn emit(warning: UsageWarning) {
    if !config().dev_warnings {
        return;
    }
    tracing::warn!(
        target: "deptrack::warn",
        code = warning.code(),
        key = warning.key(),
        "{warning}"
    );
    let handler = HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(&warning);
    }
}
