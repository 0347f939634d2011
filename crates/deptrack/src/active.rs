#![forbid(unsafe_code)]

//! The Active-Subscriber Stack.
//!
//! Identifies the computation currently reading reactive data so tracked reads
//! can be attributed to it. Nested computations push onto the stack and pop on
//! completion, so reads inside an inner computation are never attributed to
//! the outer one.
//!
//! # Design
//!
//! The stack is thread-local: each evaluation thread owns an independent
//! graph context. It starts empty and needs no teardown. Frames are
//! `Option`s so [`untracked`] can mask the outer subscriber without removing
//! it.
//!
//! Prefer the scoped forms ([`activate`], [`with_active_subscriber`]). They
//! restore the previous subscriber on every exit path, including unwinding
//! out of a panicking computation. The raw [`push_active_subscriber`] /
//! [`pop_active_subscriber`] pair must be strictly balanced by the caller.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dep::Subscriber;

thread_local! {
    static STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
}

/// The subscriber tracked reads are currently attributed to.
#[must_use]
pub fn current_subscriber() -> Option<Rc<dyn Subscriber>> {
    STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether any tracked read would currently be recorded.
#[must_use]
pub fn has_active_subscriber() -> bool {
    STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Number of frames on the stack, including untracked frames.
#[must_use]
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// Make `sub` the active subscriber, suspending the current one.
pub fn push_active_subscriber(sub: Rc<dyn Subscriber>) {
    STACK.with(|stack| stack.borrow_mut().push(Some(sub)));
}

/// Restore the subscriber that was active before the matching push.
///
/// Returns the subscriber that was popped, or `None` for an untracked frame
/// or an empty stack.
pub fn pop_active_subscriber() -> Option<Rc<dyn Subscriber>> {
    let popped = STACK.with(|stack| stack.borrow_mut().pop());
    if popped.is_none() {
        tracing::debug!(target: "deptrack::active", "pop on empty active-subscriber stack");
    }
    popped.flatten()
}

/// Guard returned by [`activate`] and [`suspend_tracking`]; pops its frame on drop.
#[must_use = "the subscriber is deactivated as soon as the guard is dropped"]
pub struct ActiveSubscriberGuard {
    depth: usize,
}

impl Drop for ActiveSubscriberGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "active-subscriber guards dropped out of order"
            );
            stack.truncate(self.depth - 1);
        });
    }
}

fn push_frame(frame: Option<Rc<dyn Subscriber>>) -> ActiveSubscriberGuard {
    let depth = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(frame);
        stack.len()
    });
    ActiveSubscriberGuard { depth }
}

/// Activate `sub` until the returned guard is dropped.
pub fn activate(sub: Rc<dyn Subscriber>) -> ActiveSubscriberGuard {
    push_frame(Some(sub))
}

/// Mask the active subscriber until the returned guard is dropped.
pub fn suspend_tracking() -> ActiveSubscriberGuard {
    push_frame(None)
}

/// Run `f` with `sub` as the active subscriber.
pub fn with_active_subscriber<R>(sub: &Rc<dyn Subscriber>, f: impl FnOnce() -> R) -> R {
    let _guard = activate(Rc::clone(sub));
    f()
}

/// Run `f` with no active subscriber; reads inside are not recorded.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = suspend_tracking();
    f()
}
