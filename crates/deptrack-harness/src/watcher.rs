#![forbid(unsafe_code)]

//! Reference subscriber: re-evaluates a getter when what it read changes.
//!
//! Each run activates the watcher, evaluates the getter, and collects the
//! dependencies the getter read. Dependencies read in the previous run but
//! not in this one are unsubscribed, so a branch that is no longer taken
//! stops triggering re-runs.
//!
//! # Invariants
//!
//! 1. After a run, the watcher is subscribed to exactly the dependencies
//!    read during that run.
//! 2. A notification that arrives while the getter is running (the getter
//!    writes to something it read) is counted but does not re-enter.
//! 3. A [`WatchMode::Lazy`] watcher never evaluates inside a notification.
//! 4. A getter that panics leaves the watcher dirty, not running, and
//!    subscribed to the dependencies of its last completed run.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use deptrack::{Dep, DepId, Subscriber, Value, activate};

/// When a watcher re-evaluates after a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Re-run immediately inside the notification.
    #[default]
    Sync,
    /// Mark dirty; re-run on the next [`Watcher::value`].
    Lazy,
}

type WatchGetter = Box<dyn Fn() -> Value>;

pub struct Watcher {
    this: Weak<Watcher>,
    getter: WatchGetter,
    mode: WatchMode,
    deps: RefCell<Vec<Rc<Dep>>>,
    new_deps: RefCell<Vec<Rc<Dep>>>,
    new_dep_ids: RefCell<HashSet<DepId>>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    running: Cell<bool>,
    runs: Cell<u64>,
    notifications: Cell<u64>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("mode", &self.mode)
            .field("deps", &self.deps.borrow().len())
            .field("dirty", &self.dirty.get())
            .field("runs", &self.runs.get())
            .field("notifications", &self.notifications.get())
            .finish()
    }
}

impl Watcher {
    /// Create a watcher over `getter`.
    ///
    /// A [`WatchMode::Sync`] watcher runs once immediately; a lazy one waits
    /// for the first [`value`](Self::value).
    pub fn new(mode: WatchMode, getter: impl Fn() -> Value + 'static) -> Rc<Self> {
        let watcher = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            getter: Box::new(getter),
            mode,
            deps: RefCell::new(Vec::new()),
            new_deps: RefCell::new(Vec::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
            running: Cell::new(false),
            runs: Cell::new(0),
            notifications: Cell::new(0),
        });
        if mode == WatchMode::Sync {
            watcher.run();
        }
        watcher
    }

    /// Shorthand for a [`WatchMode::Sync`] watcher.
    pub fn sync(getter: impl Fn() -> Value + 'static) -> Rc<Self> {
        Self::new(WatchMode::Sync, getter)
    }

    /// Shorthand for a [`WatchMode::Lazy`] watcher.
    pub fn lazy(getter: impl Fn() -> Value + 'static) -> Rc<Self> {
        Self::new(WatchMode::Lazy, getter)
    }

    #[must_use]
    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// This watcher as a subscriber handle.
    #[must_use]
    pub fn as_subscriber(self: &Rc<Self>) -> Rc<dyn Subscriber> {
        Rc::clone(self) as Rc<dyn Subscriber>
    }

    /// Evaluate the getter under tracking and refresh the dependency set.
    pub fn run(&self) -> Value {
        let Some(me) = self.this.upgrade() else {
            return Value::Undefined;
        };
        let mut run_guard = RunGuard::start(self);
        let value = {
            let _active = activate(me);
            (self.getter)()
        };
        run_guard.finished = true;
        drop(run_guard);
        let (kept, dropped) = self.cleanup_deps();

        self.runs.set(self.runs.get() + 1);
        self.dirty.set(false);
        *self.value.borrow_mut() = value.clone();
        tracing::debug!(
            target: "deptrack::watcher",
            run = self.runs.get(),
            deps = kept,
            dropped,
            "watcher.run"
        );
        value
    }

    /// The latest value, re-evaluating first if dirty.
    pub fn value(&self) -> Value {
        if self.dirty.get() {
            return self.run();
        }
        self.value.borrow().clone()
    }

    /// Unsubscribe from every dependency. The watcher stays usable; the next
    /// run subscribes again.
    pub fn teardown(&self) {
        let Some(me) = self.this.upgrade() else {
            return;
        };
        let me: Rc<dyn Subscriber> = me;
        for dep in self.deps.take() {
            dep.remove_subscriber(&me);
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Completed getter evaluations.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.get()
    }

    /// Notifications received, including ones that did not trigger a run.
    #[must_use]
    pub fn notifications(&self) -> u64 {
        self.notifications.get()
    }

    /// Number of dependencies recorded by the last run.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.deps.borrow().len()
    }

    /// Whether the last run read `dep`.
    #[must_use]
    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.deps.borrow().iter().any(|d| d.id() == dep.id())
    }

    /// Swap the freshly collected dependencies in and unsubscribe from the
    /// ones no longer read. Returns `(kept, dropped)`.
    fn cleanup_deps(&self) -> (usize, usize) {
        let fresh_ids = self.new_dep_ids.take();
        let fresh = self.new_deps.take();
        let kept = fresh.len();
        let previous = self.deps.replace(fresh);

        let Some(me) = self.this.upgrade() else {
            return (kept, 0);
        };
        let me: Rc<dyn Subscriber> = me;
        let mut dropped = 0;
        for dep in previous {
            if !fresh_ids.contains(&dep.id()) {
                dep.remove_subscriber(&me);
                dropped += 1;
            }
        }
        (kept, dropped)
    }

    /// Drop what an unfinished run collected, unsubscribing from nodes the
    /// last completed run did not read.
    fn abandon_run(&self) {
        self.new_dep_ids.take();
        let partial = self.new_deps.take();
        self.dirty.set(true);
        let Some(me) = self.this.upgrade() else {
            return;
        };
        let me: Rc<dyn Subscriber> = me;
        let previous: HashSet<DepId> = self.deps.borrow().iter().map(|d| d.id()).collect();
        for dep in partial {
            if !previous.contains(&dep.id()) {
                dep.remove_subscriber(&me);
            }
        }
        tracing::debug!(target: "deptrack::watcher", "watcher.run abandoned");
    }
}

/// Holds the running flag for one getter evaluation.
struct RunGuard<'a> {
    watcher: &'a Watcher,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn start(watcher: &'a Watcher) -> Self {
        watcher.running.set(true);
        Self {
            watcher,
            finished: false,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.watcher.running.set(false);
        if !self.finished {
            self.watcher.abandon_run();
        }
    }
}

impl Subscriber for Watcher {
    fn register_dependency(&self, dep: &Rc<Dep>) {
        if self.new_dep_ids.borrow_mut().insert(dep.id()) {
            self.new_deps.borrow_mut().push(Rc::clone(dep));
        }
    }

    fn notify_of_change(&self) {
        self.notifications.set(self.notifications.get() + 1);
        match self.mode {
            WatchMode::Lazy => self.dirty.set(true),
            WatchMode::Sync if self.running.get() => {
                tracing::debug!(target: "deptrack::watcher", "notification during run ignored");
            }
            WatchMode::Sync => {
                self.run();
            }
        }
    }
}
