#![forbid(unsafe_code)]

//! Dependency nodes: the publisher side of the dependency graph.
//!
//! A [`Dep`] tracks the subscribers that currently depend on one observable
//! slot (a single property) or one container shape (keys added/removed,
//! sequence length changed).
//!
//! # Invariants
//!
//! 1. A subscriber appears at most once in a node's subscriber list.
//! 2. Subscribers are notified in registration order.
//! 3. `notify()` iterates a snapshot; subscribers registering or
//!    unregistering during propagation never affect the pass in flight.
//! 4. A node never owns its subscribers. Entries are `Weak` and dead ones are
//!    pruned lazily, on notification and whenever registration doubles the
//!    table since the last sweep.
//! 5. Registration and lookup are O(1) amortized; entries are keyed by the
//!    subscriber's address, which a live `Weak` keeps reserved.
//!
//! # Failure Modes
//!
//! - **Subscriber panics**: the panic unwinds out of `notify()` to the writer.
//!   Subscribers later in the snapshot are not notified for that write.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::active;

/// Total number of `notify()` calls that reached at least one live subscriber.
static NOTIFICATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total notification count (for diagnostics/telemetry).
#[must_use]
pub fn notifications_total() -> u64 {
    NOTIFICATIONS_TOTAL.load(Ordering::Relaxed)
}

/// A computation that depends on reactive state.
///
/// The engine calls these two hooks and never inspects anything else about a
/// subscriber.
pub trait Subscriber {
    /// A tracked read attributed to this subscriber has touched `dep`.
    ///
    /// Called after the node has already added the subscriber to its own
    /// list, so implementations only need to accumulate `dep` if they want to
    /// drop stale dependencies later via [`Dep::remove_subscriber`].
    fn register_dependency(&self, dep: &Rc<Dep>);

    /// A value this subscriber read has changed.
    fn notify_of_change(&self);
}

/// Stable identity of a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

/// Subscriber table: address → weak handle, in registration order.
type SubscriberTable = IndexMap<*const (), Weak<dyn Subscriber>, ahash::RandomState>;

/// Table size below which registration never sweeps dead entries.
const MIN_SWEEP_LEN: usize = 16;

/// An observable publisher with a set of subscribers.
pub struct Dep {
    id: DepId,
    subs: RefCell<SubscriberTable>,
    sweep_at: Cell<usize>,
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn subscriber_key(sub: &Rc<dyn Subscriber>) -> *const () {
    Rc::as_ptr(sub).cast::<()>()
}

impl Dep {
    /// Create a new node with no subscribers.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: DepId::next(),
            subs: RefCell::new(SubscriberTable::default()),
            sweep_at: Cell::new(MIN_SWEEP_LEN),
        })
    }

    /// This node's identity.
    #[must_use]
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Add `sub` unless it is already subscribed.
    pub fn add_subscriber(&self, sub: &Rc<dyn Subscriber>) {
        let mut subs = self.subs.borrow_mut();
        let key = subscriber_key(sub);
        if subs.contains_key(&key) {
            return;
        }
        if subs.len() >= self.sweep_at.get() {
            subs.retain(|_, existing| existing.strong_count() > 0);
            self.sweep_at.set((subs.len() * 2).max(MIN_SWEEP_LEN));
        }
        subs.insert(key, Rc::downgrade(sub));
    }

    /// Remove `sub`. Returns `true` if it was subscribed.
    pub fn remove_subscriber(&self, sub: &Rc<dyn Subscriber>) -> bool {
        self.subs
            .borrow_mut()
            .shift_remove(&subscriber_key(sub))
            .is_some()
    }

    /// Whether `sub` is currently subscribed.
    #[must_use]
    pub fn has_subscriber(&self, sub: &Rc<dyn Subscriber>) -> bool {
        self.subs.borrow().contains_key(&subscriber_key(sub))
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subs
            .borrow()
            .values()
            .filter(|sub| sub.strong_count() > 0)
            .count()
    }

    /// Record a read of this node by the active subscriber, if any.
    ///
    /// The subscriber is added to this node and then told about the node
    /// through [`Subscriber::register_dependency`].
    pub fn depend(self: &Rc<Self>) {
        if let Some(target) = active::current_subscriber() {
            self.add_subscriber(&target);
            target.register_dependency(self);
        }
    }

    /// Notify every subscriber, in registration order.
    pub fn notify(&self) {
        let snapshot: Vec<Rc<dyn Subscriber>> = {
            let mut subs = self.subs.borrow_mut();
            subs.retain(|_, sub| sub.strong_count() > 0);
            subs.values().filter_map(Weak::upgrade).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        NOTIFICATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "deptrack::dep",
            dep = self.id.raw(),
            subscribers = snapshot.len(),
            "dep.notify"
        );

        for sub in snapshot {
            sub.notify_of_change();
        }
    }
}
