//! Typed publish/subscribe channel.
//!
//! Handlers are registered per [`EventKind`] and only ever see events of
//! exactly that shape.
//!
//! # Concurrency
//!
//! The subscriber table is copy-on-write: `publish` clones an `Arc` snapshot
//! of the handler list under a short read lock and delivers without holding
//! any table lock. `subscribe`/`unsubscribe` swap in a new list under the
//! write lock, so they never wait behind a slow handler.
//!
//! Each subscriber owns a gate, so deliveries to the same handler are
//! serialized across threads while different handlers run in parallel.
//!
//! A thread holds at most one gate. Anything published from inside a handler
//! is queued on the delivering thread and delivered once the outermost
//! `publish` has finished with its handlers. Two handlers publishing into
//! each other from different threads therefore never wait on one another.
//!
//! # Panic Isolation
//!
//! A panicking handler is caught with `catch_unwind`, reported to the
//! channel's [`FailureObserver`], and delivery continues with the next
//! handler.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::{Event, EventKind};

// ============================================================================
// Failure Reporting
// ============================================================================

/// Details of a handler that panicked during delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Shape that was being delivered.
    pub kind: EventKind,
    /// Subscription id of the failing handler.
    pub subscription: u64,
    /// Panic payload rendered as text.
    pub message: String,
}

/// Receives handler failures out of band.
pub trait FailureObserver: Send + Sync {
    fn handler_failed(&self, failure: &HandlerFailure);
}

/// Default observer: logs failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailures;

impl FailureObserver for LogFailures {
    fn handler_failed(&self, failure: &HandlerFailure) {
        tracing::error!(
            event = failure.kind.as_str(),
            subscription = failure.subscription,
            message = %failure.message,
            "event handler panicked; continuing delivery"
        );
    }
}

// ============================================================================
// Delivery Scope
// ============================================================================

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct Delivery {
    depth: usize,
    deferred: VecDeque<Deferred>,
}

thread_local! {
    static DELIVERY: RefCell<Delivery> = RefCell::new(Delivery::default());
}

/// Marks the current thread as delivering until dropped.
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERY.with_borrow_mut(|d| d.depth += 1);
        Self
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) { DELIVERY.with_borrow_mut(|d| d.depth -= 1); }
}

fn delivering() -> bool { DELIVERY.with_borrow(|d| d.depth > 0) }

/// Run `task` now, or after the current delivery when called from a handler.
pub(crate) fn run_or_defer(task: impl FnOnce() + 'static) {
    if delivering() {
        DELIVERY.with_borrow_mut(|d| d.deferred.push_back(Box::new(task)));
    } else {
        task();
    }
}

fn run_deferred() {
    while let Some(task) = DELIVERY.with_borrow_mut(|d| d.deferred.pop_front()) {
        task();
    }
}

// ============================================================================
// Subscribers
// ============================================================================

type ErasedHandler = dyn Fn(&dyn Any) + Send + Sync;

struct Subscriber {
    id: u64,
    active: AtomicBool,
    gate: Mutex<()>,
    handler: Box<ErasedHandler>,
}

type SubscriberList = Arc<[Arc<Subscriber>]>;

struct ChannelInner {
    subscribers: RwLock<HashMap<EventKind, SubscriberList>>,
    next_id: AtomicU64,
    observer: Arc<dyn FailureObserver>,
}

impl ChannelInner {
    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut table = self.subscribers.write();
        let Some(list) = table.get_mut(&kind) else {
            return false;
        };

        let Some(position) = list.iter().position(|s| s.id == id) else {
            return false;
        };

        list[position].active.store(false, Ordering::Release);
        let remaining: Vec<_> = list
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != position)
            .map(|(_, s)| Arc::clone(s))
            .collect();

        if remaining.is_empty() {
            table.remove(&kind);
        } else {
            *list = remaining.into();
        }

        true
    }

    fn deliver_all<E: Event>(&self, subscribers: &[Arc<Subscriber>], event: &E) {
        tracing::trace!(
            event = E::KIND.as_str(),
            external = event.external(),
            subscribers = subscribers.len(),
            "publishing"
        );

        let _scope = DeliveryScope::enter();
        for subscriber in subscribers {
            self.deliver(E::KIND, subscriber, event);
        }
    }

    fn deliver(&self, kind: EventKind, subscriber: &Subscriber, event: &dyn Any) {
        let _gate = subscriber.gate.lock();

        // Unsubscribed after the snapshot was taken.
        if !subscriber.active.load(Ordering::Acquire) {
            return;
        }

        let result = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event)));

        if let Err(panic_info) = result {
            let message = panic_info
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic_info.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());

            self.observer.handler_failed(&HandlerFailure {
                kind,
                subscription: subscriber.id,
                message,
            });
        }
    }
}

// ============================================================================
// Subscription Handle
// ============================================================================

/// Returned by [`EventChannel::subscribe`]; used to unsubscribe later.
///
/// Dropping the handle keeps the subscription alive.
#[derive(Clone)]
pub struct SubscriptionHandle {
    kind: EventKind,
    id: u64,
    channel: Weak<ChannelInner>,
}

impl SubscriptionHandle {
    /// Shape this subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> EventKind { self.kind }

    /// Subscription id, as reported in [`HandlerFailure::subscription`].
    #[must_use]
    pub const fn id(&self) -> u64 { self.id }

    /// Remove the handler from its channel.
    ///
    /// Returns `false` if it was already removed or the channel is gone.
    pub fn unsubscribe(&self) -> bool {
        self.channel.upgrade().is_some_and(|channel| channel.remove(self.kind, self.id))
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Event Channel
// ============================================================================

/// Type-indexed publish/subscribe bus.
///
/// Cheap to clone; clones share the same subscriber table.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl Default for EventChannel {
    fn default() -> Self { Self::new() }
}

impl EventChannel {
    /// Create a channel that logs handler failures.
    #[must_use]
    pub fn new() -> Self { Self::with_observer(Arc::new(LogFailures)) }

    /// Create a channel reporting handler failures to `observer`.
    #[must_use]
    pub fn with_observer(observer: Arc<dyn FailureObserver>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                observer,
            }),
        }
    }

    /// Register `handler` for every future event of shape `E`.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionHandle
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            gate: Mutex::new(()),
            handler: Box::new(move |event: &dyn Any| {
                if let Some(event) = event.downcast_ref::<E>() {
                    handler(event);
                }
            }),
        });

        {
            let mut table = self.inner.subscribers.write();
            let list = table.entry(E::KIND).or_insert_with(|| Arc::from(Vec::new()));
            let mut next: Vec<_> = list.iter().cloned().collect();
            next.push(subscriber);
            *list = next.into();
        }

        tracing::trace!(event = E::KIND.as_str(), subscription = id, "handler subscribed");

        SubscriptionHandle {
            kind: E::KIND,
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every handler currently registered for its shape.
    ///
    /// Called from inside a handler, delivery is queued until the handler
    /// returns. Returns the number of handlers the event is addressed to,
    /// including ones that panicked.
    pub fn publish<E: Event>(&self, event: E) -> usize {
        let snapshot = self.inner.subscribers.read().get(&E::KIND).cloned();

        let Some(subscribers) = snapshot else {
            tracing::trace!(event = E::KIND.as_str(), "no subscribers");
            return 0;
        };
        let count = subscribers.len();

        if delivering() {
            tracing::trace!(event = E::KIND.as_str(), "queueing nested publish");
            let inner = Arc::clone(&self.inner);
            run_or_defer(move || inner.deliver_all(&subscribers, &event));
            return count;
        }

        self.inner.deliver_all(&subscribers, &event);
        run_deferred();
        count
    }

    /// Number of live handlers for shape `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.inner.subscribers.read().get(&E::KIND).map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.subscribers.read();
        f.debug_struct("EventChannel")
            .field("shapes", &table.len())
            .field("subscribers", &table.values().map(|l| l.len()).sum::<usize>())
            .finish()
    }
}
