//! The property cell and its reconciliation protocol.
//!
//! A cell holds the last reconciled value of one attribute and publishes a
//! property event for every real change. Two sources feed it:
//!
//! - external reports from the backing (`report_external_value`)
//! - internal writes (`write`) and their acknowledgments (`acknowledge_write`)
//!
//! # Pending Writes
//!
//! Every write gets a sequence number and is queued until acknowledged. Only
//! the latest write is authoritative; acknowledgments of superseded writes
//! are folded silently because the newer write still decides the outcome.
//!
//! # Ordering
//!
//! State changes happen under a short per-cell lock that is never held while
//! handlers or backings run. Each change appends to the cell's outbox in the
//! same critical section, and the outbox is drained by one thread at a time:
//! events are published and write requests dispatched in the order the
//! changes were made. A thread that finds the outbox already being drained
//! leaves its entries to the drainer and returns.
//!
//! A change made from inside a handler is drained once that delivery
//! returns, so a thread never waits on a handler while delivering to another.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use eyeball::{Observable, Subscriber};
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::backing::{AttributeBacking, Reconcile, WriteRequest};
use crate::error::BackingError;
use crate::events::channel::run_or_defer;
use crate::events::{EventChannel, PropertyEvent};
use crate::state::Validity;

struct PendingWrite<T> {
    seq: u64,
    value: T,
}

enum Outgoing<E: PropertyEvent> {
    Publish(E),
    Dispatch { seq: u64, value: E::Value },
}

struct CellState<E: PropertyEvent> {
    value: Observable<E::Value>,
    pending: SmallVec<[PendingWrite<E::Value>; 2]>,
    /// Sequence number of the authoritative write, if one is in flight.
    latest: Option<u64>,
    next_seq: u64,
    outbox: VecDeque<Outgoing<E>>,
    draining: bool,
}

impl<E: PropertyEvent> CellState<E> {
    fn expected(&self) -> Option<&E::Value> {
        let latest = self.latest?;
        self.pending.iter().find(|p| p.seq == latest).map(|p| &p.value)
    }

    fn current(&self) -> &E::Value { Observable::get(&self.value) }

    /// Store `new_value` and queue the event describing the change.
    fn change(&mut self, object: &E::Object, external: bool, new_value: E::Value) {
        let old_value = Observable::set(&mut self.value, new_value.clone());
        let event = E::new(object.clone(), external, old_value, new_value);
        self.outbox.push_back(Outgoing::Publish(event));
    }

    /// Reconcile an observed value. Returns whether an event was queued.
    fn observe(&mut self, object: &E::Object, new_value: E::Value) -> bool {
        if *self.current() == new_value {
            return false;
        }

        // The environment catching up with our own write is never external.
        let confirms_write = self.expected() == Some(&new_value);
        self.change(object, !confirms_write, new_value);
        true
    }
}

pub(crate) struct CellCore<E: PropertyEvent> {
    this: Weak<Self>,
    object: E::Object,
    state: Mutex<CellState<E>>,
    channel: EventChannel,
    validity: Validity,
    backing: Weak<dyn AttributeBacking<E::Value>>,
}

impl<E: PropertyEvent> CellCore<E> {
    pub(crate) fn new(
        object: E::Object,
        initial: E::Value,
        channel: EventChannel,
        validity: Validity,
        backing: Weak<dyn AttributeBacking<E::Value>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            object,
            state: Mutex::new(CellState {
                value: Observable::new(initial),
                pending: SmallVec::new(),
                latest: None,
                next_seq: 0,
                outbox: VecDeque::new(),
                draining: false,
            }),
            channel,
            validity,
            backing,
        })
    }

    pub(crate) const fn object(&self) -> &E::Object { &self.object }

    pub(crate) fn is_valid(&self) -> bool { self.validity.is_valid() }

    pub(crate) fn read(&self) -> E::Value { self.state.lock().current().clone() }

    pub(crate) fn watch(&self) -> Subscriber<E::Value> {
        Observable::subscribe(&self.state.lock().value)
    }

    pub(crate) fn has_pending_write(&self) -> bool { self.state.lock().latest.is_some() }

    pub(crate) fn expected_value(&self) -> Option<E::Value> {
        self.state.lock().expected().cloned()
    }

    /// Reconcile a value observed in the environment.
    pub(crate) fn report_external(&self, new_value: E::Value) {
        {
            let mut cell = self.state.lock();
            if !self.validity.is_valid() {
                tracing::trace!(object = ?self.object, "ignoring report for invalid object");
                return;
            }
            if !cell.observe(&self.object, new_value) {
                return;
            }
        }
        self.schedule_drain();
    }

    /// Reconcile the backing's answer to a write request.
    pub(crate) fn apply_acknowledgment(&self, requested: E::Value, actual: E::Value) {
        {
            let mut cell = self.state.lock();
            if !self.validity.is_valid() {
                return;
            }

            let Some(index) = cell.pending.iter().position(|p| p.value == requested) else {
                tracing::debug!(
                    object = ?self.object,
                    ?requested,
                    "acknowledgment without a pending write; reconciling as external"
                );
                if !cell.observe(&self.object, actual) {
                    return;
                }
                drop(cell);
                self.schedule_drain();
                return;
            };

            let entry = cell.pending.remove(index);
            if cell.latest != Some(entry.seq) {
                tracing::trace!(object = ?self.object, ?requested, "folding stale acknowledgment");
                return;
            }

            cell.latest = None;
            if *cell.current() == actual {
                return;
            }

            let external = actual != requested;
            cell.change(&self.object, external, actual);
        }
        self.schedule_drain();
    }

    /// Retire a request the backing dropped without answering.
    ///
    /// An older write still in flight takes over; with none left the cell
    /// re-reads the true value.
    fn abandon_request(&self, seq: u64) {
        let reread = {
            let mut cell = self.state.lock();
            let Some(index) = cell.pending.iter().position(|p| p.seq == seq) else {
                return;
            };
            cell.pending.remove(index);
            tracing::debug!(object = ?self.object, seq, "write request dropped unanswered");

            if cell.latest != Some(seq) {
                return;
            }
            cell.latest = cell.pending.last().map(|p| p.seq);
            cell.latest.is_none()
        };

        if reread && let Err(err) = self.refresh() {
            tracing::debug!(object = ?self.object, error = %err, "re-read after dropped write failed");
        }
    }

    fn drop_pending(&self) {
        let mut cell = self.state.lock();
        cell.pending.clear();
        cell.latest = None;
        cell.outbox.retain(|item| matches!(item, Outgoing::Publish(_)));
    }

    pub(crate) fn invalidate(&self) {
        if self.validity.invalidate() {
            tracing::debug!(object = ?self.object, "object marked invalid");
        }
        self.drop_pending();
    }

    /// Re-read the true value from the backing.
    pub(crate) fn refresh(&self) -> Result<(), BackingError> {
        let Some(backing) = self.backing.upgrade() else {
            self.invalidate();
            return Err(BackingError::Released);
        };

        match backing.read() {
            Ok(value) => {
                {
                    let mut cell = self.state.lock();
                    // A read racing an in-flight write may still see the old value.
                    if cell.latest.is_some() {
                        tracing::trace!(object = ?self.object, "refresh deferred; write in flight");
                        return Ok(());
                    }
                    if !self.validity.is_valid() || !cell.observe(&self.object, value) {
                        return Ok(());
                    }
                }
                self.schedule_drain();
                Ok(())
            }
            Err(BackingError::Invalid) => {
                self.invalidate();
                Err(BackingError::Invalid)
            }
            Err(err) => Err(err),
        }
    }

    /// Issue an internal write.
    pub(crate) fn write(&self, new_value: E::Value) {
        {
            let mut cell = self.state.lock();

            if !self.validity.is_valid() {
                tracing::debug!(object = ?self.object, "dropping write to invalid object");
                return;
            }

            let unchanged = *cell.current() == new_value;

            // Writing the current value only matters when a different write is
            // still in flight and would otherwise win.
            if unchanged && cell.expected().is_none_or(|expected| *expected == new_value) {
                return;
            }

            let seq = cell.next_seq;
            cell.next_seq += 1;
            cell.pending.push(PendingWrite { seq, value: new_value.clone() });
            cell.latest = Some(seq);

            if !unchanged {
                cell.change(&self.object, false, new_value.clone());
            }
            cell.outbox.push_back(Outgoing::Dispatch { seq, value: new_value });
        }
        self.schedule_drain();
    }

    /// Claim the outbox and drain it, unless another thread already is.
    fn schedule_drain(&self) {
        {
            let mut cell = self.state.lock();
            if cell.draining || cell.outbox.is_empty() {
                return;
            }
            cell.draining = true;
        }

        let this = self.this.clone();
        run_or_defer(move || {
            if let Some(core) = this.upgrade() {
                core.drain();
            }
        });
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut cell = self.state.lock();
                let Some(next) = cell.outbox.pop_front() else {
                    cell.draining = false;
                    return;
                };
                next
            };

            match next {
                Outgoing::Publish(event) => {
                    self.channel.publish(event);
                }
                Outgoing::Dispatch { seq, value } => self.dispatch(seq, value),
            }
        }
    }

    fn dispatch(&self, seq: u64, value: E::Value) {
        {
            let mut cell = self.state.lock();
            // A newer write was made before this one reached the backing.
            if cell.latest != Some(seq) {
                cell.pending.retain(|p| p.seq != seq);
                tracing::trace!(object = ?self.object, seq, "write superseded before dispatch");
                return;
            }
        }

        let Some(backing) = self.backing.upgrade() else {
            tracing::warn!(object = ?self.object, "backing released; invalidating object");
            self.invalidate();
            return;
        };

        let this: Weak<Self> = self.this.clone();
        let target: Weak<dyn Reconcile<E::Value>> = this;
        backing.request_write(WriteRequest::new(value, seq, target));
    }
}

impl<E: PropertyEvent> Reconcile<E::Value> for CellCore<E> {
    fn acknowledge(&self, requested: E::Value, actual: E::Value) {
        self.apply_acknowledgment(requested, actual);
    }

    fn reject_invalid(&self) { self.invalidate(); }

    fn abandon(&self, seq: u64) { self.abandon_request(seq); }
}
