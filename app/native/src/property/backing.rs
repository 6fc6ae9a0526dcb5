//! Backing collaborator interface.
//!
//! A backing reads the true value of one attribute from the environment and,
//! for writable attributes, applies write requests out of band. Each request
//! must eventually be answered through [`WriteRequest::acknowledge`] or
//! [`WriteRequest::reject_invalid`]; dropping it unanswered gives up on it.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::BackingError;

/// Source of truth for one attribute of one object.
pub trait AttributeBacking<T>: Send + Sync {
    /// Read the current true value.
    ///
    /// # Errors
    ///
    /// Returns [`BackingError::Invalid`] when the owning object no longer
    /// responds, or another [`BackingError`] when the value is unavailable.
    fn read(&self) -> Result<T, BackingError>;

    /// Apply a write, fire-and-forget.
    ///
    /// Read-only attributes keep the default: the request is answered with
    /// the unchanged true value, which the cell reconciles as an external
    /// correction.
    fn request_write(&self, request: WriteRequest<T>) {
        tracing::debug!("write requested on a read-only attribute");
        match self.read() {
            Ok(actual) => request.acknowledge(actual),
            Err(_) => request.reject_invalid(),
        }
    }
}

/// Receiver side of a write request, implemented by writable cells.
pub(crate) trait Reconcile<T>: Send + Sync {
    fn acknowledge(&self, requested: T, actual: T);

    fn reject_invalid(&self);

    /// The request tagged `seq` was dropped without an answer.
    fn abandon(&self, seq: u64);
}

/// Link from a request back to its cell. Retires the write when dropped
/// while still attached.
struct Ticket<T> {
    seq: u64,
    target: Option<Weak<dyn Reconcile<T>>>,
}

impl<T> Ticket<T> {
    fn detach(&mut self) -> Option<Arc<dyn Reconcile<T>>> { self.target.take()?.upgrade() }
}

impl<T> Drop for Ticket<T> {
    fn drop(&mut self) {
        if let Some(target) = self.detach() {
            target.abandon(self.seq);
        }
    }
}

/// A pending write handed to a backing.
///
/// Holds only a weak reference to its cell, so queued requests never keep a
/// dropped object alive. A request dropped without an answer (a full queue,
/// a stopped worker) is retired and the cell re-reads the true value.
#[must_use = "a write request must be acknowledged or rejected"]
pub struct WriteRequest<T> {
    value: T,
    ticket: Ticket<T>,
}

impl<T> WriteRequest<T> {
    pub(crate) fn new(value: T, seq: u64, target: Weak<dyn Reconcile<T>>) -> Self {
        Self { value, ticket: Ticket { seq, target: Some(target) } }
    }

    /// The requested value.
    pub const fn value(&self) -> &T { &self.value }

    /// Report the value the environment actually settled on.
    pub fn acknowledge(self, actual: T) {
        let Self { value, mut ticket } = self;
        if let Some(target) = ticket.detach() {
            target.acknowledge(value, actual);
        }
    }

    /// Report that the owning object no longer exists.
    pub fn reject_invalid(self) {
        let Self { mut ticket, .. } = self;
        if let Some(target) = ticket.detach() {
            target.reject_invalid();
        }
    }
}

impl<T: Clone> WriteRequest<T> {
    /// Acknowledge that the requested value was applied unchanged.
    pub fn confirm(self) {
        let actual = self.value.clone();
        self.acknowledge(actual);
    }
}

impl<T: fmt::Debug> fmt::Debug for WriteRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attached = self.ticket.target.as_ref().is_some_and(|t| t.strong_count() > 0);
        f.debug_struct("WriteRequest")
            .field("value", &self.value)
            .field("seq", &self.ticket.seq)
            .field("attached", &attached)
            .finish()
    }
}
