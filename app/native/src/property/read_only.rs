//! Read-only property: driven entirely by the environment.

use std::fmt;
use std::sync::Arc;

use eyeball::Subscriber;

use super::backing::AttributeBacking;
use super::cell::CellCore;
use crate::error::BackingError;
use crate::events::{EventChannel, PropertyEvent};
use crate::state::Validity;

/// An externally driven value publishing `E` on every change.
///
/// Cheap to clone; clones share the same cell.
pub struct Property<E: PropertyEvent> {
    pub(super) core: Arc<CellCore<E>>,
}

impl<E: PropertyEvent> Clone for Property<E> {
    fn clone(&self) -> Self { Self { core: Arc::clone(&self.core) } }
}

impl<E: PropertyEvent> Property<E> {
    /// Create a cell for `object` holding `initial`.
    ///
    /// The cell keeps only a weak reference to `backing`; the owning entity
    /// is responsible for keeping it alive.
    #[must_use]
    pub fn new(
        object: E::Object,
        initial: E::Value,
        channel: EventChannel,
        validity: Validity,
        backing: &Arc<dyn AttributeBacking<E::Value>>,
    ) -> Self {
        Self {
            core: CellCore::new(
                object,
                initial,
                channel,
                validity,
                Arc::downgrade(backing),
            ),
        }
    }

    /// Create a cell by reading its initial value from `backing`.
    ///
    /// # Errors
    ///
    /// Returns the backing's error if the initial read fails.
    pub fn from_backing(
        object: E::Object,
        channel: EventChannel,
        validity: Validity,
        backing: &Arc<dyn AttributeBacking<E::Value>>,
    ) -> Result<Self, BackingError> {
        let initial = backing.read()?;
        Ok(Self::new(object, initial, channel, validity, backing))
    }

    /// Last reconciled value. Never queries the backing.
    #[must_use]
    pub fn read(&self) -> E::Value { self.core.read() }

    /// Handle of the owning object.
    #[must_use]
    pub fn object(&self) -> &E::Object { self.core.object() }

    /// Whether the owning object is still valid.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.core.is_valid() }

    /// Reconcile a value the backing observed in the environment.
    ///
    /// Publishes an external event unless the value is unchanged or the
    /// owning object is invalid.
    pub fn report_external_value(&self, value: E::Value) { self.core.report_external(value); }

    /// Re-read the true value from the backing and reconcile it.
    ///
    /// # Errors
    ///
    /// Returns [`BackingError::Invalid`] or [`BackingError::Released`] after
    /// marking the owning object invalid, or any other read error unchanged.
    pub fn refresh(&self) -> Result<(), BackingError> { self.core.refresh() }

    /// Subscribe to the stream of stored values.
    #[must_use]
    pub fn watch(&self) -> Subscriber<E::Value> { self.core.watch() }

    pub(crate) fn invalidate(&self) { self.core.invalidate(); }
}

impl<E: PropertyEvent> fmt::Debug for Property<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("kind", &E::KIND)
            .field("object", self.object())
            .field("value", &self.read())
            .finish()
    }
}
