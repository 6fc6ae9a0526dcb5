//! Winstate - a reconciled, event-emitting property model for observed
//! windows and applications.
//!
//! Every observable attribute (a window's position, an application's
//! hidden flag) lives in a property cell. Cells publish typed events on an
//! [`EventChannel`] whenever their value changes, and tag each event as
//! internal (caused by a write made here) or external (observed from the
//! environment). Writes update the cell optimistically and are reconciled
//! against the environment's acknowledgments, so a clamped or superseded
//! write never produces feedback loops.
//!
//! ```ignore
//! let state = State::new();
//! state.on(|event: &WindowPosChangedEvent| {
//!     if event.external() {
//!         tracing::info!(window = %event.window(), new = ?event.new_value(), "moved by user");
//!     }
//! });
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod property;
pub mod replay;
pub mod sim;
pub mod state;

pub use error::{BackingError, WinstateError};
pub use events::{Event, EventChannel, EventKind, PropertyEvent, SubscriptionHandle};
pub use property::{AttributeBacking, Property, WriteRequest, WriteableProperty};
pub use state::{Application, ApplicationRef, ObjectRef, State, Window, WindowRef};
