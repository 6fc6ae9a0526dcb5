//! Event definitions and dispatch.
//!
//! Every event shape is its own struct and its own dispatch address. Shapes
//! are grouped by small capability traits:
//!
//! - [`Event`] - carries the `external` flag and the shape's [`EventKind`]
//! - [`WindowEvent`] / [`ApplicationEvent`] - names the owning object
//! - [`PropertyEvent`] - carries `old_value`/`new_value` of one fixed type
//!
//! The [`EventKind`] enumeration is the subscription key of the
//! [`EventChannel`]. Adding a shape means adding one variant here and one
//! macro invocation in [`types`]; nothing else changes.

pub mod channel;
pub mod types;

use std::any::Any;
use std::fmt;

use serde::Serialize;

pub use channel::{EventChannel, FailureObserver, HandlerFailure, LogFailures, SubscriptionHandle};
pub use types::{
    ApplicationFocusedWindowChangedEvent, ApplicationIsFrontmostChangedEvent,
    ApplicationIsHiddenChangedEvent, ApplicationLaunchedEvent, ApplicationMainWindowChangedEvent,
    ApplicationTerminatedEvent, WindowCreatedEvent, WindowDestroyedEvent,
    WindowFullscreenChangedEvent, WindowMinimizedChangedEvent, WindowPosChangedEvent,
    WindowSizeChangedEvent, WindowTitleChangedEvent,
};

use crate::state::{ApplicationRef, ObjectRef, WindowRef};

// ============================================================================
// Event Kind
// ============================================================================

/// Identifies a concrete event shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    WindowCreated,
    WindowDestroyed,
    WindowPosChanged,
    WindowSizeChanged,
    WindowTitleChanged,
    WindowMinimizedChanged,
    WindowFullscreenChanged,
    ApplicationLaunched,
    ApplicationTerminated,
    ApplicationIsHiddenChanged,
    ApplicationIsFrontmostChanged,
    ApplicationMainWindowChanged,
    ApplicationFocusedWindowChanged,
}

impl EventKind {
    /// Every event shape, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::WindowCreated,
        Self::WindowDestroyed,
        Self::WindowPosChanged,
        Self::WindowSizeChanged,
        Self::WindowTitleChanged,
        Self::WindowMinimizedChanged,
        Self::WindowFullscreenChanged,
        Self::ApplicationLaunched,
        Self::ApplicationTerminated,
        Self::ApplicationIsHiddenChanged,
        Self::ApplicationIsFrontmostChanged,
        Self::ApplicationMainWindowChanged,
        Self::ApplicationFocusedWindowChanged,
    ];

    /// Returns the shape name as a static kebab-case string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WindowCreated => "window-created",
            Self::WindowDestroyed => "window-destroyed",
            Self::WindowPosChanged => "window-pos-changed",
            Self::WindowSizeChanged => "window-size-changed",
            Self::WindowTitleChanged => "window-title-changed",
            Self::WindowMinimizedChanged => "window-minimized-changed",
            Self::WindowFullscreenChanged => "window-fullscreen-changed",
            Self::ApplicationLaunched => "application-launched",
            Self::ApplicationTerminated => "application-terminated",
            Self::ApplicationIsHiddenChanged => "application-is-hidden-changed",
            Self::ApplicationIsFrontmostChanged => "application-is-frontmost-changed",
            Self::ApplicationMainWindowChanged => "application-main-window-changed",
            Self::ApplicationFocusedWindowChanged => "application-focused-window-changed",
        }
    }

    /// Returns true for shapes that describe an object appearing or going away.
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::WindowCreated
                | Self::WindowDestroyed
                | Self::ApplicationLaunched
                | Self::ApplicationTerminated
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// An immutable notification that can travel on an [`EventChannel`].
pub trait Event: Any + Clone + fmt::Debug + Send + Sync {
    /// Dispatch key of this shape.
    const KIND: EventKind;

    /// True if the change was observed from the environment rather than
    /// requested by this system.
    fn external(&self) -> bool;

    /// The object the event is about.
    fn subject(&self) -> ObjectRef;
}

/// An event owned by a window.
pub trait WindowEvent: Event {
    fn window(&self) -> &WindowRef;
}

/// An event owned by an application.
pub trait ApplicationEvent: Event {
    fn application(&self) -> &ApplicationRef;
}

/// A change of one property value.
///
/// Implementors never carry equal old and new values; cells only build them
/// for real changes.
pub trait PropertyEvent: Event {
    /// Handle type of the owning object.
    type Object: Clone + fmt::Debug + Send + Sync + 'static;
    /// Value type of the property.
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Build the event for a change of `object` from `old_value` to `new_value`.
    fn new(
        object: Self::Object,
        external: bool,
        old_value: Self::Value,
        new_value: Self::Value,
    ) -> Self;

    fn object(&self) -> &Self::Object;

    fn old_value(&self) -> &Self::Value;

    fn new_value(&self) -> &Self::Value;
}
