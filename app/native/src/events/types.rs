//! Concrete event shapes.
//!
//! Lifecycle shapes carry the `external` flag and the object handle.
//! Property shapes additionally carry the old and new value; the property
//! they describe is implied by the shape itself.

use serde::Serialize;

use super::{ApplicationEvent, Event, EventKind, PropertyEvent, WindowEvent};
use crate::state::{ApplicationRef, ObjectRef, Point, Size, WindowRef};

macro_rules! lifecycle_event {
    ($(#[$meta:meta])* $name:ident, $kind:ident, window) => {
        lifecycle_event!(@shape $(#[$meta])* $name, $kind, window, WindowRef, WindowEvent);
    };
    ($(#[$meta:meta])* $name:ident, $kind:ident, application) => {
        lifecycle_event!(@shape $(#[$meta])* $name, $kind, application, ApplicationRef, ApplicationEvent);
    };
    (@shape $(#[$meta:meta])* $name:ident, $kind:ident, $field:ident, $object:ty, $owner:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            external: bool,
            $field: $object,
        }

        impl $name {
            #[must_use]
            pub const fn new($field: $object, external: bool) -> Self { Self { external, $field } }
        }

        impl Event for $name {
            const KIND: EventKind = EventKind::$kind;

            fn external(&self) -> bool { self.external }

            fn subject(&self) -> ObjectRef { ObjectRef::from(self.$field) }
        }

        impl $owner for $name {
            fn $field(&self) -> &$object { &self.$field }
        }
    };
}

macro_rules! property_event {
    ($(#[$meta:meta])* $name:ident, $kind:ident, window, $value:ty) => {
        property_event!(@shape $(#[$meta])* $name, $kind, window, WindowRef, WindowEvent, $value);
    };
    ($(#[$meta:meta])* $name:ident, $kind:ident, application, $value:ty) => {
        property_event!(@shape $(#[$meta])* $name, $kind, application, ApplicationRef, ApplicationEvent, $value);
    };
    (@shape $(#[$meta:meta])* $name:ident, $kind:ident, $field:ident, $object:ty, $owner:ident, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            external: bool,
            $field: $object,
            old_value: $value,
            new_value: $value,
        }

        impl Event for $name {
            const KIND: EventKind = EventKind::$kind;

            fn external(&self) -> bool { self.external }

            fn subject(&self) -> ObjectRef { ObjectRef::from(self.$field) }
        }

        impl $owner for $name {
            fn $field(&self) -> &$object { &self.$field }
        }

        impl PropertyEvent for $name {
            type Object = $object;
            type Value = $value;

            fn new(object: $object, external: bool, old_value: $value, new_value: $value) -> Self {
                debug_assert!(old_value != new_value, "property events must describe a change");
                Self { external, $field: object, old_value, new_value }
            }

            fn object(&self) -> &$object { &self.$field }

            fn old_value(&self) -> &$value { &self.old_value }

            fn new_value(&self) -> &$value { &self.new_value }
        }
    };
}

// ============================================================================
// Window Events
// ============================================================================

lifecycle_event!(
    /// A window appeared.
    WindowCreatedEvent, WindowCreated, window
);

lifecycle_event!(
    /// A window was closed or otherwise went away.
    WindowDestroyedEvent, WindowDestroyed, window
);

property_event!(
    /// A window's top-left position changed.
    WindowPosChangedEvent, WindowPosChanged, window, Point
);

property_event!(
    /// A window's size changed.
    WindowSizeChangedEvent, WindowSizeChanged, window, Size
);

property_event!(
    /// A window's title changed.
    WindowTitleChangedEvent, WindowTitleChanged, window, String
);

property_event!(
    /// A window was minimized or restored.
    WindowMinimizedChangedEvent, WindowMinimizedChanged, window, bool
);

property_event!(
    /// A window entered or left fullscreen.
    WindowFullscreenChangedEvent, WindowFullscreenChanged, window, bool
);

// ============================================================================
// Application Events
// ============================================================================

lifecycle_event!(
    /// An application started and is now observed.
    ApplicationLaunchedEvent, ApplicationLaunched, application
);

lifecycle_event!(
    /// An application quit.
    ApplicationTerminatedEvent, ApplicationTerminated, application
);

property_event!(
    /// An application was hidden or shown.
    ApplicationIsHiddenChangedEvent, ApplicationIsHiddenChanged, application, bool
);

property_event!(
    /// An application became or stopped being frontmost.
    ApplicationIsFrontmostChangedEvent, ApplicationIsFrontmostChanged, application, bool
);

property_event!(
    /// An application's main window changed.
    ApplicationMainWindowChangedEvent, ApplicationMainWindowChanged, application, Option<WindowRef>
);

property_event!(
    /// An application's focused window changed.
    ApplicationFocusedWindowChangedEvent, ApplicationFocusedWindowChanged, application, Option<WindowRef>
);
