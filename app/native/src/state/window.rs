//! Window entity.

use std::fmt;
use std::sync::Arc;

use super::types::{ApplicationId, ApplicationRef, Point, Size, Validity, WindowId, WindowRef};
use crate::error::BackingError;
use crate::events::{
    EventChannel, WindowFullscreenChangedEvent, WindowMinimizedChangedEvent, WindowPosChangedEvent,
    WindowSizeChangedEvent, WindowTitleChangedEvent,
};
use crate::property::{AttributeBacking, Property, WriteableProperty};

/// Backings for every attribute of a window.
#[derive(Clone)]
pub struct WindowBackings {
    pub position: Arc<dyn AttributeBacking<Point>>,
    pub size: Arc<dyn AttributeBacking<Size>>,
    pub title: Arc<dyn AttributeBacking<String>>,
    pub is_minimized: Arc<dyn AttributeBacking<bool>>,
    pub is_fullscreen: Arc<dyn AttributeBacking<bool>>,
}

/// Everything the facade needs to start observing a window.
#[derive(Clone)]
pub struct WindowDescriptor {
    pub id: WindowId,
    pub application: ApplicationId,
    pub backings: WindowBackings,
}

impl fmt::Debug for WindowDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowDescriptor")
            .field("id", &self.id)
            .field("application", &self.application)
            .finish_non_exhaustive()
    }
}

/// An observed window and its properties.
pub struct Window {
    handle: WindowRef,
    application: ApplicationRef,
    validity: Validity,
    discovered: u64,
    position: WriteableProperty<WindowPosChangedEvent>,
    size: WriteableProperty<WindowSizeChangedEvent>,
    title: Property<WindowTitleChangedEvent>,
    is_minimized: WriteableProperty<WindowMinimizedChangedEvent>,
    is_fullscreen: WriteableProperty<WindowFullscreenChangedEvent>,
    // Cells only hold weak references; the window keeps its backings alive.
    _backings: WindowBackings,
}

impl Window {
    pub(crate) fn from_descriptor(
        descriptor: WindowDescriptor,
        channel: &EventChannel,
        discovered: u64,
    ) -> Result<Self, BackingError> {
        let WindowDescriptor { id, application, backings } = descriptor;
        let handle = WindowRef::from(id);
        let validity = Validity::new();

        Ok(Self {
            handle,
            application: ApplicationRef::from(application),
            discovered,
            position: WriteableProperty::from_backing(
                handle,
                channel.clone(),
                validity.clone(),
                &backings.position,
            )?,
            size: WriteableProperty::from_backing(
                handle,
                channel.clone(),
                validity.clone(),
                &backings.size,
            )?,
            title: Property::from_backing(handle, channel.clone(), validity.clone(), &backings.title)?,
            is_minimized: WriteableProperty::from_backing(
                handle,
                channel.clone(),
                validity.clone(),
                &backings.is_minimized,
            )?,
            is_fullscreen: WriteableProperty::from_backing(
                handle,
                channel.clone(),
                validity.clone(),
                &backings.is_fullscreen,
            )?,
            validity,
            _backings: backings,
        })
    }

    #[must_use]
    pub const fn handle(&self) -> WindowRef { self.handle }

    #[must_use]
    pub const fn id(&self) -> WindowId { self.handle.id() }

    /// The owning application.
    #[must_use]
    pub const fn application(&self) -> ApplicationRef { self.application }

    /// Whether the window still responds.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.validity.is_valid() }

    /// Top-left corner in global coordinates.
    #[must_use]
    pub const fn position(&self) -> &WriteableProperty<WindowPosChangedEvent> { &self.position }

    #[must_use]
    pub const fn size(&self) -> &WriteableProperty<WindowSizeChangedEvent> { &self.size }

    #[must_use]
    pub const fn title(&self) -> &Property<WindowTitleChangedEvent> { &self.title }

    #[must_use]
    pub const fn is_minimized(&self) -> &WriteableProperty<WindowMinimizedChangedEvent> {
        &self.is_minimized
    }

    #[must_use]
    pub const fn is_fullscreen(&self) -> &WriteableProperty<WindowFullscreenChangedEvent> {
        &self.is_fullscreen
    }

    /// Re-read every attribute from its backing.
    ///
    /// Stops at the first attribute that fails; an invalid backing marks the
    /// whole window invalid.
    ///
    /// # Errors
    ///
    /// Returns the first [`BackingError`] encountered.
    pub fn refresh(&self) -> Result<(), BackingError> {
        self.position.refresh()?;
        self.size.refresh()?;
        self.title.refresh()?;
        self.is_minimized.refresh()?;
        self.is_fullscreen.refresh()
    }

    pub(crate) const fn discovered(&self) -> u64 { self.discovered }

    pub(crate) fn invalidate(&self) {
        self.position.invalidate();
        self.size.invalidate();
        self.title.invalidate();
        self.is_minimized.invalidate();
        self.is_fullscreen.invalidate();
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id())
            .field("application", &self.application.id())
            .field("valid", &self.is_valid())
            .field("position", &self.position.read())
            .field("size", &self.size.read())
            .field("title", &self.title.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedAttribute;

    fn descriptor(title: &Arc<SimulatedAttribute<String>>) -> WindowDescriptor {
        WindowDescriptor {
            id: WindowId(10),
            application: ApplicationId(500),
            backings: WindowBackings {
                position: Arc::new(SimulatedAttribute::new(Point::new(5.0, 6.0))),
                size: Arc::new(SimulatedAttribute::new(Size::new(800.0, 600.0))),
                title: title.clone(),
                is_minimized: Arc::new(SimulatedAttribute::new(false)),
                is_fullscreen: Arc::new(SimulatedAttribute::new(false)),
            },
        }
    }

    #[test]
    fn test_initial_values_are_read() {
        let title = Arc::new(SimulatedAttribute::new("Inbox".to_string()));
        let window = Window::from_descriptor(descriptor(&title), &EventChannel::new(), 0).unwrap();

        assert_eq!(window.position().read(), Point::new(5.0, 6.0));
        assert_eq!(window.size().read(), Size::new(800.0, 600.0));
        assert_eq!(window.title().read(), "Inbox");
        assert_eq!(window.application().id(), ApplicationId(500));
        assert!(window.is_valid());
    }

    #[test]
    fn test_failing_read_aborts_construction() {
        let title = Arc::new(SimulatedAttribute::new(String::new()));
        title.invalidate();

        let result = Window::from_descriptor(descriptor(&title), &EventChannel::new(), 0);
        assert_eq!(result.err(), Some(BackingError::Invalid));
    }

    #[test]
    fn test_invalidate_silences_every_property() {
        let title = Arc::new(SimulatedAttribute::new("a".to_string()));
        let channel = EventChannel::new();
        let window = Window::from_descriptor(descriptor(&title), &channel, 0).unwrap();

        window.invalidate();
        window.size().write(Size::new(1.0, 1.0));
        window.title().report_external_value("b".to_string());

        assert!(!window.is_valid());
        assert!(!window.position().is_valid());
        assert_eq!(window.size().read(), Size::new(800.0, 600.0));
        assert_eq!(window.title().read(), "a");
    }

    #[test]
    fn test_refresh_picks_up_title_change() {
        let title = Arc::new(SimulatedAttribute::new("a".to_string()));
        let window = Window::from_descriptor(descriptor(&title), &EventChannel::new(), 0).unwrap();

        title.set_true_value("b".to_string());
        window.refresh().unwrap();

        assert_eq!(window.title().read(), "b");
    }
}
