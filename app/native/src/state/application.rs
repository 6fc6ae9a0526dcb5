//! Application entity.

use std::fmt;
use std::sync::Arc;

use super::types::{ApplicationId, ApplicationRef, Validity, WindowRef};
use crate::error::BackingError;
use crate::events::{
    ApplicationFocusedWindowChangedEvent, ApplicationIsFrontmostChangedEvent,
    ApplicationIsHiddenChangedEvent, ApplicationMainWindowChangedEvent, EventChannel,
};
use crate::property::{AttributeBacking, Property, WriteableProperty};

/// Backings for every attribute of an application.
#[derive(Clone)]
pub struct ApplicationBackings {
    pub is_hidden: Arc<dyn AttributeBacking<bool>>,
    pub is_frontmost: Arc<dyn AttributeBacking<bool>>,
    pub main_window: Arc<dyn AttributeBacking<Option<WindowRef>>>,
    pub focused_window: Arc<dyn AttributeBacking<Option<WindowRef>>>,
}

/// Everything the facade needs to start observing an application.
#[derive(Clone)]
pub struct ApplicationDescriptor {
    pub id: ApplicationId,
    pub bundle_id: Option<String>,
    pub backings: ApplicationBackings,
}

impl fmt::Debug for ApplicationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationDescriptor")
            .field("id", &self.id)
            .field("bundle_id", &self.bundle_id)
            .finish_non_exhaustive()
    }
}

/// A running application and its properties.
pub struct Application {
    handle: ApplicationRef,
    bundle_id: Option<String>,
    validity: Validity,
    discovered: u64,
    is_hidden: WriteableProperty<ApplicationIsHiddenChangedEvent>,
    is_frontmost: WriteableProperty<ApplicationIsFrontmostChangedEvent>,
    main_window: WriteableProperty<ApplicationMainWindowChangedEvent>,
    focused_window: Property<ApplicationFocusedWindowChangedEvent>,
    _backings: ApplicationBackings,
}

impl Application {
    pub(crate) fn from_descriptor(
        descriptor: ApplicationDescriptor,
        channel: &EventChannel,
        discovered: u64,
    ) -> Result<Self, BackingError> {
        let ApplicationDescriptor { id, bundle_id, backings } = descriptor;
        let handle = ApplicationRef::from(id);
        let validity = Validity::new();

        let is_hidden =
            WriteableProperty::from_backing(handle, channel.clone(), validity.clone(), &backings.is_hidden)?;
        let is_frontmost = WriteableProperty::from_backing(
            handle,
            channel.clone(),
            validity.clone(),
            &backings.is_frontmost,
        )?;
        let main_window = WriteableProperty::from_backing(
            handle,
            channel.clone(),
            validity.clone(),
            &backings.main_window,
        )?;
        let focused_window = Property::from_backing(
            handle,
            channel.clone(),
            validity.clone(),
            &backings.focused_window,
        )?;

        Ok(Self {
            handle,
            bundle_id,
            validity,
            discovered,
            is_hidden,
            is_frontmost,
            main_window,
            focused_window,
            _backings: backings,
        })
    }

    #[must_use]
    pub const fn handle(&self) -> ApplicationRef { self.handle }

    /// Process identifier.
    #[must_use]
    pub const fn pid(&self) -> ApplicationId { self.handle.id() }

    /// Bundle identifier, when the application has one.
    #[must_use]
    pub fn bundle_id(&self) -> Option<&str> { self.bundle_id.as_deref() }

    #[must_use]
    pub fn is_valid(&self) -> bool { self.validity.is_valid() }

    #[must_use]
    pub const fn is_hidden(&self) -> &WriteableProperty<ApplicationIsHiddenChangedEvent> {
        &self.is_hidden
    }

    #[must_use]
    pub const fn is_frontmost(&self) -> &WriteableProperty<ApplicationIsFrontmostChangedEvent> {
        &self.is_frontmost
    }

    #[must_use]
    pub const fn main_window(&self) -> &WriteableProperty<ApplicationMainWindowChangedEvent> {
        &self.main_window
    }

    /// The window receiving keyboard input. Driven by the environment only.
    #[must_use]
    pub const fn focused_window(&self) -> &Property<ApplicationFocusedWindowChangedEvent> {
        &self.focused_window
    }

    /// Re-read every attribute from its backing.
    ///
    /// # Errors
    ///
    /// Returns the first [`BackingError`] encountered.
    pub fn refresh(&self) -> Result<(), BackingError> {
        self.is_hidden.refresh()?;
        self.is_frontmost.refresh()?;
        self.main_window.refresh()?;
        self.focused_window.refresh()
    }

    pub(crate) const fn discovered(&self) -> u64 { self.discovered }

    pub(crate) fn invalidate(&self) {
        self.is_hidden.invalidate();
        self.is_frontmost.invalidate();
        self.main_window.invalidate();
        self.focused_window.invalidate();
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("pid", &self.pid())
            .field("bundle_id", &self.bundle_id)
            .field("valid", &self.is_valid())
            .field("is_frontmost", &self.is_frontmost.read())
            .finish_non_exhaustive()
    }
}
