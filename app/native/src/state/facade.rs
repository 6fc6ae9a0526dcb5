//! The `State` facade: object registry plus event channel.
//!
//! The facade is the root of one observed world. The registry collaborator
//! reports objects appearing and going away; the facade builds entities,
//! keeps them in concurrent maps and publishes the lifecycle events. Clients
//! query snapshots and subscribe through [`State::on`].
//!
//! Lifecycle events are always published after the registry guards are
//! released, so handlers may query the facade freely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::application::{Application, ApplicationDescriptor};
use super::types::{ApplicationId, ApplicationRef, ObjectRef, WindowId, WindowRef};
use super::window::{Window, WindowDescriptor};
use crate::error::WinstateError;
use crate::events::{
    ApplicationLaunchedEvent, ApplicationTerminatedEvent, Event, EventChannel, FailureObserver,
    SubscriptionHandle, WindowCreatedEvent, WindowDestroyedEvent,
};

/// Description of a newly observed object.
#[derive(Debug, Clone)]
pub enum ObjectDescriptor {
    Application(ApplicationDescriptor),
    Window(WindowDescriptor),
}

impl From<ApplicationDescriptor> for ObjectDescriptor {
    fn from(descriptor: ApplicationDescriptor) -> Self { Self::Application(descriptor) }
}

impl From<WindowDescriptor> for ObjectDescriptor {
    fn from(descriptor: WindowDescriptor) -> Self { Self::Window(descriptor) }
}

struct StateInner {
    channel: EventChannel,
    applications: DashMap<ApplicationId, Arc<Application>>,
    windows: DashMap<WindowId, Arc<Window>>,
    discovery: AtomicU64,
}

/// Root of the observed state.
///
/// Cheap to clone; clones share the registry and the channel.
#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

impl Default for State {
    fn default() -> Self { Self::new() }
}

impl State {
    /// Create an empty state with its own event channel.
    #[must_use]
    pub fn new() -> Self { Self::from_channel(EventChannel::new()) }

    /// Create an empty state reporting handler failures to `observer`.
    #[must_use]
    pub fn with_observer(observer: Arc<dyn FailureObserver>) -> Self {
        Self::from_channel(EventChannel::with_observer(observer))
    }

    fn from_channel(channel: EventChannel) -> Self {
        Self {
            inner: Arc::new(StateInner {
                channel,
                applications: DashMap::new(),
                windows: DashMap::new(),
                discovery: AtomicU64::new(0),
            }),
        }
    }

    /// The channel every object of this state publishes on.
    #[must_use]
    pub fn channel(&self) -> &EventChannel { &self.inner.channel }

    /// Subscribe to every future event of shape `E`.
    pub fn on<E, F>(&self, handler: F) -> SubscriptionHandle
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.inner.channel.subscribe(handler)
    }

    fn next_discovery(&self) -> u64 { self.inner.discovery.fetch_add(1, Ordering::Relaxed) }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All valid objects, applications and windows, in discovery order.
    #[must_use]
    pub fn visible_objects(&self) -> Vec<ObjectRef> {
        // Never hold a guard on both maps at once.
        let mut objects: Vec<(u64, ObjectRef)> = self
            .inner
            .applications
            .iter()
            .filter(|app| app.is_valid())
            .map(|app| (app.discovered(), ObjectRef::from(app.handle())))
            .collect();
        objects.extend(
            self.inner
                .windows
                .iter()
                .filter(|window| window.is_valid())
                .map(|window| (window.discovered(), ObjectRef::from(window.handle()))),
        );
        objects.sort_unstable_by_key(|(seq, _)| *seq);
        objects.into_iter().map(|(_, object)| object).collect()
    }

    /// Valid windows that are not minimized, in discovery order.
    #[must_use]
    pub fn visible_windows(&self) -> Vec<Arc<Window>> {
        self.known_windows()
            .into_iter()
            .filter(|window| window.is_valid() && !window.is_minimized().read())
            .collect()
    }

    /// Every registered window, in discovery order.
    #[must_use]
    pub fn known_windows(&self) -> Vec<Arc<Window>> {
        let mut windows: Vec<_> =
            self.inner.windows.iter().map(|entry| Arc::clone(entry.value())).collect();
        windows.sort_unstable_by_key(|window| window.discovered());
        windows
    }

    /// Every registered application, in discovery order.
    #[must_use]
    pub fn running_applications(&self) -> Vec<Arc<Application>> {
        let mut applications: Vec<_> =
            self.inner.applications.iter().map(|entry| Arc::clone(entry.value())).collect();
        applications.sort_unstable_by_key(|app| app.discovered());
        applications
    }

    /// The valid application currently reporting itself frontmost.
    #[must_use]
    pub fn frontmost_application(&self) -> Option<Arc<Application>> {
        self.running_applications()
            .into_iter()
            .find(|app| app.is_valid() && app.is_frontmost().read())
    }

    /// Windows owned by `application`, in discovery order.
    #[must_use]
    pub fn windows_of(&self, application: ApplicationRef) -> Vec<Arc<Window>> {
        self.known_windows()
            .into_iter()
            .filter(|window| window.application() == application)
            .collect()
    }

    /// Resolve a window handle.
    #[must_use]
    pub fn window(&self, window: &WindowRef) -> Option<Arc<Window>> {
        self.inner.windows.get(&window.id()).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve an application handle.
    #[must_use]
    pub fn application(&self, application: &ApplicationRef) -> Option<Arc<Application>> {
        self.inner.applications.get(&application.id()).map(|entry| Arc::clone(entry.value()))
    }

    // ========================================================================
    // Registry Notifications
    // ========================================================================

    /// Register a newly observed object and publish its lifecycle event.
    ///
    /// # Errors
    ///
    /// See [`notify_application_launched`](Self::notify_application_launched)
    /// and [`notify_window_created`](Self::notify_window_created).
    pub fn notify_object_created(
        &self,
        descriptor: ObjectDescriptor,
    ) -> Result<ObjectRef, WinstateError> {
        match descriptor {
            ObjectDescriptor::Application(app) => {
                self.notify_application_launched(app).map(ObjectRef::from)
            }
            ObjectDescriptor::Window(window) => self.notify_window_created(window).map(ObjectRef::from),
        }
    }

    /// Forget an object and publish its lifecycle event.
    ///
    /// Returns `false` if the object was not registered.
    pub fn notify_object_destroyed(&self, object: ObjectRef) -> bool {
        match object {
            ObjectRef::Application(app) => self.notify_application_terminated(app),
            ObjectRef::Window(window) => self.notify_window_destroyed(window),
        }
    }

    /// Register an application.
    ///
    /// # Errors
    ///
    /// Returns [`WinstateError::DuplicateObject`] if the pid is already
    /// registered, or [`WinstateError::Backing`] if an initial read fails.
    pub fn notify_application_launched(
        &self,
        descriptor: ApplicationDescriptor,
    ) -> Result<ApplicationRef, WinstateError> {
        let handle = ApplicationRef::from(descriptor.id);
        if self.inner.applications.contains_key(&descriptor.id) {
            return Err(WinstateError::DuplicateObject(handle.into()));
        }

        let app = Application::from_descriptor(descriptor, &self.inner.channel, self.next_discovery())?;
        match self.inner.applications.entry(handle.id()) {
            Entry::Occupied(_) => return Err(WinstateError::DuplicateObject(handle.into())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(app));
            }
        }

        tracing::debug!(app = %handle.id(), "application launched");
        self.inner.channel.publish(ApplicationLaunchedEvent::new(handle, true));
        Ok(handle)
    }

    /// Register a window of an already registered application.
    ///
    /// # Errors
    ///
    /// Returns [`WinstateError::UnknownApplication`] if the owner is not
    /// registered, [`WinstateError::DuplicateObject`] if the id is already
    /// registered, or [`WinstateError::Backing`] if an initial read fails.
    pub fn notify_window_created(
        &self,
        descriptor: WindowDescriptor,
    ) -> Result<WindowRef, WinstateError> {
        let handle = WindowRef::from(descriptor.id);
        let owner = descriptor.application;
        if !self.inner.applications.contains_key(&owner) {
            return Err(WinstateError::UnknownApplication(owner));
        }
        if self.inner.windows.contains_key(&descriptor.id) {
            return Err(WinstateError::DuplicateObject(handle.into()));
        }

        let window = Window::from_descriptor(descriptor, &self.inner.channel, self.next_discovery())?;

        // Termination removes the owner before collecting its windows. Holding
        // the owner's entry across the insert keeps a window from landing
        // after that sweep.
        {
            let Some(_owner) = self.inner.applications.get(&owner) else {
                window.invalidate();
                return Err(WinstateError::UnknownApplication(owner));
            };
            match self.inner.windows.entry(handle.id()) {
                Entry::Occupied(_) => return Err(WinstateError::DuplicateObject(handle.into())),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(window));
                }
            }
        }

        tracing::debug!(window = %handle.id(), "window created");
        self.inner.channel.publish(WindowCreatedEvent::new(handle, true));
        Ok(handle)
    }

    /// Forget a window.
    ///
    /// Returns `false` if the window was not registered.
    pub fn notify_window_destroyed(&self, window: WindowRef) -> bool {
        let Some((_, entity)) = self.inner.windows.remove(&window.id()) else {
            tracing::debug!(window = %window.id(), "destroy notification for unknown window");
            return false;
        };

        entity.invalidate();
        tracing::debug!(window = %window.id(), "window destroyed");
        self.inner.channel.publish(WindowDestroyedEvent::new(window, true));
        true
    }

    /// Forget an application after destroying each of its windows.
    ///
    /// Returns `false` if the application was not registered.
    pub fn notify_application_terminated(&self, application: ApplicationRef) -> bool {
        let Some((_, entity)) = self.inner.applications.remove(&application.id()) else {
            tracing::debug!(app = %application.id(), "terminate notification for unknown application");
            return false;
        };

        // No window of this application can be registered from here on.
        for window in self.windows_of(application) {
            self.notify_window_destroyed(window.handle());
        }

        entity.invalidate();
        tracing::debug!(app = %application.id(), "application terminated");
        self.inner.channel.publish(ApplicationTerminatedEvent::new(application, true));
        true
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("applications", &self.inner.applications.len())
            .field("windows", &self.inner.windows.len())
            .finish_non_exhaustive()
    }
}
