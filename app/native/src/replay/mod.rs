//! Scenario replay.
//!
//! Drives a fresh [`State`] from a [`Script`], backing every attribute with a
//! [`SimulatedAttribute`], and records each event the state publishes. Used
//! by the `winstate replay` command and by the integration tests.

mod script;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

pub use script::{AttributeValue, ChangeStep, CreateWindowStep, LaunchStep, Script, Step, Target};

use crate::error::WinstateError;
use crate::events::{
    ApplicationFocusedWindowChangedEvent, ApplicationIsFrontmostChangedEvent,
    ApplicationIsHiddenChangedEvent, ApplicationLaunchedEvent, ApplicationMainWindowChangedEvent,
    ApplicationTerminatedEvent, Event, EventKind, PropertyEvent, WindowCreatedEvent,
    WindowDestroyedEvent, WindowFullscreenChangedEvent, WindowMinimizedChangedEvent,
    WindowPosChangedEvent, WindowSizeChangedEvent, WindowTitleChangedEvent,
};
use crate::sim::SimulatedAttribute;
use crate::state::{
    ApplicationBackings, ApplicationDescriptor, ApplicationId, ApplicationRef, ObjectRef, Point,
    Size, State, WindowBackings, WindowDescriptor, WindowId, WindowRef,
};

/// One published event, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub kind: EventKind,
    pub external: bool,
    pub object: ObjectRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<serde_json::Value>,
}

impl EventRecord {
    fn lifecycle<E: Event>(event: &E) -> Self {
        Self {
            kind: E::KIND,
            external: event.external(),
            object: event.subject(),
            old: None,
            new: None,
        }
    }

    fn property<E>(event: &E) -> Self
    where
        E: PropertyEvent,
        E::Value: Serialize,
    {
        Self {
            kind: E::KIND,
            external: event.external(),
            object: event.subject(),
            old: serde_json::to_value(event.old_value()).ok(),
            new: serde_json::to_value(event.new_value()).ok(),
        }
    }
}

struct WindowSims {
    application: ApplicationId,
    position: Arc<SimulatedAttribute<Point>>,
    size: Arc<SimulatedAttribute<Size>>,
    title: Arc<SimulatedAttribute<String>>,
    minimized: Arc<SimulatedAttribute<bool>>,
    fullscreen: Arc<SimulatedAttribute<bool>>,
}

impl WindowSims {
    fn settle(&self) -> usize {
        self.position.settle()
            + self.size.settle()
            + self.minimized.settle()
            + self.fullscreen.settle()
            + self.title.settle()
    }

    fn invalidate(&self) {
        self.position.invalidate();
        self.size.invalidate();
        self.title.invalidate();
        self.minimized.invalidate();
        self.fullscreen.invalidate();
    }
}

struct ApplicationSims {
    hidden: Arc<SimulatedAttribute<bool>>,
    frontmost: Arc<SimulatedAttribute<bool>>,
    main_window: Arc<SimulatedAttribute<Option<WindowRef>>>,
    focused_window: Arc<SimulatedAttribute<Option<WindowRef>>>,
}

impl ApplicationSims {
    fn settle(&self) -> usize {
        self.hidden.settle()
            + self.frontmost.settle()
            + self.main_window.settle()
            + self.focused_window.settle()
    }

    fn invalidate(&self) {
        self.hidden.invalidate();
        self.frontmost.invalidate();
        self.main_window.invalidate();
        self.focused_window.invalidate();
    }
}

/// Rounds of `settle` before giving up on handlers that keep writing.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Runs scripts against a simulated environment.
pub struct Replayer {
    state: State,
    windows: BTreeMap<WindowId, WindowSims>,
    applications: BTreeMap<ApplicationId, ApplicationSims>,
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl Default for Replayer {
    fn default() -> Self { Self::new() }
}

impl Replayer {
    /// Create a replayer with an empty state that records every event shape.
    #[must_use]
    pub fn new() -> Self {
        let state = State::new();
        let records = Arc::new(Mutex::new(Vec::new()));

        record_lifecycle::<WindowCreatedEvent>(&state, &records);
        record_lifecycle::<WindowDestroyedEvent>(&state, &records);
        record_property::<WindowPosChangedEvent>(&state, &records);
        record_property::<WindowSizeChangedEvent>(&state, &records);
        record_property::<WindowTitleChangedEvent>(&state, &records);
        record_property::<WindowMinimizedChangedEvent>(&state, &records);
        record_property::<WindowFullscreenChangedEvent>(&state, &records);
        record_lifecycle::<ApplicationLaunchedEvent>(&state, &records);
        record_lifecycle::<ApplicationTerminatedEvent>(&state, &records);
        record_property::<ApplicationIsHiddenChangedEvent>(&state, &records);
        record_property::<ApplicationIsFrontmostChangedEvent>(&state, &records);
        record_property::<ApplicationMainWindowChangedEvent>(&state, &records);
        record_property::<ApplicationFocusedWindowChangedEvent>(&state, &records);

        Self {
            state,
            windows: BTreeMap::new(),
            applications: BTreeMap::new(),
            records,
        }
    }

    /// The state being driven.
    #[must_use]
    pub const fn state(&self) -> &State { &self.state }

    /// Run every step of `script` and return the events published by it.
    ///
    /// # Errors
    ///
    /// Stops at the first step that fails and returns its error.
    pub fn run(&mut self, script: &Script) -> Result<Vec<EventRecord>, WinstateError> {
        tracing::debug!(name = ?script.name, steps = script.steps.len(), "replaying script");

        for (index, step) in script.steps.iter().enumerate() {
            if let Err(err) = self.apply(step) {
                tracing::warn!(step = index, error = %err, "replay step failed");
                return Err(err);
            }
        }

        Ok(self.take_records())
    }

    /// Events recorded since the last call.
    pub fn take_records(&self) -> Vec<EventRecord> { std::mem::take(&mut *self.records.lock()) }

    /// Apply a single step.
    ///
    /// # Errors
    ///
    /// Returns [`WinstateError::UnknownObject`] for targets that do not exist,
    /// [`WinstateError::InvalidStep`] for attributes the target does not have
    /// or that cannot be written, and any facade error.
    pub fn apply(&mut self, step: &Step) -> Result<(), WinstateError> {
        match step {
            Step::Launch(launch) => self.launch(launch),
            Step::CreateWindow(window) => self.create_window(window),
            Step::Write(change) => self.write(change),
            Step::External(change) => self.external(change),
            Step::Settle => {
                self.settle();
                Ok(())
            }
            Step::DestroyWindow { id } => {
                self.destroy_window(WindowId(*id));
                Ok(())
            }
            Step::Terminate { pid } => {
                self.terminate(ApplicationId(*pid));
                Ok(())
            }
        }
    }

    fn launch(&mut self, launch: &LaunchStep) -> Result<(), WinstateError> {
        let id = ApplicationId(launch.pid);
        let sims = ApplicationSims {
            hidden: Arc::new(SimulatedAttribute::new(launch.hidden)),
            frontmost: Arc::new(SimulatedAttribute::new(launch.frontmost)),
            main_window: Arc::new(SimulatedAttribute::new(None)),
            focused_window: Arc::new(SimulatedAttribute::new(None)),
        };
        let descriptor = ApplicationDescriptor {
            id,
            bundle_id: launch.bundle_id.clone(),
            backings: ApplicationBackings {
                is_hidden: sims.hidden.clone(),
                is_frontmost: sims.frontmost.clone(),
                main_window: sims.main_window.clone(),
                focused_window: sims.focused_window.clone(),
            },
        };

        self.state.notify_application_launched(descriptor)?;
        self.applications.insert(id, sims);
        Ok(())
    }

    fn create_window(&mut self, step: &CreateWindowStep) -> Result<(), WinstateError> {
        let id = WindowId(step.id);

        let mut size = SimulatedAttribute::new(step.size);
        if let Some(minimum) = step.min_size {
            size = size.with_clamp(move |requested: Size| requested.max(minimum));
        }

        let sims = WindowSims {
            application: ApplicationId(step.pid),
            position: Arc::new(acknowledging(SimulatedAttribute::new(step.position), step.deferred)),
            size: Arc::new(acknowledging(size, step.deferred)),
            title: Arc::new(SimulatedAttribute::new(step.title.clone())),
            minimized: Arc::new(acknowledging(SimulatedAttribute::new(step.minimized), step.deferred)),
            fullscreen: Arc::new(acknowledging(
                SimulatedAttribute::new(step.fullscreen),
                step.deferred,
            )),
        };
        let descriptor = WindowDescriptor {
            id,
            application: ApplicationId(step.pid),
            backings: WindowBackings {
                position: sims.position.clone(),
                size: sims.size.clone(),
                title: sims.title.clone(),
                is_minimized: sims.minimized.clone(),
                is_fullscreen: sims.fullscreen.clone(),
            },
        };

        self.state.notify_window_created(descriptor)?;
        self.windows.insert(id, sims);
        Ok(())
    }

    fn write(&self, change: &ChangeStep) -> Result<(), WinstateError> {
        match change.target {
            Target::Window(id) => {
                let handle = WindowRef::from(WindowId(id));
                let window = self
                    .state
                    .window(&handle)
                    .ok_or(WinstateError::UnknownObject(handle.into()))?;
                match &change.value {
                    AttributeValue::Position(point) => window.position().write(*point),
                    AttributeValue::Size(size) => window.size().write(*size),
                    AttributeValue::Minimized(value) => window.is_minimized().write(*value),
                    AttributeValue::Fullscreen(value) => window.is_fullscreen().write(*value),
                    other => return Err(not_writable(handle.into(), other)),
                }
            }
            Target::Application(pid) => {
                let handle = ApplicationRef::from(ApplicationId(pid));
                let app = self
                    .state
                    .application(&handle)
                    .ok_or(WinstateError::UnknownObject(handle.into()))?;
                match &change.value {
                    AttributeValue::Hidden(value) => app.is_hidden().write(*value),
                    AttributeValue::Frontmost(value) => app.is_frontmost().write(*value),
                    AttributeValue::MainWindow(window) => app.main_window().write(window_ref(*window)),
                    other => return Err(not_writable(handle.into(), other)),
                }
            }
        }
        Ok(())
    }

    fn external(&self, change: &ChangeStep) -> Result<(), WinstateError> {
        match change.target {
            Target::Window(id) => {
                let handle = WindowRef::from(WindowId(id));
                let (Some(window), Some(sims)) = (self.state.window(&handle), self.windows.get(&WindowId(id)))
                else {
                    return Err(WinstateError::UnknownObject(handle.into()));
                };
                match &change.value {
                    AttributeValue::Position(point) => {
                        sims.position.set_true_value(*point);
                        window.position().report_external_value(*point);
                    }
                    AttributeValue::Size(size) => {
                        sims.size.set_true_value(*size);
                        window.size().report_external_value(*size);
                    }
                    AttributeValue::Title(title) => {
                        sims.title.set_true_value(title.clone());
                        window.title().report_external_value(title.clone());
                    }
                    AttributeValue::Minimized(value) => {
                        sims.minimized.set_true_value(*value);
                        window.is_minimized().report_external_value(*value);
                    }
                    AttributeValue::Fullscreen(value) => {
                        sims.fullscreen.set_true_value(*value);
                        window.is_fullscreen().report_external_value(*value);
                    }
                    other => return Err(no_attribute(handle.into(), other)),
                }
            }
            Target::Application(pid) => {
                let handle = ApplicationRef::from(ApplicationId(pid));
                let (Some(app), Some(sims)) =
                    (self.state.application(&handle), self.applications.get(&ApplicationId(pid)))
                else {
                    return Err(WinstateError::UnknownObject(handle.into()));
                };
                match &change.value {
                    AttributeValue::Hidden(value) => {
                        sims.hidden.set_true_value(*value);
                        app.is_hidden().report_external_value(*value);
                    }
                    AttributeValue::Frontmost(value) => {
                        sims.frontmost.set_true_value(*value);
                        app.is_frontmost().report_external_value(*value);
                    }
                    AttributeValue::MainWindow(window) => {
                        sims.main_window.set_true_value(window_ref(*window));
                        app.main_window().report_external_value(window_ref(*window));
                    }
                    AttributeValue::FocusedWindow(window) => {
                        sims.focused_window.set_true_value(window_ref(*window));
                        app.focused_window().report_external_value(window_ref(*window));
                    }
                    other => return Err(no_attribute(handle.into(), other)),
                }
            }
        }
        Ok(())
    }

    fn settle(&self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let answered: usize = self.windows.values().map(WindowSims::settle).sum::<usize>()
                + self.applications.values().map(ApplicationSims::settle).sum::<usize>();
            if answered == 0 {
                return;
            }
        }
        tracing::warn!("writes still queued after {MAX_SETTLE_ROUNDS} settle rounds");
    }

    fn destroy_window(&mut self, id: WindowId) {
        if let Some(sims) = self.windows.remove(&id) {
            sims.invalidate();
        }
        self.state.notify_window_destroyed(WindowRef::from(id));
    }

    fn terminate(&mut self, pid: ApplicationId) {
        let owned: Vec<_> =
            self.windows.iter().filter(|(_, sims)| sims.application == pid).map(|(id, _)| *id).collect();
        for id in owned {
            if let Some(sims) = self.windows.remove(&id) {
                sims.invalidate();
            }
        }
        if let Some(sims) = self.applications.remove(&pid) {
            sims.invalidate();
        }
        self.state.notify_application_terminated(ApplicationRef::from(pid));
    }
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("state", &self.state)
            .field("recorded", &self.records.lock().len())
            .finish_non_exhaustive()
    }
}

fn record_lifecycle<E: Event>(state: &State, records: &Arc<Mutex<Vec<EventRecord>>>) {
    let sink = Arc::clone(records);
    state.on(move |event: &E| sink.lock().push(EventRecord::lifecycle(event)));
}

fn record_property<E>(state: &State, records: &Arc<Mutex<Vec<EventRecord>>>)
where
    E: PropertyEvent,
    E::Value: Serialize,
{
    let sink = Arc::clone(records);
    state.on(move |event: &E| sink.lock().push(EventRecord::property(event)));
}

fn acknowledging<T>(sim: SimulatedAttribute<T>, deferred: bool) -> SimulatedAttribute<T>
where
    T: Clone + Send + Sync + 'static,
{
    if deferred { sim.deferred() } else { sim }
}

fn window_ref(id: Option<u32>) -> Option<WindowRef> { id.map(|id| WindowRef::from(WindowId(id))) }

fn not_writable(object: ObjectRef, value: &AttributeValue) -> WinstateError {
    WinstateError::InvalidStep(format!("{} of {object} cannot be written", value.name()))
}

fn no_attribute(object: ObjectRef, value: &AttributeValue) -> WinstateError {
    WinstateError::InvalidStep(format!("{object} has no attribute {}", value.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(text: &str) -> Script { Script::from_reader(text.as_bytes()).unwrap() }

    fn summary(records: &[EventRecord]) -> Vec<(EventKind, bool)> {
        records.iter().map(|r| (r.kind, r.external)).collect()
    }

    #[test]
    fn test_position_scenario() {
        let script = script(
            r#"{ "steps": [
                { "launch": { "pid": 1 } },
                { "createWindow": { "id": 10, "pid": 1 } },
                { "write": { "target": { "window": 10 }, "value": { "position": { "x": 10, "y": 10 } } } },
                { "external": { "target": { "window": 10 }, "value": { "position": { "x": 50, "y": 50 } } } }
            ] }"#,
        );

        let records = Replayer::new().run(&script).unwrap();

        assert_eq!(summary(&records), vec![
            (EventKind::ApplicationLaunched, true),
            (EventKind::WindowCreated, true),
            (EventKind::WindowPosChanged, false),
            (EventKind::WindowPosChanged, true),
        ]);
        assert_eq!(records[2].old, Some(serde_json::json!({ "x": 0.0, "y": 0.0 })));
        assert_eq!(records[3].new, Some(serde_json::json!({ "x": 50.0, "y": 50.0 })));
    }

    #[test]
    fn test_deferred_clamp_reports_correction_on_settle() {
        let script = script(
            r#"{ "steps": [
                { "launch": { "pid": 1 } },
                { "createWindow": { "id": 2, "pid": 1, "deferred": true,
                    "size": { "width": 400, "height": 400 },
                    "minSize": { "width": 300, "height": 200 } } },
                { "write": { "target": { "window": 2 }, "value": { "size": { "width": 100, "height": 500 } } } },
                "settle"
            ] }"#,
        );
        let mut replayer = Replayer::new();

        let records = replayer.run(&script).unwrap();

        let sizes: Vec<_> =
            records.iter().filter(|r| r.kind == EventKind::WindowSizeChanged).collect();
        assert_eq!(sizes.len(), 2);
        assert!(!sizes[0].external);
        assert!(sizes[1].external);
        assert_eq!(sizes[1].new, Some(serde_json::json!({ "width": 300.0, "height": 500.0 })));
    }

    #[test]
    fn test_write_to_read_only_attribute_fails() {
        let script = script(
            r#"{ "steps": [
                { "launch": { "pid": 1 } },
                { "createWindow": { "id": 2, "pid": 1 } },
                { "write": { "target": { "window": 2 }, "value": { "title": "renamed" } } }
            ] }"#,
        );

        let err = Replayer::new().run(&script).unwrap_err();
        assert!(matches!(err, WinstateError::InvalidStep(message) if message.contains("title")));
    }

    #[test]
    fn test_write_to_unknown_window_fails() {
        let script = script(
            r#"{ "steps": [
                { "write": { "target": { "window": 9 }, "value": { "minimized": true } } }
            ] }"#,
        );

        let err = Replayer::new().run(&script).unwrap_err();
        assert!(matches!(err, WinstateError::UnknownObject(ObjectRef::Window(_))));
    }

    #[test]
    fn test_terminate_records_window_destruction_first() {
        let script = script(
            r#"{ "steps": [
                { "launch": { "pid": 1 } },
                { "createWindow": { "id": 2, "pid": 1 } },
                { "createWindow": { "id": 3, "pid": 1 } },
                { "terminate": { "pid": 1 } }
            ] }"#,
        );
        let mut replayer = Replayer::new();

        let records = replayer.run(&script).unwrap();

        let tail: Vec<_> = records[3..].iter().map(|r| (r.kind, r.object)).collect();
        assert_eq!(tail, vec![
            (EventKind::WindowDestroyed, ObjectRef::from(WindowRef::from(WindowId(2)))),
            (EventKind::WindowDestroyed, ObjectRef::from(WindowRef::from(WindowId(3)))),
            (
                EventKind::ApplicationTerminated,
                ObjectRef::from(ApplicationRef::from(ApplicationId(1)))
            ),
        ]);
        assert!(replayer.state().visible_objects().is_empty());
    }

    #[test]
    fn test_record_serializes_without_empty_values() {
        let record = EventRecord {
            kind: EventKind::WindowCreated,
            external: true,
            object: ObjectRef::from(WindowRef::from(WindowId(4))),
            old: None,
            new: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "window-created", "external": true, "object": { "window": 4 } })
        );
    }
}
