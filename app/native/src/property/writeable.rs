//! Writable property: client writes arbitrated against the environment.

use std::fmt;
use std::sync::Arc;

use eyeball::Subscriber;

use super::Property;
use super::backing::AttributeBacking;
use super::cell::CellCore;
use crate::error::BackingError;
use crate::events::{EventChannel, PropertyEvent};
use crate::state::Validity;

/// A value that can be written by clients and changed by the environment.
///
/// A write is applied optimistically: the internal event is published and
/// `read()` returns the new value before the backing has seen the request.
/// The backing's acknowledgment later confirms the write silently or, when
/// the environment settled on something else, publishes an external event.
pub struct WriteableProperty<E: PropertyEvent> {
    core: Arc<CellCore<E>>,
}

impl<E: PropertyEvent> Clone for WriteableProperty<E> {
    fn clone(&self) -> Self { Self { core: Arc::clone(&self.core) } }
}

impl<E: PropertyEvent> WriteableProperty<E> {
    /// Create a cell for `object` holding `initial`.
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

    /// Last reconciled value, including optimistic writes.
    #[must_use]
    pub fn read(&self) -> E::Value { self.core.read() }

    /// Request `value`; never blocks on the backing.
    pub fn write(&self, value: E::Value) { self.core.write(value); }

    /// Reconcile the backing's answer to an earlier `write(requested)`.
    pub fn acknowledge_write(&self, requested: E::Value, actual: E::Value) {
        self.core.apply_acknowledgment(requested, actual);
    }

    /// Reconcile a value the backing observed in the environment.
    pub fn report_external_value(&self, value: E::Value) { self.core.report_external(value); }

    /// Re-read the true value from the backing and reconcile it.
    ///
    /// Deferred while a write is in flight.
    ///
    /// # Errors
    ///
    /// See [`Property::refresh`].
    pub fn refresh(&self) -> Result<(), BackingError> { self.core.refresh() }

    /// Whether an authoritative write is awaiting acknowledgment.
    #[must_use]
    pub fn has_pending_write(&self) -> bool { self.core.has_pending_write() }

    /// The value of the authoritative in-flight write, if any.
    #[must_use]
    pub fn expected_value(&self) -> Option<E::Value> { self.core.expected_value() }

    /// Handle of the owning object.
    #[must_use]
    pub fn object(&self) -> &E::Object { self.core.object() }

    /// Whether the owning object is still valid.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.core.is_valid() }

    /// Subscribe to the stream of stored values.
    #[must_use]
    pub fn watch(&self) -> Subscriber<E::Value> { self.core.watch() }

    /// A read-only view of the same cell.
    #[must_use]
    pub fn as_read_only(&self) -> Property<E> { Property { core: Arc::clone(&self.core) } }

    pub(crate) fn invalidate(&self) { self.core.invalidate(); }
}

impl<E: PropertyEvent> fmt::Debug for WriteableProperty<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteableProperty")
            .field("kind", &E::KIND)
            .field("object", self.object())
            .field("value", &self.read())
            .field("expected", &self.expected_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use parking_lot::Mutex;

    use super::*;
    use crate::events::{Event, WindowPosChangedEvent, WindowSizeChangedEvent};
    use crate::property::WriteRequest;
    use crate::sim::SimulatedAttribute;
    use crate::state::{Point, Size, WindowId, WindowRef};

    /// Backing that records requests and lets the test answer them.
    #[derive(Default)]
    struct ManualBacking {
        requests: Mutex<Vec<WriteRequest<Point>>>,
    }

    impl AttributeBacking<Point> for ManualBacking {
        fn read(&self) -> Result<Point, BackingError> { Ok(Point::new(0.0, 0.0)) }

        fn request_write(&self, request: WriteRequest<Point>) { self.requests.lock().push(request); }
    }

    impl ManualBacking {
        fn take(&self) -> Vec<WriteRequest<Point>> { std::mem::take(&mut *self.requests.lock()) }
    }

    struct Fixture {
        backing: Arc<ManualBacking>,
        events: Arc<Mutex<Vec<WindowPosChangedEvent>>>,
        position: WriteableProperty<WindowPosChangedEvent>,
    }

    fn p(x: f64, y: f64) -> Point { Point::new(x, y) }

    fn window() -> WindowRef { WindowRef::from(WindowId(1)) }

    fn fixture() -> Fixture {
        let channel = EventChannel::new();
        let backing = Arc::new(ManualBacking::default());
        let erased: Arc<dyn AttributeBacking<Point>> = backing.clone();
        let position =
            WriteableProperty::from_backing(window(), channel.clone(), Validity::new(), &erased)
                .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        channel.subscribe(move |e: &WindowPosChangedEvent| sink.lock().push(e.clone()));

        Fixture { backing, events, position }
    }

    fn summary(events: &[WindowPosChangedEvent]) -> Vec<(bool, Point, Point)> {
        events.iter().map(|e| (e.external(), *e.old_value(), *e.new_value())).collect()
    }

    #[test]
    fn test_write_publishes_internal_event_synchronously() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));

        assert_eq!(summary(&fx.events.lock()), vec![(false, p(0.0, 0.0), p(10.0, 10.0))]);
        assert_eq!(fx.position.read(), p(10.0, 10.0));
        assert_eq!(fx.position.expected_value(), Some(p(10.0, 10.0)));

        let requests = fx.backing.take();
        assert_eq!(requests.len(), 1);
        assert_eq!(*requests[0].value(), p(10.0, 10.0));
    }

    #[test]
    fn test_write_of_current_value_is_noop() {
        let fx = fixture();
        fx.position.write(p(0.0, 0.0));

        assert!(fx.events.lock().is_empty());
        assert!(fx.backing.take().is_empty());
        assert!(!fx.position.has_pending_write());
    }

    #[test]
    fn test_matching_acknowledgment_is_silent() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));
        for request in fx.backing.take() {
            request.confirm();
        }

        assert_eq!(fx.events.lock().len(), 1);
        assert!(!fx.position.has_pending_write());
        assert_eq!(fx.position.read(), p(10.0, 10.0));
    }

    #[test]
    fn test_clamped_acknowledgment_publishes_external_event() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));
        for request in fx.backing.take() {
            request.acknowledge(p(10.0, 25.0));
        }

        assert_eq!(summary(&fx.events.lock()), vec![
            (false, p(0.0, 0.0), p(10.0, 10.0)),
            (true, p(10.0, 10.0), p(10.0, 25.0)),
        ]);
        assert_eq!(fx.position.read(), p(10.0, 25.0));
        assert!(!fx.position.has_pending_write());
    }

    #[test]
    fn test_superseded_acknowledgment_is_folded() {
        let fx = fixture();
        fx.position.write(p(1.0, 1.0));
        fx.position.write(p(2.0, 2.0));
        assert_eq!(fx.position.expected_value(), Some(p(2.0, 2.0)));

        fx.position.acknowledge_write(p(1.0, 1.0), p(1.0, 1.0));
        assert_eq!(fx.events.lock().len(), 2);
        assert!(fx.position.has_pending_write());
        assert_eq!(fx.position.read(), p(2.0, 2.0));

        fx.position.acknowledge_write(p(2.0, 2.0), p(2.0, 2.0));
        assert_eq!(fx.events.lock().len(), 2);
        assert!(!fx.position.has_pending_write());
    }

    #[test]
    fn test_out_of_order_acknowledgments() {
        let fx = fixture();
        fx.position.write(p(1.0, 1.0));
        fx.position.write(p(2.0, 2.0));

        fx.position.acknowledge_write(p(2.0, 2.0), p(2.0, 2.0));
        fx.position.acknowledge_write(p(1.0, 1.0), p(1.0, 1.0));

        assert_eq!(fx.events.lock().len(), 2);
        assert_eq!(fx.position.read(), p(2.0, 2.0));
    }

    #[test]
    fn test_external_report_confirming_write_is_suppressed() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));

        fx.position.report_external_value(p(10.0, 10.0));
        assert_eq!(fx.events.lock().len(), 1);

        // The acknowledgment that follows is also silent.
        fx.position.acknowledge_write(p(10.0, 10.0), p(10.0, 10.0));
        assert_eq!(fx.events.lock().len(), 1);
    }

    #[test]
    fn test_external_change_racing_a_write_is_published() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));

        // The user drags the window before the write lands.
        fx.position.report_external_value(p(3.0, 3.0));
        // Our write lands afterwards; it is ours, so it is not external.
        fx.position.report_external_value(p(10.0, 10.0));

        assert_eq!(summary(&fx.events.lock()), vec![
            (false, p(0.0, 0.0), p(10.0, 10.0)),
            (true, p(10.0, 10.0), p(3.0, 3.0)),
            (false, p(3.0, 3.0), p(10.0, 10.0)),
        ]);
    }

    #[test]
    fn test_rewriting_current_value_overrides_in_flight_write() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));
        fx.position.report_external_value(p(0.0, 0.0));
        fx.position.write(p(0.0, 0.0));

        assert_eq!(fx.events.lock().len(), 2);
        assert_eq!(fx.position.expected_value(), Some(p(0.0, 0.0)));

        for request in fx.backing.take() {
            request.confirm();
        }
        assert_eq!(fx.events.lock().len(), 2);
        assert_eq!(fx.position.read(), p(0.0, 0.0));
    }

    #[test]
    fn test_acknowledgment_without_pending_write_is_external() {
        let fx = fixture();
        fx.position.acknowledge_write(p(4.0, 4.0), p(5.0, 5.0));

        assert_eq!(summary(&fx.events.lock()), vec![(true, p(0.0, 0.0), p(5.0, 5.0))]);
    }

    #[test]
    fn test_rejected_write_invalidates_object() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));
        for request in fx.backing.take() {
            request.reject_invalid();
        }

        assert!(!fx.position.is_valid());
        assert!(!fx.position.has_pending_write());

        fx.position.write(p(20.0, 20.0));
        fx.position.report_external_value(p(30.0, 30.0));
        assert_eq!(fx.events.lock().len(), 1);
        assert!(fx.backing.take().is_empty());
    }

    #[test]
    fn test_acknowledgment_after_cell_dropped_is_ignored() {
        let fx = fixture();
        fx.position.write(p(10.0, 10.0));
        let requests = fx.backing.take();
        drop(fx);

        for request in requests {
            request.confirm();
        }
    }

    #[test]
    fn test_handler_write_supersedes_outer_write() {
        let channel = EventChannel::new();
        let backing = Arc::new(ManualBacking::default());
        let erased: Arc<dyn AttributeBacking<Point>> = backing.clone();
        let position: WriteableProperty<WindowPosChangedEvent> =
            WriteableProperty::new(window(), p(0.0, 0.0), channel.clone(), Validity::new(), &erased);

        // Snap every move to the origin column.
        let snapper = position.clone();
        channel.subscribe(move |e: &WindowPosChangedEvent| {
            if e.new_value().x != 0.0 {
                snapper.write(p(0.0, e.new_value().y));
            }
        });

        position.write(p(7.0, 7.0));

        let requests = backing.take();
        assert_eq!(requests.len(), 1);
        assert_eq!(*requests[0].value(), p(0.0, 7.0));
        assert_eq!(position.read(), p(0.0, 7.0));
        assert_eq!(position.expected_value(), Some(p(0.0, 7.0)));
    }

    #[test]
    fn test_end_to_end_position_scenario() {
        let channel = EventChannel::new();
        let sim = Arc::new(SimulatedAttribute::new(p(0.0, 0.0)).deferred());
        let erased: Arc<dyn AttributeBacking<Point>> = sim.clone();
        let position: WriteableProperty<WindowPosChangedEvent> =
            WriteableProperty::from_backing(window(), channel.clone(), Validity::new(), &erased)
                .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        channel.subscribe(move |e: &WindowPosChangedEvent| sink.lock().push(e.clone()));

        position.write(p(10.0, 10.0));
        assert_eq!(position.read(), p(10.0, 10.0));

        sim.settle();
        position.report_external_value(sim.true_value());
        assert_eq!(events.lock().len(), 1);

        sim.set_true_value(p(50.0, 50.0));
        position.report_external_value(p(50.0, 50.0));

        assert_eq!(summary(&events.lock()), vec![
            (false, p(0.0, 0.0), p(10.0, 10.0)),
            (true, p(10.0, 10.0), p(50.0, 50.0)),
        ]);
        assert_eq!(position.read(), p(50.0, 50.0));
    }

    #[test]
    fn test_concurrent_writes_keep_per_cell_order() {
        let channel = EventChannel::new();
        let sim = Arc::new(SimulatedAttribute::new(Size::new(1.0, 1.0)));
        let erased: Arc<dyn AttributeBacking<Size>> = sim.clone();
        let size: WriteableProperty<WindowSizeChangedEvent> =
            WriteableProperty::from_backing(window(), channel.clone(), Validity::new(), &erased)
                .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        channel.subscribe(move |e: &WindowSizeChangedEvent| sink.lock().push(e.clone()));

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let size = size.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        size.write(Size::new(f64::from(t * 1000 + i + 2), 1.0));
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let events = events.lock();
        assert_eq!(events.len(), 100);
        for pair in events.windows(2) {
            assert_eq!(pair[0].new_value(), pair[1].old_value());
        }
        assert_eq!(*events.last().unwrap().new_value(), size.read());
        assert_eq!(size.read(), sim.true_value());
        assert!(!size.has_pending_write());
    }

    #[test]
    fn test_handlers_writing_each_others_cells_from_two_threads() {
        let channel = EventChannel::new();
        let pos_sim: Arc<dyn AttributeBacking<Point>> =
            Arc::new(SimulatedAttribute::new(p(0.0, 0.0)));
        let size_sim: Arc<dyn AttributeBacking<Size>> =
            Arc::new(SimulatedAttribute::new(Size::new(1.0, 1.0)));
        let position: WriteableProperty<WindowPosChangedEvent> =
            WriteableProperty::from_backing(window(), channel.clone(), Validity::new(), &pos_sim)
                .unwrap();
        let size: WriteableProperty<WindowSizeChangedEvent> = WriteableProperty::from_backing(
            WindowRef::from(WindowId(2)),
            channel.clone(),
            Validity::new(),
            &size_sim,
        )
        .unwrap();

        // Each handler mirrors external changes of one cell into the other.
        let moves = Arc::new(Mutex::new(0_usize));
        let resizes = Arc::new(Mutex::new(0_usize));
        {
            let (size, moves) = (size.clone(), Arc::clone(&moves));
            channel.subscribe(move |e: &WindowPosChangedEvent| {
                if e.external() {
                    *moves.lock() += 1;
                    size.write(Size::new(e.new_value().x + 1.0, 1.0));
                }
            });
        }
        {
            let (position, resizes) = (position.clone(), Arc::clone(&resizes));
            channel.subscribe(move |e: &WindowSizeChangedEvent| {
                if e.external() {
                    *resizes.lock() += 1;
                    position.write(p(-e.new_value().width, -1.0));
                }
            });
        }

        let (done, finished) = std::sync::mpsc::channel();
        let reporters = [
            {
                let (position, done) = (position.clone(), done.clone());
                thread::spawn(move || {
                    for i in 1..=200 {
                        position.report_external_value(p(f64::from(i), 0.0));
                    }
                    let _ = done.send(());
                })
            },
            {
                let size = size.clone();
                thread::spawn(move || {
                    for i in 1..=200 {
                        size.report_external_value(Size::new(f64::from(5000 + i), 1.0));
                    }
                    let _ = done.send(());
                })
            },
        ];

        for _ in 0..reporters.len() {
            finished
                .recv_timeout(std::time::Duration::from_secs(10))
                .expect("reporter threads deadlocked");
        }
        for handle in reporters {
            handle.join().unwrap();
        }

        assert_eq!(*moves.lock(), 200);
        assert_eq!(*resizes.lock(), 200);
    }

    #[test]
    fn test_read_only_view_shares_cell() {
        let fx = fixture();
        let view = fx.position.as_read_only();
        fx.position.write(p(3.0, 4.0));
        assert_eq!(view.read(), p(3.0, 4.0));
    }

    #[tokio::test]
    async fn test_watch_follows_write_and_correction() {
        let fx = fixture();
        let mut watcher = fx.position.watch();

        fx.position.write(p(1.0, 1.0));
        assert_eq!(watcher.next().await, Some(p(1.0, 1.0)));

        let request = fx.backing.take().pop().unwrap();
        request.acknowledge(p(2.0, 1.0));
        assert_eq!(watcher.next().await, Some(p(2.0, 1.0)));
    }
}
