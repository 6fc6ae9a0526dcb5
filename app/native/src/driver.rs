//! Asynchronous write worker.
//!
//! Backings that talk to a slow environment should not apply writes on the
//! caller's thread. A [`WriteWorker`] owns a bounded queue and a tokio task
//! that applies each [`WriteRequest`] in arrival order and answers it.
//!
//! ```ignore
//! let worker = WriteWorker::spawn(256, |value| platform_set_position(value))?;
//!
//! impl AttributeBacking<Point> for PositionBacking {
//!     fn request_write(&self, request: WriteRequest<Point>) {
//!         if let Err(err) = self.worker.submit(request) {
//!             tracing::warn!(error = %err, "position write dropped");
//!         }
//!     }
//! }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::BackingError;
use crate::property::WriteRequest;

/// Error types for write worker communication.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The queue is at capacity.
    #[error("Write queue is full")]
    QueueFull,

    /// The worker has stopped.
    #[error("Write worker has stopped: channel closed")]
    Closed,

    /// `spawn` was called outside a tokio runtime.
    #[error("No tokio runtime available to run the write worker")]
    NoRuntime,
}

/// Handle to a task applying write requests for one attribute type.
#[derive(Clone)]
pub struct WriteWorker<T> {
    sender: mpsc::Sender<WriteRequest<T>>,
}

impl<T: Clone + Send + 'static> WriteWorker<T> {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// `apply` performs the write and returns the value the environment
    /// settled on. It runs on the worker task; a panic inside it is caught
    /// and answered as [`BackingError::Invalid`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoRuntime`] when called outside a runtime.
    pub fn spawn<F>(buffer_size: usize, apply: F) -> Result<(Self, JoinHandle<()>), WorkerError>
    where
        F: Fn(T) -> Result<T, BackingError> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let (sender, mut receiver) = mpsc::channel::<WriteRequest<T>>(buffer_size.max(1));

        let task = runtime.spawn(async move {
            tracing::trace!("write worker starting");

            while let Some(request) = receiver.recv().await {
                let value = request.value().clone();
                match catch_unwind(AssertUnwindSafe(|| apply(value))) {
                    Ok(Ok(actual)) => request.acknowledge(actual),
                    Ok(Err(err)) => {
                        tracing::debug!(error = %err, "write rejected by backing");
                        request.reject_invalid();
                    }
                    Err(_) => {
                        tracing::error!("write worker: apply panicked; rejecting request");
                        request.reject_invalid();
                    }
                }
            }

            tracing::trace!("write worker stopped");
        });

        Ok((Self { sender }, task))
    }

    /// Queue `request` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::QueueFull`] or [`WorkerError::Closed`]. The
    /// request is dropped in both cases, which retires the write on its cell.
    pub fn submit(&self, request: WriteRequest<T>) -> Result<(), WorkerError> {
        self.sender.try_send(request).map_err(|err| {
            let err = match err {
                mpsc::error::TrySendError::Full(_) => WorkerError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => WorkerError::Closed,
            };
            tracing::warn!(error = %err, "dropping write request");
            err
        })
    }

    /// Queue `request`, waiting for room.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Closed`] if the worker has stopped.
    pub async fn submit_async(&self, request: WriteRequest<T>) -> Result<(), WorkerError> {
        self.sender.send(request).await.map_err(|_| WorkerError::Closed)
    }

    /// Whether the worker task is still receiving.
    #[must_use]
    pub fn is_running(&self) -> bool { !self.sender.is_closed() }

    /// Stop accepting requests. Requests already queued are still applied
    /// once every clone of this handle is dropped.
    pub fn shutdown(self) { drop(self); }
}

impl<T> std::fmt::Debug for WriteWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteWorker")
            .field("capacity", &self.sender.capacity())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::events::{
        Event, EventChannel, PropertyEvent, WindowMinimizedChangedEvent, WindowPosChangedEvent,
    };
    use crate::property::{AttributeBacking, WriteableProperty};
    use crate::state::{Point, Validity, WindowId, WindowRef};

    struct WorkerBacking {
        worker: WriteWorker<Point>,
        value: Arc<Mutex<Point>>,
    }

    impl AttributeBacking<Point> for WorkerBacking {
        fn read(&self) -> Result<Point, BackingError> { Ok(*self.value.lock()) }

        fn request_write(&self, request: WriteRequest<Point>) {
            if let Err(err) = self.worker.submit(request) {
                tracing::warn!(error = %err, "write dropped");
            }
        }
    }

    fn snap_to_grid(point: Point) -> Point {
        Point::new((point.x / 10.0).round() * 10.0, (point.y / 10.0).round() * 10.0)
    }

    #[tokio::test]
    async fn test_worker_acknowledges_in_order() {
        let value = Arc::new(Mutex::new(Point::default()));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let (store, log) = (Arc::clone(&value), Arc::clone(&applied));
        let (worker, task) = WriteWorker::spawn(16, move |point: Point| {
            let actual = snap_to_grid(point);
            *store.lock() = actual;
            log.lock().push(actual);
            Ok(actual)
        })
        .unwrap();

        let channel = EventChannel::new();
        let backing: Arc<dyn AttributeBacking<Point>> =
            Arc::new(WorkerBacking { worker: worker.clone(), value: Arc::clone(&value) });
        let position: WriteableProperty<WindowPosChangedEvent> = WriteableProperty::from_backing(
            WindowRef::from(WindowId(1)),
            channel.clone(),
            Validity::new(),
            &backing,
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        channel.subscribe(move |e: &WindowPosChangedEvent| sink.lock().push(e.clone()));

        position.write(Point::new(10.0, 10.0));
        position.write(Point::new(23.0, 41.0));

        drop(backing);
        worker.shutdown();
        task.await.unwrap();

        assert_eq!(*applied.lock(), vec![Point::new(10.0, 10.0), Point::new(20.0, 40.0)]);
        assert_eq!(position.read(), Point::new(20.0, 40.0));
        assert!(!position.has_pending_write());

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(events[2].external());
        assert_eq!(*events[2].old_value(), Point::new(23.0, 41.0));
    }

    fn worker_cell(
        worker: &WriteWorker<Point>,
        value: &Arc<Mutex<Point>>,
    ) -> (
        WriteableProperty<WindowPosChangedEvent>,
        Arc<Mutex<Vec<WindowPosChangedEvent>>>,
        Arc<dyn AttributeBacking<Point>>,
    ) {
        let channel = EventChannel::new();
        let backing: Arc<dyn AttributeBacking<Point>> =
            Arc::new(WorkerBacking { worker: worker.clone(), value: Arc::clone(value) });
        let position = WriteableProperty::from_backing(
            WindowRef::from(WindowId(2)),
            channel.clone(),
            Validity::new(),
            &backing,
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        channel.subscribe(move |e: &WindowPosChangedEvent| sink.lock().push(e.clone()));
        (position, events, backing)
    }

    #[tokio::test]
    async fn test_write_dropped_on_full_queue_hands_over_to_older_write() {
        let value = Arc::new(Mutex::new(Point::default()));
        let store = Arc::clone(&value);
        let (worker, task) = WriteWorker::spawn(1, move |point: Point| {
            let actual = snap_to_grid(point);
            *store.lock() = actual;
            Ok(actual)
        })
        .unwrap();
        let (position, events, backing) = worker_cell(&worker, &value);

        // The worker has not run yet: the first request fills the queue.
        position.write(Point::new(10.0, 10.0));
        position.write(Point::new(23.0, 41.0));
        assert_eq!(position.expected_value(), Some(Point::new(10.0, 10.0)));

        drop(backing);
        worker.shutdown();
        task.await.unwrap();

        assert!(!position.has_pending_write());
        assert_eq!(position.read(), *value.lock());
        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(!events[2].external());
        assert_eq!(*events[2].new_value(), Point::new(10.0, 10.0));
    }

    #[tokio::test]
    async fn test_write_to_stopped_worker_rereads_true_value() {
        let value = Arc::new(Mutex::new(Point::new(3.0, 3.0)));
        let (worker, task) = WriteWorker::spawn(4, |point: Point| Ok(point)).unwrap();
        task.abort();
        let _ = task.await;
        assert!(!worker.is_running());

        let (position, events, _backing) = worker_cell(&worker, &value);
        position.write(Point::new(5.0, 5.0));

        assert!(!position.has_pending_write());
        assert_eq!(position.read(), Point::new(3.0, 3.0));
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[1].external());
        assert_eq!(*events[1].old_value(), Point::new(5.0, 5.0));
    }

    struct Relay(Mutex<std::sync::mpsc::Sender<WriteRequest<bool>>>);

    impl AttributeBacking<bool> for Relay {
        fn read(&self) -> Result<bool, BackingError> { Ok(false) }

        fn request_write(&self, request: WriteRequest<bool>) {
            let _ = self.0.lock().send(request);
        }
    }

    type Relayed = (
        WriteableProperty<WindowMinimizedChangedEvent>,
        std::sync::mpsc::Receiver<WriteRequest<bool>>,
        Arc<dyn AttributeBacking<bool>>,
    );

    fn relayed_cell(id: u32) -> Relayed {
        let (tx, rx) = std::sync::mpsc::channel();
        let relay: Arc<dyn AttributeBacking<bool>> = Arc::new(Relay(Mutex::new(tx)));
        let cell = WriteableProperty::new(
            WindowRef::from(WindowId(id)),
            false,
            EventChannel::new(),
            Validity::new(),
            &relay,
        );
        (cell, rx, relay)
    }

    #[tokio::test]
    async fn test_apply_error_invalidates_object() {
        let (worker, task) = WriteWorker::spawn(4, |_: bool| Err(BackingError::Invalid)).unwrap();
        let (cell, requests, _relay) = relayed_cell(3);

        cell.write(true);
        worker.submit(requests.recv().unwrap()).unwrap();
        worker.shutdown();
        task.await.unwrap();

        assert!(!cell.is_valid());
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let (cell, requests, _relay) = relayed_cell(4);
        cell.write(true);
        cell.write(false);

        // The current-thread test runtime does not run the worker until we yield.
        let (worker, _task) = WriteWorker::spawn(1, |v: bool| Ok(v)).unwrap();
        worker.submit(requests.recv().unwrap()).unwrap();
        assert!(matches!(worker.submit(requests.recv().unwrap()), Err(WorkerError::QueueFull)));

        // The dropped write is retired; the first one still decides.
        assert_eq!(cell.expected_value(), Some(true));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = WriteWorker::spawn(4, |v: u8| Ok(v));
        assert!(matches!(result, Err(WorkerError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let (worker, task) = WriteWorker::spawn(4, |v: u8| Ok(v)).unwrap();
        let probe = worker.clone();
        assert!(probe.is_running());

        worker.shutdown();
        drop(probe);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
