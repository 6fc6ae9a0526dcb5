//! In-memory attribute backing.
//!
//! Stands in for the window server in tests and in the replay tool. The true
//! value lives behind a mutex; writes are applied through an optional clamp
//! either immediately or when [`SimulatedAttribute::settle`] is called.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::error::BackingError;
use crate::property::{AttributeBacking, WriteRequest};

type Clamp<T> = Box<dyn Fn(T) -> T + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckMode {
    Immediate,
    Deferred,
}

struct SimState<T> {
    value: T,
    valid: bool,
    queued: VecDeque<WriteRequest<T>>,
    writes: usize,
}

/// A simulated attribute of one object.
pub struct SimulatedAttribute<T> {
    state: Mutex<SimState<T>>,
    clamp: Option<Clamp<T>>,
    mode: AckMode,
}

impl<T: Clone + Send + Sync + 'static> SimulatedAttribute<T> {
    /// Create an attribute that applies and acknowledges writes immediately.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(SimState {
                value,
                valid: true,
                queued: VecDeque::new(),
                writes: 0,
            }),
            clamp: None,
            mode: AckMode::Immediate,
        }
    }

    /// Pass every written value through `clamp` before it becomes true.
    #[must_use]
    pub fn with_clamp(mut self, clamp: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.clamp = Some(Box::new(clamp));
        self
    }

    /// Queue writes until [`settle`](Self::settle) is called.
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.mode = AckMode::Deferred;
        self
    }

    /// The value the environment currently holds.
    #[must_use]
    pub fn true_value(&self) -> T { self.state.lock().value.clone() }

    /// Change the value behind the cell's back.
    pub fn set_true_value(&self, value: T) { self.state.lock().value = value; }

    /// Make every further read and write fail as if the object vanished.
    pub fn invalidate(&self) { self.state.lock().valid = false; }

    /// Number of write requests received so far.
    #[must_use]
    pub fn write_count(&self) -> usize { self.state.lock().writes }

    /// Number of requests waiting for [`settle`](Self::settle).
    #[must_use]
    pub fn queued(&self) -> usize { self.state.lock().queued.len() }

    /// Apply queued writes in arrival order and acknowledge each.
    ///
    /// Requests issued by handlers while settling are left for the next call.
    /// Returns the number of requests answered.
    pub fn settle(&self) -> usize {
        let queued = std::mem::take(&mut self.state.lock().queued);
        let count = queued.len();
        for request in queued {
            self.answer(request);
        }
        count
    }

    fn clamped(&self, value: T) -> T {
        match &self.clamp {
            Some(clamp) => clamp(value),
            None => value,
        }
    }

    /// Apply one request and reply with the lock released.
    fn answer(&self, request: WriteRequest<T>) {
        let actual = {
            let mut state = self.state.lock();
            if !state.valid {
                None
            } else {
                state.value = self.clamped(request.value().clone());
                Some(state.value.clone())
            }
        };

        match actual {
            Some(actual) => request.acknowledge(actual),
            None => request.reject_invalid(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> AttributeBacking<T> for SimulatedAttribute<T> {
    fn read(&self) -> Result<T, BackingError> {
        let state = self.state.lock();
        if state.valid { Ok(state.value.clone()) } else { Err(BackingError::Invalid) }
    }

    fn request_write(&self, request: WriteRequest<T>) {
        {
            let mut state = self.state.lock();
            state.writes += 1;
            if self.mode == AckMode::Deferred && state.valid {
                state.queued.push_back(request);
                return;
            }
        }
        self.answer(request);
    }
}

impl<T: fmt::Debug> fmt::Debug for SimulatedAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedAttribute")
            .field("value", &state.value)
            .field("valid", &state.valid)
            .field("queued", &state.queued.len())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
