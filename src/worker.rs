//! Background classification behind a single-slot queue
//!
//! The slot holds at most one canvas. Submitting while the worker is busy
//! replaces the pending canvas, so the worker always classifies the newest
//! frame and never builds a backlog. Results are tagged with the tick that
//! produced them so the loop can discard ones that arrive too late.

use crate::classifier::{ClassifyError, GestureClassifier, Prediction};
use crate::normalize::NormalizedCanvas;
use crate::stats::{SharedStats, StatKind, Timer};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::debug;

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
    dropped: u64,
}

/// Holds the most recent value; older pending values are dropped
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning true if it replaced an unconsumed one
    pub fn put(&self, value: T) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let replaced = state.value.replace(value).is_some();
        if replaced {
            state.dropped += 1;
        }
        self.ready.notify_one();
        replaced
    }

    /// Wait for a value. Returns `None` once closed and drained.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        self.ready.notify_all();
    }

    /// Values replaced before anyone took them
    pub fn dropped(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped
    }
}

pub type TaggedResult = (u64, Result<Prediction, ClassifyError>);

/// Owns a classifier on its own thread
pub struct ClassifierWorker {
    slot: Arc<LatestSlot<(u64, NormalizedCanvas)>>,
    results: flume::Receiver<TaggedResult>,
    handle: Option<JoinHandle<()>>,
}

impl ClassifierWorker {
    pub fn spawn(mut classifier: Box<dyn GestureClassifier>, stats: Option<SharedStats>) -> Self {
        let slot = Arc::new(LatestSlot::<(u64, NormalizedCanvas)>::new());
        let (tx, results) = flume::unbounded();

        let worker_slot = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            while let Some((tick, canvas)) = worker_slot.take() {
                let pixels = (canvas.size() * canvas.size()) as usize;
                let timer = stats
                    .as_ref()
                    .map(|s| Timer::new(s, StatKind::Classify, pixels));
                let result = classifier.predict(&canvas);
                if let Some(t) = timer {
                    t.finish();
                }
                if tx.send((tick, result)).is_err() {
                    break;
                }
            }
            debug!("classifier worker stopped");
        });

        Self {
            slot,
            results,
            handle: Some(handle),
        }
    }

    /// Queue `canvas` from tick `tick`, replacing any pending one
    pub fn submit(&self, tick: u64, canvas: NormalizedCanvas) {
        if self.slot.put((tick, canvas)) {
            debug!(tick, "dropped stale canvas");
        }
    }

    /// Next finished result, if any
    pub fn try_recv(&self) -> Option<TaggedResult> {
        self.results.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.slot.dropped()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.slot.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClassifierWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
