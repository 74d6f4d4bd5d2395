//! Runtime state shared between the tick loop, the input thread and the
//! signal handler, plus the per-tick pipeline state

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::classifier::Prediction;
use crate::normalize::{BoundingBox, NormalizedCanvas};

/// Application modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Classify gestures and compose text
    Interactive,
    /// Save normalized canvases as training data
    Collect,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::Interactive => write!(f, "Interactive"),
            AppMode::Collect => write!(f, "Collect"),
        }
    }
}

/// Results of the most recent tick.
///
/// `canvas` is `None` whenever that tick found no usable region, which is
/// what gates saving in collection mode.
#[derive(Debug, Default)]
pub struct TickState {
    pub frame_index: u64,
    pub bbox: Option<BoundingBox>,
    pub canvas: Option<NormalizedCanvas>,
    pub prediction: Option<Prediction>,
}

impl TickState {
    pub fn reset(&mut self) {
        self.bbox = None;
        self.canvas = None;
        self.prediction = None;
    }
}

/// Flags read across threads; all fields are atomics
pub struct RuntimeState {
    /// Cleared to end the tick loop
    running: AtomicBool,
    /// Ticks completed
    pub ticks: AtomicU64,
}

impl RuntimeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            ticks: AtomicU64::new(0),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn record_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks.load(Ordering::SeqCst))
            .finish()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<RuntimeState>;
