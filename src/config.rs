use crate::state::AppMode;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "signify.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Padding in pixels added around the detected region before cropping
    #[serde(default = "default_margin")]
    pub margin: u32,
    /// Side of the square classifier canvas
    #[serde(default = "default_canvas_size")]
    pub canvas_size: u32,
    /// Width and height of the frame in the preview image
    #[serde(default = "default_display_frame_size")]
    pub display_frame_size: [u32; 2],
    /// Where collection mode writes canvases
    #[serde(default = "default_storage_folder")]
    pub storage_folder: PathBuf,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    /// Word list, one word per line
    #[serde(default = "default_dictionary")]
    pub dictionary: PathBuf,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Key name -> action overrides, e.g. `enter = "commit"`
    #[serde(default)]
    pub keys: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            margin: default_margin(),
            canvas_size: default_canvas_size(),
            display_frame_size: default_display_frame_size(),
            storage_folder: default_storage_folder(),
            max_suggestions: default_max_suggestions(),
            dictionary: default_dictionary(),
            capture: CaptureConfig::default(),
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
            speech: SpeechConfig::default(),
            preview: PreviewConfig::default(),
            keys: HashMap::new(),
        }
    }
}

fn default_margin() -> u32 {
    20
}
fn default_canvas_size() -> u32 {
    300
}
fn default_display_frame_size() -> [u32; 2] {
    [640, 480]
}
fn default_storage_folder() -> PathBuf {
    "Data/A".into()
}
fn default_max_suggestions() -> usize {
    crate::suggest::DEFAULT_MAX_SUGGESTIONS
}
fn default_dictionary() -> PathBuf {
    "words.txt".into()
}

// ============================================================================
// Capture Config
// ============================================================================

/// What the loop does when a frame cannot be acquired
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameErrorPolicy {
    /// Skip the tick and try again on the next one
    Retry,
    /// End the loop
    Stop,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    /// Directory of frames replayed as the video feed
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Start over when the last frame has been played
    #[serde(default = "default_loop_frames")]
    pub loop_frames: bool,
    /// Unset means the mode default: retry interactively, stop when collecting
    #[serde(default)]
    pub on_frame_error: Option<FrameErrorPolicy>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_dir: default_frames_dir(),
            tick_ms: default_tick_ms(),
            loop_frames: default_loop_frames(),
            on_frame_error: None,
        }
    }
}

impl CaptureConfig {
    pub fn frame_error_policy(&self, mode: AppMode) -> FrameErrorPolicy {
        self.on_frame_error.unwrap_or(match mode {
            AppMode::Interactive => FrameErrorPolicy::Retry,
            AppMode::Collect => FrameErrorPolicy::Stop,
        })
    }
}

fn default_frames_dir() -> PathBuf {
    "frames".into()
}
fn default_tick_ms() -> u64 {
    30
}
fn default_loop_frames() -> bool {
    true
}

// ============================================================================
// Detector Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DetectorConfig {
    /// Pixels darker than this luma are foreground
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Minimum foreground pixel count for a detection
    #[serde(default = "default_min_area")]
    pub min_area: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_area: default_min_area(),
        }
    }
}

fn default_threshold() -> u8 {
    200
}
fn default_min_area() -> u64 {
    400
}

// ============================================================================
// Classifier Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Nearest neighbour over collected canvases (default)
    #[default]
    Template,
    /// ONNX image model, requires the `onnx` feature
    Onnx,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: ClassifierBackend,
    /// Reference canvases laid out as `<dir>/<label>/*.jpg`
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_model")]
    pub model: PathBuf,
    /// Labels file; the built-in 27 labels are used when unset
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Model input side in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Predictions below this confidence leave the label unset
    #[serde(default)]
    pub min_confidence: f32,
    /// Classify on a worker thread instead of inside the tick
    #[serde(default)]
    pub background: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            templates_dir: default_templates_dir(),
            model: default_model(),
            labels: None,
            input_size: default_input_size(),
            min_confidence: 0.0,
            background: false,
        }
    }
}

fn default_templates_dir() -> PathBuf {
    "Data".into()
}
fn default_model() -> PathBuf {
    "Model/model.onnx".into()
}
fn default_input_size() -> u32 {
    224
}

// ============================================================================
// Speech Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: default_speech_program(),
            args: Vec::new(),
        }
    }
}

fn default_speech_program() -> String {
    if cfg!(target_os = "macos") {
        "say".into()
    } else {
        "espeak".into()
    }
}

// ============================================================================
// Preview Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewConfig {
    /// Write a frame + canvas composite here
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_every_ticks")]
    pub every_ticks: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            path: None,
            every_ticks: default_every_ticks(),
        }
    }
}

fn default_every_ticks() -> u32 {
    10
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.display_frame_size[0], self.display_frame_size[1])
    }
}
