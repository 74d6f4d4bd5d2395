//! Gesture classification on normalized canvases
//!
//! Two backends:
//! - **Template**: nearest neighbour over reference canvases stored as
//!   `<dir>/<label>/*.jpg`, the layout collection mode writes
//! - **Onnx** (feature `onnx`): an image model with one score per label

use crate::normalize::NormalizedCanvas;
use crate::source::{SourceError, list_images};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageError, RgbImage};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The 26 letters plus the one phrase gesture
pub const DEFAULT_LABELS: [&str; 27] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z", "I am",
];

/// Side of the grayscale thumbnail templates are compared on
const FEATURE_SIDE: u32 = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode template {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("no templates found in {0}")]
    NoTemplates(PathBuf),
    #[cfg(feature = "onnx")]
    #[error("model returned {got} scores for {expected} labels")]
    Shape { expected: usize, got: usize },
    #[cfg(feature = "onnx")]
    #[error("onnx runtime: {0}")]
    Onnx(#[from] ort::Error),
}

pub trait GestureClassifier: Send {
    fn predict(&mut self, canvas: &NormalizedCanvas) -> Result<Prediction, ClassifyError>;
    fn labels(&self) -> &[String];
}

/// Parse a labels file: `"<index> <label>"` or a bare label per line
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(' ') {
            Some((index, label)) if index.parse::<usize>().is_ok() => label.trim().to_string(),
            _ => line.to_string(),
        })
        .collect()
}

pub fn load_labels(path: &Path) -> Result<Vec<String>, ClassifyError> {
    std::fs::read_to_string(path)
        .map(|text| parse_labels(&text))
        .map_err(|source| ClassifyError::Io {
            path: path.to_path_buf(),
            source,
        })
}

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
}

// ============================================================================
// Template classifier
// ============================================================================

pub struct TemplateClassifier {
    labels: Vec<String>,
    templates: Vec<(usize, GrayImage)>,
}

impl TemplateClassifier {
    /// Load every `<dir>/<label>/<image>` as a reference for `<label>`
    pub fn load(dir: &Path) -> Result<Self, ClassifyError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ClassifyError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut label_dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        label_dirs.sort();

        let mut samples = Vec::new();
        for label_dir in label_dirs {
            let Some(label) = label_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for path in list_images(&label_dir)? {
                let image = image::open(&path)
                    .map_err(|source| ClassifyError::Image {
                        path: path.clone(),
                        source,
                    })?
                    .to_rgb8();
                samples.push((label.to_string(), image));
            }
        }

        if samples.is_empty() {
            return Err(ClassifyError::NoTemplates(dir.to_path_buf()));
        }
        Ok(Self::from_samples(samples))
    }

    pub fn from_samples(samples: Vec<(String, RgbImage)>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        let mut templates = Vec::with_capacity(samples.len());
        for (label, image) in samples {
            let index = match labels.iter().position(|l| *l == label) {
                Some(i) => i,
                None => {
                    labels.push(label);
                    labels.len() - 1
                }
            };
            templates.push((index, features(&image)));
        }
        Self { labels, templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

impl GestureClassifier for TemplateClassifier {
    fn predict(&mut self, canvas: &NormalizedCanvas) -> Result<Prediction, ClassifyError> {
        let probe = features(canvas.image());
        let best = self
            .templates
            .iter()
            .map(|(index, template)| (*index, mean_abs_diff(&probe, template)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((index, distance)) => Ok(Prediction {
                label: self.labels[index].clone(),
                confidence: 1.0 - distance / 255.0,
            }),
            None => Err(ClassifyError::NoTemplates(PathBuf::new())),
        }
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn features(image: &RgbImage) -> GrayImage {
    let thumb = imageops::resize(image, FEATURE_SIDE, FEATURE_SIDE, FilterType::Triangle);
    imageops::grayscale(&thumb)
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f32 {
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    total as f32 / a.as_raw().len().max(1) as f32
}

// ============================================================================
// ONNX classifier
// ============================================================================

#[cfg(feature = "onnx")]
pub struct OnnxClassifier {
    session: ort::session::Session,
    labels: Vec<String>,
    input_size: u32,
}

#[cfg(feature = "onnx")]
impl OnnxClassifier {
    pub fn new(model: &Path, labels: Vec<String>, input_size: u32) -> Result<Self, ClassifyError> {
        let session = ort::session::Session::builder()?.commit_from_file(model)?;
        Ok(Self {
            session,
            labels,
            input_size,
        })
    }

    /// NHWC tensor scaled to [-1, 1]
    fn input(&self, canvas: &NormalizedCanvas) -> ndarray::Array4<f32> {
        let side = self.input_size;
        let resized = imageops::resize(canvas.image(), side, side, FilterType::Triangle);
        let mut input = ndarray::Array4::<f32>::zeros((1, side as usize, side as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 127.5 - 1.0;
            }
        }
        input
    }
}

#[cfg(feature = "onnx")]
impl GestureClassifier for OnnxClassifier {
    fn predict(&mut self, canvas: &NormalizedCanvas) -> Result<Prediction, ClassifyError> {
        use ort::value::Value;

        let input = Value::from_array(self.input(canvas))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_, scores) = outputs[0].try_extract_tensor::<f32>()?;

        if scores.len() != self.labels.len() {
            return Err(ClassifyError::Shape {
                expected: self.labels.len(),
                got: scores.len(),
            });
        }
        let (index, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or(ClassifyError::Shape {
                expected: self.labels.len(),
                got: 0,
            })?;

        Ok(Prediction {
            label: self.labels[index].clone(),
            confidence,
        })
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{BoundingBox, FrameNormalizer};
    use image::Rgb;

    fn canvas_of(color: [u8; 3], w: u32, h: u32) -> NormalizedCanvas {
        let frame = RgbImage::from_pixel(200, 200, Rgb(color));
        FrameNormalizer::new(0, 100)
            .normalize(&frame, BoundingBox::new(50, 50, w, h))
            .unwrap()
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels("0 A\n1 B\n\n26 I am\n");
        assert_eq!(labels, vec!["A", "B", "I am"]);

        let bare = parse_labels("A\nI am\n");
        assert_eq!(bare, vec!["A", "I am"]);
    }

    #[test]
    fn test_default_labels() {
        let labels = default_labels();
        assert_eq!(labels.len(), 27);
        assert_eq!(labels[0], "A");
        assert_eq!(labels[26], "I am");
    }

    #[test]
    fn test_template_nearest_neighbour() {
        let tall = canvas_of([20, 20, 20], 40, 100).image().clone();
        let wide = canvas_of([20, 20, 20], 100, 40).image().clone();
        let mut classifier = TemplateClassifier::from_samples(vec![
            ("I".to_string(), tall),
            ("B".to_string(), wide),
        ]);
        assert_eq!(classifier.labels(), ["I", "B"]);

        let prediction = classifier.predict(&canvas_of([25, 25, 25], 42, 100)).unwrap();
        assert_eq!(prediction.label, "I");
        assert!(prediction.confidence > 0.9);

        let prediction = classifier.predict(&canvas_of([25, 25, 25], 100, 38)).unwrap();
        assert_eq!(prediction.label, "B");
    }

    #[test]
    fn test_identical_canvas_has_full_confidence() {
        let canvas = canvas_of([60, 30, 30], 70, 90);
        let mut classifier =
            TemplateClassifier::from_samples(vec![("A".to_string(), canvas.image().clone())]);
        let prediction = classifier.predict(&canvas).unwrap();
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_missing_template_dir() {
        let dir = std::env::temp_dir().join("signify-no-such-templates");
        assert!(matches!(
            TemplateClassifier::load(&dir),
            Err(ClassifyError::Io { .. })
        ));
    }
}
