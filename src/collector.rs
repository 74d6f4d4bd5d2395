//! Training-data collection - persist normalized canvases on demand

use crate::normalize::NormalizedCanvas;
use chrono::{DateTime, Utc};
use image::{ImageError, ImageFormat};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no canvas available this tick")]
    NoCanvasAvailable,
    #[error(transparent)]
    Persistence(#[from] PersistError),
}

/// Storage for collected canvases
pub trait PersistencePort {
    fn write(&mut self, canvas: &NormalizedCanvas, id: &str) -> Result<(), PersistError>;
}

/// Writes each canvas as `<folder>/<id>.jpg`
pub struct JpegFolderStore {
    folder: PathBuf,
}

impl JpegFolderStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.folder.join(format!("{}.jpg", id))
    }
}

impl PersistencePort for JpegFolderStore {
    fn write(&mut self, canvas: &NormalizedCanvas, id: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.folder).map_err(|source| PersistError::CreateDir {
            path: self.folder.clone(),
            source,
        })?;
        let path = self.path_for(id);
        canvas
            .image()
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|source| PersistError::Write { path, source })
    }
}

/// Saves canvases and counts successful saves
pub struct FrameCollector {
    store: Box<dyn PersistencePort>,
    counter: u64,
    /// Last timestamp used and how many ids it has produced
    last_stamp: Option<(String, u32)>,
}

impl FrameCollector {
    pub fn new(store: Box<dyn PersistencePort>) -> Self {
        Self {
            store,
            counter: 0,
            last_stamp: None,
        }
    }

    pub fn count(&self) -> u64 {
        self.counter
    }

    /// Persist `canvas` and return its identifier.
    ///
    /// The counter only moves when the store accepted the canvas.
    pub fn save(&mut self, canvas: Option<&NormalizedCanvas>) -> Result<String, CollectError> {
        self.save_at(canvas, Utc::now())
    }

    fn save_at(
        &mut self,
        canvas: Option<&NormalizedCanvas>,
        now: DateTime<Utc>,
    ) -> Result<String, CollectError> {
        let canvas = canvas.ok_or(CollectError::NoCanvasAvailable)?;
        let stamp = timestamp_id(now);
        let seq = match &self.last_stamp {
            Some((last, seq)) if *last == stamp => seq + 1,
            _ => 1,
        };
        // Saves within one microsecond get `_2`, `_3`, ...
        let id = if seq == 1 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, seq)
        };

        self.store.write(canvas, &id)?;
        self.counter += 1;
        self.last_stamp = Some((stamp, seq));
        Ok(id)
    }
}

/// `Image_<unix seconds>.<microseconds>`
pub fn timestamp_id(now: DateTime<Utc>) -> String {
    format!(
        "Image_{}.{:06}",
        now.timestamp(),
        now.timestamp_subsec_micros()
    )
}
