//! Frame acquisition

use image::{ImageError, RgbImage};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source exhausted")]
    Exhausted,
    #[error("no frames found in {0}")]
    Empty(PathBuf),
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read frame {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

/// Produces one frame per tick
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError>;
}

/// Replays still images from a directory in file-name order
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
}

impl ImageSequence {
    pub fn open(dir: &Path, looping: bool) -> Result<Self, SourceError> {
        let paths = list_images(dir)?;
        if paths.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        Ok(Self {
            paths,
            cursor: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<RgbImage, SourceError> {
        if self.cursor >= self.paths.len() {
            if !self.looping {
                return Err(SourceError::Exhausted);
            }
            self.cursor = 0;
        }
        let path = &self.paths[self.cursor];
        self.cursor += 1;
        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|source| SourceError::Read {
                path: path.clone(),
                source,
            })
    }
}

/// Image files directly inside `dir`, sorted by name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SourceError::List {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn frames_dir(name: &str, count: u8) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("signify-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(8, 6, image::Rgb([i * 10, 0, 0]));
            img.save(dir.join(format!("frame_{:02}.png", i))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();
        dir
    }

    #[test]
    fn test_sequence_plays_in_order_then_ends() {
        let dir = frames_dir("seq", 3);
        let mut seq = ImageSequence::open(&dir, false).unwrap();
        assert_eq!(seq.len(), 3);

        for i in 0..3u8 {
            let frame = seq.next_frame().unwrap();
            assert_eq!(frame.get_pixel(0, 0)[0], i * 10);
        }
        assert!(matches!(seq.next_frame(), Err(SourceError::Exhausted)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sequence_loops() {
        let dir = frames_dir("loop", 2);
        let mut seq = ImageSequence::open(&dir, true).unwrap();
        for _ in 0..5 {
            assert!(seq.next_frame().is_ok());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_dir() {
        let dir = frames_dir("empty", 0);
        assert!(matches!(
            ImageSequence::open(&dir, true),
            Err(SourceError::Empty(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
