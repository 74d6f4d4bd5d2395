//! Hand-region detection

use crate::normalize::BoundingBox;
use image::{Pixel, RgbImage};

/// Locates at most one hand region in a frame
pub trait HandDetector {
    fn detect(&mut self, frame: &RgbImage) -> Option<BoundingBox>;
}

/// Finds the extent of dark pixels against a bright backdrop.
///
/// Pixels with luma below `threshold` count as foreground. Frames with fewer
/// than `min_area` foreground pixels report no region.
#[derive(Debug, Clone, Copy)]
pub struct ContrastDetector {
    threshold: u8,
    min_area: u64,
}

impl ContrastDetector {
    pub fn new(threshold: u8, min_area: u64) -> Self {
        Self {
            threshold,
            min_area,
        }
    }
}

impl HandDetector for ContrastDetector {
    fn detect(&mut self, frame: &RgbImage) -> Option<BoundingBox> {
        let mut count = 0u64;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (x, y, pixel) in frame.enumerate_pixels() {
            if pixel.to_luma()[0] >= self.threshold {
                continue;
            }
            count += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        if count == 0 || count < self.min_area {
            return None;
        }

        Some(BoundingBox::new(
            min_x as i32,
            min_y as i32,
            max_x - min_x + 1,
            max_y - min_y + 1,
        ))
    }
}
