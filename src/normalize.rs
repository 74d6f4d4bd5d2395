//! Frame normalization - crop a hand region and letterbox it onto a square canvas
//!
//! The classifier takes a fixed `S x S` input. A detected region is expanded
//! by a margin, cropped out of the frame, scaled so its dominant axis fills the
//! canvas, and centered along the other axis on a white background.
//!
//! The scale factor is always derived from the detector's bounding box, never
//! from the clamped crop, so regions touching the frame edge keep the same
//! geometry as regions fully inside it.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;

/// Fill color for the canvas area outside the placed content
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Axis-aligned region of interest in source-frame pixels.
///
/// `x` and `y` may be negative when a detector reports a region that starts
/// outside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// Non-negative rectangle, used for crop extents and canvas placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no valid crop for region {0:?}")]
    NoValidCrop(BoundingBox),
}

/// Square classifier input with exactly one content region placed inside it
#[derive(Debug, Clone)]
pub struct NormalizedCanvas {
    image: RgbImage,
    content: Rect,
}

impl NormalizedCanvas {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Where the scaled crop sits inside the canvas
    pub fn content(&self) -> Rect {
        self.content
    }

    pub fn size(&self) -> u32 {
        self.image.width()
    }
}

/// Crops and letterboxes regions of interest into `canvas_size` squares
#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
    margin: u32,
    canvas_size: u32,
}

impl FrameNormalizer {
    pub fn new(margin: u32, canvas_size: u32) -> Self {
        Self {
            margin,
            canvas_size: canvas_size.max(1),
        }
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    pub fn canvas_size(&self) -> u32 {
        self.canvas_size
    }

    /// Normalize `bbox` of `frame` into a canvas.
    ///
    /// Fails with `NoValidCrop` when the box is degenerate or the
    /// margin-expanded box does not overlap the frame.
    #[hotpath::measure]
    pub fn normalize(
        &self,
        frame: &RgbImage,
        bbox: BoundingBox,
    ) -> Result<NormalizedCanvas, NormalizeError> {
        if !bbox.is_valid() {
            return Err(NormalizeError::NoValidCrop(bbox));
        }
        let crop = crop_rect(frame.dimensions(), bbox, self.margin)
            .ok_or(NormalizeError::NoValidCrop(bbox))?;

        let cropped = imageops::crop_imm(frame, crop.x, crop.y, crop.width, crop.height).to_image();
        let content = letterbox(bbox, self.canvas_size);
        let resized = imageops::resize(
            &cropped,
            content.width,
            content.height,
            FilterType::Triangle,
        );

        let mut image = RgbImage::from_pixel(self.canvas_size, self.canvas_size, BACKGROUND);
        imageops::replace(&mut image, &resized, content.x as i64, content.y as i64);

        Ok(NormalizedCanvas { image, content })
    }
}

/// Expand `bbox` by `margin` on every side and clamp it to the frame.
///
/// Returns `None` when nothing of the expanded box lies inside the frame.
pub fn crop_rect(frame: (u32, u32), bbox: BoundingBox, margin: u32) -> Option<Rect> {
    let (frame_w, frame_h) = (frame.0 as i64, frame.1 as i64);
    let margin = margin as i64;

    let x1 = (bbox.x as i64 - margin).max(0);
    let y1 = (bbox.y as i64 - margin).max(0);
    let x2 = (bbox.x as i64 + bbox.w as i64 + margin).min(frame_w);
    let y2 = (bbox.y as i64 + bbox.h as i64 + margin).min(frame_h);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(Rect {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    })
}

/// Placement of the scaled content for `bbox` inside a `size` square canvas.
///
/// The dominant axis is scaled to `size`, the other axis is rounded up and
/// centered with a gap that is also rounded up. Floating-point error can
/// push the rounded-up dimension one pixel past `size` (a 73x73 box on a
/// 300 canvas gives 301), so it is clamped to the canvas.
pub fn letterbox(bbox: BoundingBox, size: u32) -> Rect {
    let s = size as f64;
    let (w, h) = (bbox.w as f64, bbox.h as f64);

    if h / w > 1.0 {
        let k = s / h;
        let w_cal = scaled_dimension(k * w, size);
        Rect {
            x: (size - w_cal).div_ceil(2),
            y: 0,
            width: w_cal,
            height: size,
        }
    } else {
        let k = s / w;
        let h_cal = scaled_dimension(k * h, size);
        Rect {
            x: 0,
            y: (size - h_cal).div_ceil(2),
            width: size,
            height: h_cal,
        }
    }
}

fn scaled_dimension(value: f64, size: u32) -> u32 {
    (value.ceil() as u32).clamp(1, size)
}
