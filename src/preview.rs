//! Preview board: the scaled-down frame next to the current canvas

use crate::normalize::NormalizedCanvas;
use image::imageops::{self, FilterType};
use image::{ImageResult, Rgb, RgbImage};
use std::path::Path;

const PADDING: u32 = 20;
const BOARD: Rgb<u8> = Rgb([255, 255, 255]);
const EMPTY_SLOT: Rgb<u8> = Rgb([230, 230, 230]);

/// Lay out `frame` resized to `display` and the canvas (or an empty slot) on
/// a white board
pub fn compose(
    frame: &RgbImage,
    canvas: Option<&NormalizedCanvas>,
    display: (u32, u32),
    canvas_size: u32,
) -> RgbImage {
    let (display_w, display_h) = display;
    let width = display_w + canvas_size + PADDING * 3;
    let height = display_h.max(canvas_size) + PADDING * 2;
    let mut board = RgbImage::from_pixel(width, height, BOARD);

    let shown = imageops::resize(frame, display_w, display_h, FilterType::Triangle);
    imageops::replace(&mut board, &shown, PADDING as i64, PADDING as i64);

    let slot_x = (display_w + PADDING * 2) as i64;
    match canvas {
        Some(canvas) => imageops::replace(&mut board, canvas.image(), slot_x, PADDING as i64),
        None => {
            let empty = RgbImage::from_pixel(canvas_size, canvas_size, EMPTY_SLOT);
            imageops::replace(&mut board, &empty, slot_x, PADDING as i64);
        }
    }
    board
}

pub fn write(board: &RgbImage, path: &Path) -> ImageResult<()> {
    board.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{BoundingBox, FrameNormalizer};

    #[test]
    fn test_board_layout() {
        let frame = RgbImage::from_pixel(1280, 720, Rgb([0, 0, 200]));
        let canvas = FrameNormalizer::new(20, 300)
            .normalize(&frame, BoundingBox::new(100, 100, 100, 200))
            .unwrap();

        let board = compose(&frame, Some(&canvas), (640, 480), 300);
        assert_eq!(board.dimensions(), (640 + 300 + 60, 480 + 40));
        assert_eq!(*board.get_pixel(5, 5), BOARD);
        assert!(board.get_pixel(100, 100)[2] > 190);
        // left gap of the canvas is background
        assert_eq!(*board.get_pixel(680 + 10, 20 + 150), crate::normalize::BACKGROUND);
    }

    #[test]
    fn test_board_without_canvas() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        let board = compose(&frame, None, (64, 48), 32);
        assert_eq!(*board.get_pixel(64 + 40 + 1, 21), EMPTY_SLOT);
    }
}
