//! Reticle overlay
//!
//! Burns a white crosshair into the frame buffer. The four arms span the
//! whole image with a small gap around the center so the nozzle tip stays
//! visible at the crossing point.

use super::FrameImage;

/// Half-size of the untouched region around the reticle center, in pixels.
pub const RETICLE_GAP: u32 = 5;

const RETICLE_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Draw the reticle centered on the image.
pub fn draw_centered(frame: &mut FrameImage) {
    let cx = (frame.width / 2) as i64;
    let cy = (frame.height / 2) as i64;
    draw(frame, cx, cy, RETICLE_GAP);
}

/// Draw the reticle at an arbitrary center, clamped into the frame.
pub fn draw(frame: &mut FrameImage, center_x: i64, center_y: i64, gap: u32) {
    if frame.width == 0 || frame.height == 0 {
        return;
    }
    let x = center_x.clamp(0, frame.width as i64 - 1) as u32;
    let y = center_y.clamp(0, frame.height as i64 - 1) as u32;

    // vertical arms
    for row in 0..y.saturating_sub(gap) {
        frame.put_pixel(x, row, RETICLE_COLOR);
    }
    for row in y.saturating_add(gap).min(frame.height)..frame.height {
        frame.put_pixel(x, row, RETICLE_COLOR);
    }

    // horizontal arms
    for col in 0..x.saturating_sub(gap) {
        frame.put_pixel(col, y, RETICLE_COLOR);
    }
    for col in x.saturating_add(gap).min(frame.width)..frame.width {
        frame.put_pixel(col, y, RETICLE_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn count_white(frame: &FrameImage) -> usize {
        (0..frame.height)
            .flat_map(|y| (0..frame.width).map(move |x| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y) == WHITE)
            .count()
    }

    #[test]
    fn test_arms_span_frame_with_center_gap() {
        let mut frame = FrameImage::new(40, 30);
        draw_centered(&mut frame);

        let (cx, cy) = (20, 15);
        // arm endpoints reach the frame edges
        assert_eq!(frame.pixel(cx, 0), WHITE);
        assert_eq!(frame.pixel(cx, 29), WHITE);
        assert_eq!(frame.pixel(0, cy), WHITE);
        assert_eq!(frame.pixel(39, cy), WHITE);
        // the gap around the center stays untouched
        assert_eq!(frame.pixel(cx, cy), [0, 0, 0, 0]);
        assert_eq!(frame.pixel(cx, cy - RETICLE_GAP), [0, 0, 0, 0]);
        assert_eq!(frame.pixel(cx + RETICLE_GAP - 1, cy), [0, 0, 0, 0]);
        // the first pixel past the gap is painted
        assert_eq!(frame.pixel(cx, cy + RETICLE_GAP), WHITE);
        assert_eq!(frame.pixel(cx, cy - RETICLE_GAP - 1), WHITE);
    }

    #[test]
    fn test_out_of_range_center_is_clamped() {
        let mut frame = FrameImage::new(16, 12);
        draw(&mut frame, -100, -100, 2);
        // clamped to (0, 0): only the right and bottom arms remain
        assert_eq!(frame.pixel(0, 11), WHITE);
        assert_eq!(frame.pixel(15, 0), WHITE);
        assert_eq!(frame.pixel(0, 1), [0, 0, 0, 0]);

        let mut frame = FrameImage::new(16, 12);
        draw(&mut frame, 1000, 1000, 2);
        assert_eq!(frame.pixel(15, 0), WHITE);
        assert_eq!(frame.pixel(0, 11), WHITE);
    }

    #[test]
    fn test_painted_pixel_count() {
        let mut frame = FrameImage::new(21, 21);
        draw(&mut frame, 10, 10, 5);
        // per axis: rows 0..5 before the gap plus rows 15..21 after it
        assert_eq!(count_white(&frame), 22);
    }

    #[test]
    fn test_gap_larger_than_frame_paints_nothing() {
        let mut frame = FrameImage::new(8, 8);
        draw(&mut frame, 4, 4, 20);
        assert_eq!(count_white(&frame), 0);
    }

    #[test]
    fn test_zero_sized_frame_is_ignored() {
        let mut frame = FrameImage::new(0, 0);
        draw(&mut frame, 5, 5, 2);
        assert!(frame.data.is_empty());
    }
}
