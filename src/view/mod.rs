//! View transforms
//!
//! CPU-side frame pipeline: digital zoom (center crop), 90-degree rotation,
//! axis swap, and per-axis mirroring over an RGBA pixel buffer. Everything
//! here is pure and deterministic; the GPU only ever sees the finished
//! buffer.

pub mod reticle;

/// Smallest accepted zoom divisor (full frame).
pub const MIN_ZOOM: u32 = 1;
/// Largest accepted zoom divisor.
pub const MAX_ZOOM: u32 = 8;

/// An RGBA8 image owned on the CPU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameImage {
    /// RGBA pixel data, row-major, 4 bytes per pixel
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameImage {
    /// Create a zero-filled (transparent black) image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width as usize) * (height as usize) * 4],
            width,
            height,
        }
    }

    /// Wrap an existing RGBA buffer.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self { data, width, height })
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * 4
    }

    /// Read one pixel. `x`/`y` must be in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Write one pixel. `x`/`y` must be in bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Centered crop to `(width / zoom, height / zoom)`.
    ///
    /// A zoom of 1 returns the frame unchanged. The crop never collapses
    /// below a single pixel.
    pub fn center_crop(&self, zoom: u32) -> FrameImage {
        let zoom = zoom.max(MIN_ZOOM);
        if zoom == 1 {
            return self.clone();
        }
        let crop_w = (self.width / zoom).max(1);
        let crop_h = (self.height / zoom).max(1);
        let x0 = (self.width - crop_w) / 2;
        let y0 = (self.height - crop_h) / 2;

        let mut out = FrameImage::new(crop_w, crop_h);
        let row_bytes = (crop_w as usize) * 4;
        for y in 0..crop_h {
            let src = self.offset(x0, y0 + y);
            let dst = out.offset(0, y);
            out.data[dst..dst + row_bytes].copy_from_slice(&self.data[src..src + row_bytes]);
        }
        out
    }

    /// Swap the two spatial axes: output pixel (x, y) is input pixel (y, x).
    pub fn transposed(&self) -> FrameImage {
        let mut out = FrameImage::new(self.height, self.width);
        for y in 0..self.height {
            for x in 0..self.width {
                let src = self.offset(x, y);
                let dst = out.offset(y, x);
                out.data[dst..dst + 4].copy_from_slice(&self.data[src..src + 4]);
            }
        }
        out
    }

    /// Reverse the horizontal axis in place.
    pub fn flip_h(&mut self) {
        let w = self.width as usize;
        for row in self.data.chunks_exact_mut(w * 4) {
            let mut left = 0usize;
            let mut right = w.saturating_sub(1);
            while left < right {
                for b in 0..4 {
                    row.swap(left * 4 + b, right * 4 + b);
                }
                left += 1;
                right -= 1;
            }
        }
    }

    /// Reverse the vertical axis in place.
    pub fn flip_v(&mut self) {
        let stride = (self.width as usize) * 4;
        if stride == 0 {
            return;
        }
        let mut top = 0usize;
        let mut bottom = (self.height as usize).saturating_sub(1);
        while top < bottom {
            let (upper, lower) = self.data.split_at_mut(bottom * stride);
            upper[top * stride..top * stride + stride].swap_with_slice(&mut lower[..stride]);
            top += 1;
            bottom -= 1;
        }
    }
}

/// Rotation in 90-degree steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Parse a degree count. Any multiple of 90 is accepted, negatives
    /// included, and normalized into a single turn.
    pub fn from_degrees(degrees: i32) -> Option<Rotation> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(match degrees.rem_euclid(360) {
            0 => Rotation::R0,
            90 => Rotation::R90,
            180 => Rotation::R180,
            _ => Rotation::R270,
        })
    }

    /// Normalized rotation in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Advance clockwise by one 90-degree step.
    pub fn step_cw(self) -> Rotation {
        match self {
            Rotation::R0 => Rotation::R90,
            Rotation::R90 => Rotation::R180,
            Rotation::R180 => Rotation::R270,
            Rotation::R270 => Rotation::R0,
        }
    }

    /// Whether this rotation exchanges the image axes.
    pub fn transposes(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Operator-adjustable display state, set from the CLI, keyboard, or the
/// egui widgets and read by [`apply`] on every displayed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewSettings {
    pub mirror_h: bool,
    pub mirror_v: bool,
    pub swap_axes: bool,
    pub rotation: Rotation,
    /// Digital zoom divisor, clamped to `MIN_ZOOM..=MAX_ZOOM`
    pub zoom: u32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            mirror_h: false,
            mirror_v: false,
            swap_axes: false,
            rotation: Rotation::R0,
            zoom: MIN_ZOOM,
        }
    }
}

impl ViewSettings {
    /// Set the zoom divisor, clamped to the allowed range.
    pub fn set_zoom(&mut self, zoom: u32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + 1);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom.saturating_sub(1));
    }

    /// Whether the effective orientation exchanges the image axes. A
    /// quarter-turn rotation and an axis swap each transpose once, so they
    /// cancel when combined.
    pub fn axes_swapped(&self) -> bool {
        self.rotation.transposes() != self.swap_axes
    }

    /// Axis labels as (horizontal, vertical) in machine coordinates.
    pub fn axis_labels(&self) -> (&'static str, &'static str) {
        if self.axes_swapped() {
            ("Y", "X")
        } else {
            ("X", "Y")
        }
    }
}

/// Run the full transform pipeline: crop, rotate, swap, mirror.
pub fn apply(settings: &ViewSettings, frame: &FrameImage) -> FrameImage {
    let mut out = frame.center_crop(settings.zoom);

    out = match settings.rotation {
        Rotation::R0 => out,
        Rotation::R90 => {
            let mut t = out.transposed();
            t.flip_h();
            t
        }
        Rotation::R180 => {
            out.flip_h();
            out.flip_v();
            out
        }
        Rotation::R270 => {
            let mut t = out.transposed();
            t.flip_v();
            t
        }
    };

    if settings.swap_axes {
        out = out.transposed();
    }
    if settings.mirror_h {
        out.flip_h();
    }
    if settings.mirror_v {
        out.flip_v();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame whose every pixel encodes its own coordinates, so any
    /// misplaced pixel is detectable.
    fn tagged_frame(width: u32, height: u32) -> FrameImage {
        let mut frame = FrameImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                frame.put_pixel(x, y, [x as u8, y as u8, 7, 255]);
            }
        }
        frame
    }

    #[test]
    fn test_mirror_h_twice_is_identity() {
        let original = tagged_frame(6, 4);
        let mut frame = original.clone();
        frame.flip_h();
        assert_ne!(frame, original);
        frame.flip_h();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_mirror_v_twice_is_identity() {
        let original = tagged_frame(6, 4);
        let mut frame = original.clone();
        frame.flip_v();
        assert_ne!(frame, original);
        frame.flip_v();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_transpose_twice_is_identity() {
        let original = tagged_frame(5, 3);
        let once = original.transposed();
        assert_eq!(once.width, 3);
        assert_eq!(once.height, 5);
        assert_eq!(once.pixel(2, 4), original.pixel(4, 2));
        assert_eq!(once.transposed(), original);
    }

    #[test]
    fn test_zoom_one_is_identity() {
        let original = tagged_frame(8, 6);
        assert_eq!(original.center_crop(1), original);
    }

    #[test]
    fn test_center_crop_selects_centered_region() {
        let frame = tagged_frame(8, 8);
        let cropped = frame.center_crop(2);
        assert_eq!((cropped.width, cropped.height), (4, 4));
        // top-left of the crop is (2, 2) in the source
        assert_eq!(cropped.pixel(0, 0), frame.pixel(2, 2));
        assert_eq!(cropped.pixel(3, 3), frame.pixel(5, 5));
    }

    #[test]
    fn test_center_crop_never_collapses() {
        let frame = tagged_frame(4, 4);
        let cropped = frame.center_crop(MAX_ZOOM);
        assert_eq!((cropped.width, cropped.height), (1, 1));
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let frame = tagged_frame(4, 3);
        let settings = ViewSettings {
            rotation: Rotation::R90,
            ..ViewSettings::default()
        };
        let rotated = apply(&settings, &frame);
        assert_eq!((rotated.width, rotated.height), (3, 4));
        // clockwise: output (x, y) is input (y, H-1-x)
        assert_eq!(rotated.pixel(0, 0), frame.pixel(0, 2));
        assert_eq!(rotated.pixel(2, 3), frame.pixel(3, 0));
    }

    #[test]
    fn test_four_quarter_turns_are_identity() {
        let original = tagged_frame(5, 4);
        let settings = ViewSettings {
            rotation: Rotation::R90,
            ..ViewSettings::default()
        };
        let mut frame = original.clone();
        for _ in 0..4 {
            frame = apply(&settings, &frame);
        }
        assert_eq!(frame, original);
    }

    #[test]
    fn test_rotation_from_degrees_normalizes() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::R0));
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::R270));
        assert_eq!(Rotation::from_degrees(360), Some(Rotation::R0));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::R270));
        assert_eq!(Rotation::from_degrees(-630), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(91), None);
    }

    #[test]
    fn test_rotation_step_wraps() {
        let mut rotation = Rotation::R0;
        for _ in 0..4 {
            rotation = rotation.step_cw();
        }
        assert_eq!(rotation, Rotation::R0);
    }

    #[test]
    fn test_axis_labels_follow_effective_orientation() {
        let mut settings = ViewSettings::default();
        assert_eq!(settings.axis_labels(), ("X", "Y"));

        settings.swap_axes = true;
        assert_eq!(settings.axis_labels(), ("Y", "X"));

        // a quarter turn on top of the swap cancels the transposition
        settings.rotation = Rotation::R90;
        assert_eq!(settings.axis_labels(), ("X", "Y"));

        settings.swap_axes = false;
        assert_eq!(settings.axis_labels(), ("Y", "X"));

        settings.rotation = Rotation::R180;
        assert_eq!(settings.axis_labels(), ("X", "Y"));
    }

    #[test]
    fn test_pipeline_output_dimensions() {
        let frame = tagged_frame(16, 8);
        let settings = ViewSettings {
            swap_axes: true,
            zoom: 2,
            ..ViewSettings::default()
        };
        let out = apply(&settings, &frame);
        assert_eq!((out.width, out.height), (4, 8));
    }

    #[test]
    fn test_zoom_clamps_to_range() {
        let mut settings = ViewSettings::default();
        settings.set_zoom(0);
        assert_eq!(settings.zoom, MIN_ZOOM);
        settings.set_zoom(99);
        assert_eq!(settings.zoom, MAX_ZOOM);
        settings.zoom_out();
        assert_eq!(settings.zoom, MAX_ZOOM - 1);
    }

    #[test]
    fn test_from_rgba_rejects_bad_length() {
        assert!(FrameImage::from_rgba(2, 2, vec![0u8; 16]).is_some());
        assert!(FrameImage::from_rgba(2, 2, vec![0u8; 15]).is_none());
    }
}
