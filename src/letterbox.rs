//! Aspect-preserving resize into a square canvas, and the inverse mapping of
//! points from the canvas back into source image coordinates.
use crate::{image::Image, pose::Point};

/// Gray used for the letterbox border.
pub const LETTERBOX_FILL: u8 = 114;

/// Per-call scale and leading padding applied by [`letterbox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxTransform {
    /// Source image coordinates to canvas coordinates.
    pub fn forward(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.pad_x,
            point.y * self.scale + self.pad_y,
        )
    }

    /// Canvas coordinates to source image coordinates.
    pub fn inverse(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.pad_x) / self.scale,
            (point.y - self.pad_y) / self.scale,
        )
    }
}

/// Pixel layout of a letterboxed canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxLayout {
    pub canvas: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub transform: LetterboxTransform,
}

/// Split `total` padding between the leading and trailing edge.
///
/// The 0.1 nudge keeps an odd total from rounding both halves the same way.
fn split_padding(total: u32) -> (u32, u32) {
    let half = total as f32 / 2.0;
    let leading = (half - 0.1).round().max(0.0) as u32;
    let trailing = (half + 0.1).round().max(0.0) as u32;
    (leading, trailing)
}

/// Canvas side for `target_size`, rounded down to a multiple of `stride`.
pub fn canvas_size(target_size: u32, stride: u32) -> u32 {
    let stride = stride.max(1);
    (target_size / stride * stride).max(stride)
}

impl LetterboxLayout {
    pub fn compute(width: u32, height: u32, target_size: u32, stride: u32) -> Self {
        let canvas = canvas_size(target_size, stride);
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let scale = (canvas as f32 / w).min(canvas as f32 / h);

        let resized_width = ((w * scale).round() as u32).clamp(1, canvas);
        let resized_height = ((h * scale).round() as u32).clamp(1, canvas);

        let (left, right) = split_padding(canvas - resized_width);
        let (top, bottom) = split_padding(canvas - resized_height);

        Self {
            canvas,
            resized_width,
            resized_height,
            left,
            right,
            top,
            bottom,
            transform: LetterboxTransform {
                scale,
                pad_x: left as f32,
                pad_y: top as f32,
            },
        }
    }
}

/// Resize `image` so its longer side spans the canvas and center it on a
/// square `canvas_size(target_size, stride)` canvas.
pub fn letterbox(image: &Image, target_size: u32, stride: u32) -> (Image, LetterboxTransform) {
    let layout = LetterboxLayout::compute(image.width(), image.height(), target_size, stride);
    let padded = image
        .resize(layout.resized_width, layout.resized_height)
        .pad_into(
            layout.canvas,
            layout.canvas,
            layout.left,
            layout.top,
            LETTERBOX_FILL,
        );
    (padded, layout.transform)
}

/// Map a canvas point back to the source image.
pub fn unletterbox(point: Point, transform: &LetterboxTransform) -> Point {
    transform.inverse(point)
}

/// Map a canvas point back through the letterbox and then out of a crop whose
/// top left corner sat at `crop_origin` in the full image.
pub fn unletterbox_crop(point: Point, transform: &LetterboxTransform, crop_origin: Point) -> Point {
    transform.inverse(point) + crop_origin
}
