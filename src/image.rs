use crate::{error::Error, geometry::PixelRegion};
use ::image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use std::path::Path;

/// Immutable 8-bit RGB image.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: RgbImage,
}

impl Image {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Wrap a tightly packed, row-major RGB buffer.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, Error> {
        let len = data.len();
        RgbImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or(Error::ImageBufferSize { width, height, len })
    }

    pub fn filled(width: u32, height: u32, value: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(value)))
    }

    pub fn open<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let pixels = ::image::open(path)
            .map_err(|e| Error::OpenImage(e, path.to_path_buf()))?
            .into_rgb8();
        Ok(Self::new(pixels))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn crop(&self, region: &PixelRegion) -> Self {
        Self::new(
            imageops::crop_imm(
                &self.pixels,
                region.x,
                region.y,
                region.width,
                region.height,
            )
            .to_image(),
        )
    }

    /// Bilinear resize to exactly `width` x `height`.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        Self::new(imageops::resize(
            &self.pixels,
            width,
            height,
            imageops::FilterType::Triangle,
        ))
    }

    /// Place this image on a `width` x `height` canvas of `fill` with its top
    /// left corner at `(left, top)`.
    pub fn pad_into(&self, width: u32, height: u32, left: u32, top: u32, fill: u8) -> Self {
        let mut canvas = RgbImage::from_pixel(width, height, Rgb([fill; 3]));
        imageops::replace(&mut canvas, &self.pixels, i64::from(left), i64::from(top));
        Self::new(canvas)
    }

    /// NCHW tensor with a batch of one, channels in RGB order, scaled to `[0, 1]`.
    pub fn to_tensor(&self) -> Array4<f32> {
        let (width, height) = (self.width() as usize, self.height() as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
        for (x, y, pixel) in self.pixels.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
            }
        }
        tensor
    }
}
