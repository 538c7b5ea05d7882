//! Single-channel 8-bit planes.

use std::fmt;

use image::{imageops::FilterType, ImageBuffer, Luma};

use crate::{Image, Resolution};

/// Resampling filter used when resizing a [`GrayImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    /// Bilinear interpolation.
    Linear,
    /// Bicubic (Catmull-Rom) interpolation.
    Cubic,
}

impl Interpolation {
    fn filter_type(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Linear => FilterType::Triangle,
            Interpolation::Cubic => FilterType::CatmullRom,
        }
    }
}

/// An 8-bit single-channel image.
#[derive(Clone, PartialEq, Eq)]
pub struct GrayImage {
    buf: ImageBuffer<Luma<u8>, Vec<u8>>,
}

impl GrayImage {
    /// Creates an all-zero plane of the given size.
    pub fn new(res: impl Into<Resolution>) -> Self {
        let res = res.into();
        Self {
            buf: ImageBuffer::new(res.width(), res.height()),
        }
    }

    /// Creates a plane by calling `f` with the coordinates of every pixel.
    pub fn from_fn(res: impl Into<Resolution>, mut f: impl FnMut(u32, u32) -> u8) -> Self {
        let res = res.into();
        Self {
            buf: ImageBuffer::from_fn(res.width(), res.height(), |x, y| Luma([f(x, y)])),
        }
    }

    /// Wraps row-major pixel data.
    ///
    /// Returns [`None`] if `data` does not hold exactly `res.num_pixels()` bytes.
    pub fn from_raw(res: impl Into<Resolution>, data: Vec<u8>) -> Option<Self> {
        let res = res.into();
        ImageBuffer::from_raw(res.width(), res.height(), data).map(|buf| Self { buf })
    }

    /// Computes the luma plane of an RGB image.
    pub fn luma(image: &Image) -> Self {
        Self::from_fn(image.resolution(), |x, y| image.get(x, y).luma())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buf[(x, y)].0[0]
    }

    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        self.buf[(x, y)] = Luma([value]);
    }

    /// Returns the row-major pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }

    /// Applies an inverted binary threshold.
    ///
    /// Pixels strictly below `cutoff` become 255, all others become 0. Dark ink on a bright
    /// background therefore turns into a white shape on black.
    #[must_use]
    pub fn threshold_binary_inv(&self, cutoff: u8) -> GrayImage {
        let mut out = self.clone();
        for pix in out.buf.pixels_mut() {
            pix.0[0] = if pix.0[0] < cutoff { 255 } else { 0 };
        }
        out
    }

    /// Resamples this plane to `res`.
    #[must_use]
    pub fn resize(&self, res: impl Into<Resolution>, interp: Interpolation) -> GrayImage {
        let res = res.into();
        if res == self.resolution() {
            return self.clone();
        }
        GrayImage {
            buf: image::imageops::resize(
                &self.buf,
                res.width(),
                res.height(),
                interp.filter_type(),
            ),
        }
    }

    /// Resamples this plane by a uniform factor.
    ///
    /// Target dimensions are rounded to the nearest integer and never drop below 1.
    #[must_use]
    pub fn scale(&self, factor: f32, interp: Interpolation) -> GrayImage {
        self.resize(self.resolution().scale(factor), interp)
    }
}

impl fmt::Debug for GrayImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} GrayImage", self.width(), self.height())
    }
}
