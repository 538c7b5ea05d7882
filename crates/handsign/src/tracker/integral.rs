//! Summed-area tables over frame luma.

use handsign_image::{GrayImage, Image, Rect, Resolution};

/// A summed-area table of an 8-bit plane.
///
/// Allows the sum over any axis-aligned rectangle to be computed with 4 lookups.
pub struct IntegralImage {
    res: Resolution,
    /// `(width + 1) * (height + 1)` entries; row 0 and column 0 are all zeros.
    sums: Vec<u64>,
}

impl IntegralImage {
    /// Computes the integral image of a frame's luma.
    pub fn new(frame: &Image) -> Self {
        Self::from_gray(&GrayImage::luma(frame))
    }

    pub fn from_gray(plane: &GrayImage) -> Self {
        let res = plane.resolution();
        let width = res.width() as usize;
        let stride = width + 1;
        let mut sums = vec![0; stride * (res.height() as usize + 1)];
        if width == 0 {
            return Self { res, sums };
        }
        for (y, row) in plane.data().chunks_exact(width).enumerate() {
            let mut row_sum = 0;
            for (x, &value) in row.iter().enumerate() {
                row_sum += u64::from(value);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self { res, sums }
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.res
    }

    #[inline]
    fn at(&self, x: u32, y: u32) -> u64 {
        self.sums[y as usize * (self.res.width() as usize + 1) + x as usize]
    }

    /// Sums the pixel values inside `rect`.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not fully inside the plane.
    pub fn rect_sum(&self, rect: Rect) -> u64 {
        assert!(
            self.res.rect().contains_rect(&rect),
            "{:?} is out of bounds for {} integral image",
            rect,
            self.res
        );
        let (left, top) = (rect.x() as u32, rect.y() as u32);
        let (right, bottom) = (rect.right() as u32, rect.bottom() as u32);
        self.at(right, bottom) + self.at(left, top) - self.at(right, top) - self.at(left, bottom)
    }

    /// Computes the mean pixel value inside `rect`. Empty rectangles have a mean of 0.
    pub fn rect_mean(&self, rect: Rect) -> f32 {
        if rect.is_empty() {
            return 0.0;
        }
        self.rect_sum(rect) as f32 / rect.area() as f32
    }
}
