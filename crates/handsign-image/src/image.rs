//! Owned frames and borrowed views.

use std::{fmt, path::Path};

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::{Channel, Color, GrayImage, Rect, Resolution};

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_crate(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Returns whether `path` has an extension that [`Image::load`] can decode.
pub fn is_supported_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_crate())?.to_rgba8();
        log::trace!(
            "decoded {:?} image {} ({}x{})",
            format,
            path.display(),
            buf.width(),
            buf.height()
        );
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        match ImageFormat::from_path(path)? {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => Ok(image::DynamicImage::ImageRgba8(self.buf.clone())
                .to_rgb8()
                .save(path)?),
            ImageFormat::Png => Ok(self.buf.save(path)?),
        }
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image of the given size with every pixel set to `color`.
    pub fn filled(res: impl Into<Resolution>, color: Color) -> Self {
        let res = res.into();
        let mut image = Self::new(res.width(), res.height());
        image.clear(color);
        image
    }

    /// Creates an image by calling `f` with the coordinates of every pixel.
    pub fn from_fn(res: impl Into<Resolution>, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        let res = res.into();
        Self {
            buf: ImageBuffer::from_fn(res.width(), res.height(), |x, y| Rgba(f(x, y).0)),
        }
    }

    /// Creates an opaque [`Image`] from interleaved RGB pixel data.
    ///
    /// # Panics
    ///
    /// `buf` must be exactly `width * height * 3` bytes long, or this function will panic.
    pub fn from_rgb8(res: impl Into<Resolution>, buf: &[u8]) -> Self {
        let res = res.into();
        let expected_size = res.width() as usize * res.height() as usize * 3;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        let mut pixels = buf.chunks_exact(3);
        Self::from_fn(res, |_, _| match pixels.next() {
            Some(&[r, g, b]) => Color::from_rgb8(r, g, b),
            _ => unreachable!(),
        })
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the image.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.resolution().rect()
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Creates an immutable view into an area of this image, specified by `rect`.
    ///
    /// `rect` is clipped to the bounds of `self`. If it does not overlap the image at all, the
    /// returned view is empty (0x0 pixels).
    pub fn view(&self, rect: Rect) -> ImageView<'_> {
        let rect = self
            .rect()
            .intersection(&rect)
            .unwrap_or(Rect::from_top_left(0, 0, 0, 0));
        ImageView { image: self, rect }
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An immutable view of a rectangular section of an [`Image`].
///
/// The viewed area always lies fully inside the underlying image.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    /// Rectangle in the root image's coordinates.
    rect: Rect,
}

impl<'a> ImageView<'a> {
    /// Returns the width of this view, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    /// Returns the height of this view, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Returns the size of this view.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the area of the underlying [`Image`] this view covers.
    #[inline]
    pub fn image_rect(&self) -> Rect {
        self.rect
    }

    /// Gets the image color at the given pixel coordinates, relative to the view.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this view.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        assert!(
            x < self.width() && y < self.height(),
            "pixel ({x},{y}) out of bounds for {:?}",
            self,
        );
        self.image
            .get(self.rect.x() as u32 + x, self.rect.y() as u32 + y)
    }

    /// Creates a subview of this view. `rect` is relative to `self` and clipped to it.
    pub fn view(&self, rect: Rect) -> ImageView<'a> {
        let rect = rect.move_by(self.rect.x(), self.rect.y());
        let rect = self
            .rect
            .intersection(&rect)
            .unwrap_or(Rect::from_top_left(0, 0, 0, 0));
        ImageView {
            image: self.image,
            rect,
        }
    }

    /// Copies a single color channel of this view into a new [`GrayImage`].
    pub fn channel(&self, channel: Channel) -> GrayImage {
        GrayImage::from_fn(self.resolution(), |x, y| self.get(x, y).channel(channel))
    }

    /// Splits this view into its red, green, and blue planes.
    pub fn split(&self) -> [GrayImage; 3] {
        Channel::ALL.map(|channel| self.channel(channel))
    }

    /// Copies the contents of this view into a new [`Image`].
    pub fn to_image(&self) -> Image {
        Image::from_fn(self.resolution(), |x, y| self.get(x, y))
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageView", self.width(), self.height())
    }
}

/// Trait for types that can be treated as read-only views of image data.
///
/// This allows abstracting over [`Image`] and [`ImageView`] and should be used by any code that
/// takes immutable image data as input.
pub trait AsImageView {
    /// Returns an [`ImageView`] covering `self`.
    fn as_view(&self) -> ImageView<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.rect())
    }
}

impl<'a> AsImageView for ImageView<'a> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl<'a, V: AsImageView> AsImageView for &'a V {
    fn as_view(&self) -> ImageView<'_> {
        (*self).as_view()
    }
}
