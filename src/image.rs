//! Owned RGBA pixel buffers.
//!
//! [`Image`] is the buffer type passed between the capture, the collaborator services, and the
//! refiners. Refiners never index pixels directly; they go through the sampling methods here,
//! which define what happens at the image border.

use std::{fmt, ops::Index, path::Path};

use anyhow::{ensure, Context};
use image::{imageops, ImageBuffer, Rgba, RgbaImage};

use crate::{num::luminance, rect::PixelRect};

#[derive(Debug, Clone, Copy)]
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

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone, PartialEq)]
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
        let data =
            std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())
            .with_context(|| format!("failed to decode '{}'", path.display()))?
            .to_rgba8();
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`). JPEG does not
    /// support transparency, so the alpha channel is dropped when saving as JPEG.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        match ImageFormat::from_path(path)? {
            ImageFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgba8(self.buf.clone()).to_rgb8();
                rgb.save(path)?;
            }
            ImageFormat::Png => self.buf.save(path)?,
        }
        Ok(())
    }

    /// Creates an image from a tightly packed RGBA byte buffer, as handed over by a camera
    /// capture.
    ///
    /// Fails if `buf` does not contain exactly `width * height * 4` bytes.
    pub fn from_rgba8(width: u32, height: u32, buf: &[u8]) -> anyhow::Result<Self> {
        let expected_size = width as usize * height as usize * 4;
        ensure!(
            expected_size == buf.len(),
            "incorrect buffer size {} for {}x{} image (expected {} bytes)",
            buf.len(),
            width,
            height,
            expected_size,
        );

        let buf = ImageBuffer::from_vec(width, height, buf.to_vec())
            .context("buffer size does not match image size")?;
        Ok(Self { buf })
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
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

    /// Returns a [`PixelRect`] covering this image.
    #[inline]
    pub fn rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width() as i32, self.height() as i32)
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

    /// Returns the color of the pixel containing the point `(x, y)`.
    ///
    /// The coordinates are floored to find the pixel. Returns [`None`] if the point lies outside
    /// of the image or is not a finite number.
    pub fn sample(&self, x: f32, y: f32) -> Option<Color> {
        let (x, y) = (x.floor(), y.floor());
        if !(x >= 0.0 && y >= 0.0 && x < self.width() as f32 && y < self.height() as f32) {
            return None;
        }
        Some(self.get(x as u32, y as u32))
    }

    /// Returns the luminance of the pixel containing `(x, y)`, or [`None`] if it is outside the
    /// image.
    #[inline]
    pub fn luminance_at(&self, x: f32, y: f32) -> Option<f32> {
        self.sample(x, y).map(|c| c.luminance())
    }

    /// Returns the luminance of the pixel containing `(x, y)`, moving the point onto the nearest
    /// border pixel if it is outside the image.
    ///
    /// Returns `0.0` for an empty image.
    pub fn luminance_clamped(&self, x: f32, y: f32) -> f32 {
        if self.width() == 0 || self.height() == 0 {
            return 0.0;
        }
        let x = clamp_coord(x, self.width());
        let y = clamp_coord(y, self.height());
        self.get(x, y).luminance()
    }

    /// Copies the pixels inside `rect` into a new image.
    ///
    /// Parts of `rect` outside of this image are ignored.
    pub fn crop(&self, rect: PixelRect) -> Image {
        let Some(rect) = rect.intersection(&self.rect()) else {
            return Image::new(0, 0);
        };
        let buf = imageops::crop_imm(
            &self.buf,
            rect.x() as u32,
            rect.y() as u32,
            rect.width() as u32,
            rect.height() as u32,
        )
        .to_image();
        Image { buf }
    }

    /// Fills the pixels inside `rect` with `color`.
    ///
    /// Parts of `rect` outside of this image are ignored.
    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        if let Some(rect) = rect.intersection(&self.rect()) {
            for y in rect.y()..rect.bottom() {
                for x in rect.x()..rect.right() {
                    self.set(x as u32, y as u32, color);
                }
            }
        }
    }

    /// Overwrites every pixel with `color`.
    pub fn clear(&mut self, color: Color) {
        for pixel in self.buf.pixels_mut() {
            *pixel = Rgba(color.0);
        }
    }

    /// Returns the raw RGBA bytes, row by row.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }
}

fn clamp_coord(v: f32, len: u32) -> u32 {
    let max = (len - 1) as f32;
    // `NaN` lands on 0.0 here; `max`/`min` return the non-NaN operand.
    v.floor().max(0.0).min(max) as u32
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({}x{})", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const GRAY: Self = Self([128, 128, 128, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub const fn gray(v: u8) -> Self {
        Self([v, v, v, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    pub fn with_alpha(mut self, a: u8) -> Color {
        self.0[3] = a;
        self
    }

    /// Returns the perceived brightness of this color, ignoring alpha.
    #[inline]
    pub fn luminance(&self) -> f32 {
        luminance(self.r(), self.g(), self.b())
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}
