//! Outlines derived from the person segmentation mask.
//!
//! The segmentation collaborator reports which pixels belong to a person. The outline of that
//! region is the *body* boundary of a record; the part of it that lies above the face and outside
//! of the face outline is the *hair* region.

use std::fmt;

use image::{GrayImage, Luma};

use crate::{
    contour::{polygon_contains, Contour},
    image::Image,
    landmark::Landmark,
    rect::PixelRect,
};

/// A binary person mask covering a whole capture.
#[derive(Clone, PartialEq)]
pub struct Mask {
    buf: GrayImage,
}

impl Mask {
    /// Mask values at or above this are foreground.
    pub const THRESHOLD: u8 = 128;

    /// Creates an all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: GrayImage::new(width, height),
        }
    }

    /// Converts a mask image, as rendered by segmentation models, into a [`Mask`].
    ///
    /// Pixels whose red channel is at least [`Mask::THRESHOLD`] are foreground.
    pub fn from_image(image: &Image) -> Self {
        let buf = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get(x, y).r() >= Self::THRESHOLD {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        Self { buf }
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
    pub fn rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width() as i32, self.height() as i32)
    }

    /// Returns whether the pixel at `(x, y)` belongs to a person.
    ///
    /// Pixels outside of the mask are background.
    pub fn is_foreground(&self, x: i32, y: i32) -> bool {
        self.rect().contains(x, y) && self.buf[(x as u32, y as u32)].0[0] >= Self::THRESHOLD
    }

    /// Marks the pixel at `(x, y)` as foreground or background. Out-of-bounds pixels are ignored.
    pub fn set(&mut self, x: i32, y: i32, foreground: bool) {
        if self.rect().contains(x, y) {
            self.buf[(x as u32, y as u32)] = Luma([if foreground { 255 } else { 0 }]);
        }
    }

    /// Marks every pixel inside `rect` as foreground or background.
    pub fn fill_rect(&mut self, rect: PixelRect, foreground: bool) {
        if let Some(rect) = rect.intersection(&self.rect()) {
            for y in rect.y()..rect.bottom() {
                for x in rect.x()..rect.right() {
                    self.set(x, y, foreground);
                }
            }
        }
    }

    /// Returns the number of foreground pixels.
    pub fn count(&self) -> usize {
        self.buf
            .pixels()
            .filter(|p| p.0[0] >= Self::THRESHOLD)
            .count()
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask({}x{})", self.width(), self.height())
    }
}

/// Collects the pixels of `within` for which `inside` holds and which have a 4-neighbour for which
/// it does not hold (or which lies outside of `bounds`), in row-major order.
fn trace(within: PixelRect, bounds: PixelRect, inside: impl Fn(i32, i32) -> bool) -> Contour {
    let mut boundary = Contour::default();
    for y in within.y()..within.bottom() {
        for x in within.x()..within.right() {
            if !inside(x, y) {
                continue;
            }
            let is_edge = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .into_iter()
                .any(|(nx, ny)| !bounds.contains(nx, ny) || !inside(nx, ny));
            if is_edge {
                boundary.push(Landmark::from_xy(x as f32, y as f32));
            }
        }
    }
    boundary
}

/// Extracts the outline of the foreground region of `mask` within `rect`.
///
/// Returns the pixel coordinates of all foreground pixels that have a background pixel as one of
/// their 4 neighbours, or that lie on the border of the mask, in row-major order. Only pixels
/// inside `rect` are considered, but their neighbours outside of `rect` are.
pub fn extract_boundary(mask: &Mask, rect: PixelRect) -> Contour {
    let Some(within) = rect.intersection(&mask.rect()) else {
        return Contour::default();
    };
    trace(within, mask.rect(), |x, y| mask.is_foreground(x, y))
}

/// Determines the hair region of a person.
///
/// The hair region consists of the foreground pixels of `mask` inside `rect` that are outside of
/// the polygon `face` and not below the lowest point of `face`. The outline of that region is
/// returned, in the same format as [`extract_boundary`].
pub fn hair_region(mask: &Mask, rect: PixelRect, face: &Contour) -> Contour {
    let Some(within) = rect.intersection(&mask.rect()) else {
        return Contour::default();
    };
    let Some(face_bounds) = face.bounding_rect() else {
        return Contour::default();
    };
    let chin = face_bounds.bottom();

    trace(within, within, |x, y| {
        mask.is_foreground(x, y)
            && (y as f32) <= chin
            && !polygon_contains(face, [x as f32, y as f32])
    })
}
