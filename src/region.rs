//! Cropping per-person working images out of a capture.
//!
//! Analysis stages operate on the [`Crop`] of a single person to keep their work proportional to
//! the person's size. Everything they report is in crop-local coordinates and has to be moved
//! back into the capture's coordinate system via [`Crop::to_global`] before it is stored.

use anyhow::ensure;

use crate::{
    image::Image,
    rect::{BoundingBox, PixelRect},
};

/// A sub-image cut out of a larger image, together with its position in that image.
#[derive(Debug, Clone)]
pub struct Crop {
    image: Image,
    origin: [i32; 2],
}

impl Crop {
    /// Returns the cropped pixels.
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns the position of the crop's top-left pixel in the source image.
    #[inline]
    pub fn origin(&self) -> [i32; 2] {
        self.origin
    }

    /// Returns the area of the source image covered by this crop.
    pub fn rect(&self) -> PixelRect {
        PixelRect::new(
            self.origin[0],
            self.origin[1],
            self.image.width() as i32,
            self.image.height() as i32,
        )
    }

    /// Returns the offset that [`Crop::to_global`] adds to crop-local coordinates.
    #[inline]
    pub fn offset(&self) -> [f32; 2] {
        [self.origin[0] as f32, self.origin[1] as f32]
    }

    /// Converts a point in crop coordinates to source image coordinates.
    #[inline]
    pub fn to_global(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        [x + self.origin[0] as f32, y + self.origin[1] as f32]
    }

    /// Converts a point in source image coordinates to crop coordinates.
    #[inline]
    pub fn to_local(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        [x - self.origin[0] as f32, y - self.origin[1] as f32]
    }
}

/// Cuts the area described by `bbox` out of `source`.
///
/// The box is rounded to whole pixels and clamped to the bounds of `source`; the crop origin is
/// the clamped top-left corner.
///
/// # Errors
///
/// Fails if a coordinate of `bbox` is not finite, if the rounded width or height is 0 or less,
/// or if the box lies entirely outside of `source`.
pub fn crop(source: &Image, bbox: &BoundingBox) -> anyhow::Result<Crop> {
    ensure!(bbox.is_finite(), "bounding box {bbox:?} is not finite");

    let rect = bbox.round();
    ensure!(
        !rect.is_empty(),
        "bounding box {bbox:?} has no area (rounded to {}x{})",
        rect.width(),
        rect.height(),
    );

    let Some(clamped) = rect.intersection(&source.rect()) else {
        anyhow::bail!(
            "bounding box {bbox:?} lies outside of the {}x{} source image",
            source.width(),
            source.height(),
        );
    };

    log::trace!("cropping {clamped:?} out of {source:?}");
    Ok(Crop {
        image: source.crop(clamped),
        origin: [clamped.x(), clamped.y()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Color;

    #[test]
    fn degenerate_boxes_fail() {
        let image = Image::new(20, 20);
        crop(&image, &BoundingBox::new(0.0, 0.0, 0.0, 10.0)).unwrap_err();
        crop(&image, &BoundingBox::new(0.0, 0.0, 10.0, -1.0)).unwrap_err();
        crop(&image, &BoundingBox::new(0.0, 0.0, 0.4, 10.0)).unwrap_err();
        crop(&image, &BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0)).unwrap_err();
    }

    #[test]
    fn outside_fails() {
        let image = Image::new(20, 20);
        crop(&image, &BoundingBox::new(25.0, 0.0, 5.0, 5.0)).unwrap_err();
        crop(&image, &BoundingBox::new(-10.0, -10.0, 10.0, 10.0)).unwrap_err();
    }

    #[test]
    fn huge_boxes_fail() {
        let image = Image::new(20, 20);
        let err = crop(&image, &BoundingBox::new(2.0e9, 0.0, 2.0e9, 10.0)).unwrap_err();
        assert!(err.to_string().contains("lies outside"), "{err:#}");
        let tall = crop(&image, &BoundingBox::new(0.0, -1.0e9, 10.0, 3.0e9)).unwrap();
        assert_eq!(tall.rect(), PixelRect::new(0, 0, 10, 20));
    }

    #[test]
    fn clamps_to_source() {
        let mut image = Image::new(20, 20);
        image.set(0, 3, Color::WHITE);
        let crop = crop(&image, &BoundingBox::new(-4.6, 2.6, 10.0, 100.0)).unwrap();
        assert_eq!(crop.origin(), [0, 3]);
        assert_eq!(crop.rect(), PixelRect::new(0, 3, 5, 17));
        assert_eq!(crop.image().get(0, 0), Color::WHITE);
    }

    #[test]
    fn coordinate_round_trip() {
        let image = Image::new(50, 50);
        let crop = crop(&image, &BoundingBox::new(10.2, 19.7, 20.0, 20.0)).unwrap();
        assert_eq!(crop.origin(), [10, 20]);
        assert_eq!(crop.to_global([1.5, 2.0]), [11.5, 22.0]);
        assert_eq!(crop.to_local([11.5, 22.0]), [1.5, 2.0]);
    }
}
