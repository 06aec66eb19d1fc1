//! Rectangle types.
//!
//! [`BoundingBox`] is the floating-point rectangle reported by detectors, [`PixelRect`] is its
//! integer counterpart that addresses actual pixels of an [`Image`][crate::image::Image].

use std::fmt;

/// An axis-aligned rectangle in image coordinates, as reported by an object detector.
///
/// The rectangle is described by its top-left corner and its size. Detectors may report boxes with
/// zero or negative size, or boxes that stick out of the image; such boxes are representable, and
/// are rejected only when turned into pixels by the [`region`][crate::region] module.
#[derive(Clone, Copy, PartialEq)]
pub struct BoundingBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl BoundingBox {
    /// Creates a bounding box extending downwards and right from `(x, y)`.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a bounding box from an `[x, y, width, height]` array.
    #[inline]
    pub fn from_array([x, y, width, height]: [f32; 4]) -> Self {
        Self::new(x, y, width, height)
    }

    /// Returns the box as an `[x, y, width, height]` array.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Computes the bounding box that encompasses `points`.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = [f32; 2]>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();

        let [x, y] = iter.next()?;
        let (mut min, mut max) = ([x, y], [x, y]);

        for [x, y] in iter {
            min = [min[0].min(x), min[1].min(y)];
            max = [max[0].max(x), max[1].max(y)];
        }

        Some(Self::new(min[0], min[1], max[0] - min[0], max[1] - min[1]))
    }

    /// Returns the X coordinate of the left side of the box.
    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the Y coordinate of the top side of the box.
    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Returns the X coordinate of the right side of the box.
    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Returns the Y coordinate of the bottom side of the box.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        [self.x + self.width * 0.5, self.y + self.height * 0.5]
    }

    /// Returns whether all coordinates of this box are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Grows the box by adding a margin of `left`, `top`, `right` and `bottom` pixels to the
    /// respective sides.
    #[must_use]
    pub fn grow(&self, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::new(
            self.x - left,
            self.y - top,
            self.width + left + right,
            self.height + top + bottom,
        )
    }

    pub fn contains_point(&self, [x, y]: [f32; 2]) -> bool {
        self.x <= x && self.y <= y && self.right() >= x && self.bottom() >= y
    }

    /// Rounds all coordinates to the nearest integer, yielding the covered [`PixelRect`].
    ///
    /// The resulting rectangle may be empty, or have negative size, if this box does.
    pub fn round(&self) -> PixelRect {
        PixelRect::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round() as i32,
            self.height.round() as i32,
        )
    }
}

impl fmt::Debug for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BoundingBox @ ({},{})/{}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}

impl From<[f32; 4]> for BoundingBox {
    #[inline]
    fn from(array: [f32; 4]) -> Self {
        Self::from_array(array)
    }
}

/// An integer-valued rectangle addressing pixels of an image.
///
/// A [`PixelRect`] with a width or height of 0 or less is considered empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl PixelRect {
    #[inline]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle spanning the pixel ranges `x_min..x_max` and `y_min..y_max`.
    #[inline]
    pub fn from_bounds(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self::new(
            x_min,
            y_min,
            x_max.saturating_sub(x_min),
            y_max.saturating_sub(y_min),
        )
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Returns the exclusive right bound of the rectangle.
    ///
    /// Saturates at [`i32::MAX`] for rectangles reaching past it.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Returns the exclusive bottom bound of the rectangle, saturating like [`PixelRect::right`].
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Computes the intersection of `self` and `other`.
    ///
    /// Returns [`None`] when the intersection is empty (ie. the rectangles do not overlap).
    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x_min = self.x.max(other.x);
        let y_min = self.y.max(other.y);
        let x_max = self.right().min(other.right());
        let y_max = self.bottom().min(other.bottom());

        let rect = PixelRect::from_bounds(x_min, y_min, x_max, y_max);
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding() {
        assert_eq!(BoundingBox::bounding([]), None);
        assert_eq!(
            BoundingBox::bounding([[1.0, 5.0]]),
            Some(BoundingBox::new(1.0, 5.0, 0.0, 0.0))
        );
        assert_eq!(
            BoundingBox::bounding([[1.0, 5.0], [-2.0, 7.0], [3.0, 6.0]]),
            Some(BoundingBox::new(-2.0, 5.0, 5.0, 2.0))
        );
    }

    #[test]
    fn round() {
        let rect = BoundingBox::new(0.4, 9.6, 10.5, 0.2).round();
        assert_eq!(rect, PixelRect::new(0, 10, 11, 0));
        assert!(rect.is_empty());
    }

    #[test]
    fn intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        assert_eq!(
            a.intersection(&PixelRect::new(5, -5, 10, 10)),
            Some(PixelRect::new(5, 0, 5, 5))
        );
        assert_eq!(a.intersection(&PixelRect::new(10, 0, 5, 5)), None);
        assert_eq!(a.intersection(&PixelRect::new(-20, -20, 5, 5)), None);
    }

    #[test]
    fn huge_rects_saturate() {
        let huge = BoundingBox::new(2.0e9, 0.0, 2.0e9, 1.0e10).round();
        assert_eq!(huge.right(), i32::MAX);
        assert_eq!(huge.bottom(), i32::MAX);
        assert_eq!(huge.intersection(&PixelRect::new(0, 0, 20, 20)), None);
        assert_eq!(
            PixelRect::new(i32::MIN, 0, 10, 10).intersection(&PixelRect::new(-5, 0, i32::MAX, 5)),
            None
        );
    }

    #[test]
    fn grow() {
        let rect = BoundingBox::new(10.0, 10.0, 4.0, 2.0).grow(1.0, 2.0, 3.0, 4.0);
        assert_eq!(rect, BoundingBox::new(9.0, 8.0, 8.0, 8.0));
        assert!(rect.contains_point([17.0, 16.0]));
        assert!(!rect.contains_point([17.5, 16.0]));
    }
}
