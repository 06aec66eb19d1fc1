//! Ordered point sequences and polygon containment.

use std::ops::Deref;

use crate::{error::Error, landmark::Landmark, rect::BoundingBox};

/// An ordered sequence of landmarks describing an open or closed boundary.
///
/// Order is significant: consecutive landmarks (and the last and first one) form the edges used
/// by [`Contour::contains`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contour {
    points: Vec<Landmark>,
}

impl Contour {
    #[inline]
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn push(&mut self, landmark: Landmark) {
        self.points.push(landmark);
    }

    #[inline]
    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    #[inline]
    pub fn into_points(self) -> Vec<Landmark> {
        self.points
    }

    /// Returns the mean position of all landmarks, or [`None`] if the contour is empty.
    pub fn centroid(&self) -> Option<[f32; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f32;
        let mut center = [0.0; 3];
        for pos in self.points.iter().map(Landmark::position) {
            center[0] += pos[0] / n;
            center[1] += pos[1] / n;
            center[2] += pos[2] / n;
        }
        Some(center)
    }

    /// Computes the 2D bounding box of this contour, or [`None`] if it is empty.
    pub fn bounding_rect(&self) -> Option<BoundingBox> {
        BoundingBox::bounding(self.points.iter().map(Landmark::xy))
    }

    /// Returns a copy of this contour with every landmark moved by `offset`.
    #[must_use]
    pub fn translated(&self, offset: [f32; 2]) -> Self {
        self.points.iter().map(|lm| lm.translate(offset)).collect()
    }

    /// Tests whether `point` lies inside the polygon formed by this contour.
    ///
    /// Points on an edge or vertex count as inside. Depth is ignored.
    ///
    /// Returns [`Error::InvalidArgument`] if a coordinate of `point` is NaN or infinite.
    pub fn contains(&self, point: [f32; 2]) -> Result<bool, Error> {
        if !point.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "point {point:?} is not finite"
            )));
        }
        Ok(polygon_contains(&self.points, point))
    }
}

impl Deref for Contour {
    type Target = [Landmark];

    #[inline]
    fn deref(&self) -> &[Landmark] {
        &self.points
    }
}

impl FromIterator<Landmark> for Contour {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<Vec<Landmark>> for Contour {
    #[inline]
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

impl<'a> IntoIterator for &'a Contour {
    type Item = &'a Landmark;
    type IntoIter = std::slice::Iter<'a, Landmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Ray-casting parity test of `point` against the polygon with the vertices `polygon`.
///
/// Edges are half-open in Y (`(yi > py) != (yj > py)`), so a horizontal ray never counts a vertex
/// twice. Since parity alone misclassifies points on the right and bottom edges, points lying on
/// any edge are reported as inside before the parity test runs. Polygons with fewer than 3
/// vertices contain nothing but their own edges.
pub fn polygon_contains(polygon: &[Landmark], [px, py]: [f32; 2]) -> bool {
    let n = polygon.len();
    if n == 0 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = polygon[i].xy();
        let [xj, yj] = polygon[j].xy();

        if on_segment([xi, yi], [xj, yj], [px, py]) {
            return true;
        }

        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    n >= 3 && inside
}

fn on_segment(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> bool {
    const EPS: f32 = 1e-4;

    let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
    let len = (b[0] - a[0]).hypot(b[1] - a[1]);
    if cross.abs() > EPS * len.max(1.0) {
        return false;
    }

    p[0] >= a[0].min(b[0]) - EPS
        && p[0] <= a[0].max(b[0]) + EPS
        && p[1] >= a[1].min(b[1]) - EPS
        && p[1] <= a[1].max(b[1]) + EPS
}

/// A feature that exists once per side of the face.
///
/// `left` and `right` are from the depicted person's point of view: `left` usually appears on the
/// *right* side of a non-mirrored photo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paired<T> {
    pub left: T,
    pub right: T,
}

impl<T> Paired<T> {
    #[inline]
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Paired<U> {
        Paired {
            left: f(self.left),
            right: f(self.right),
        }
    }

    #[inline]
    pub fn as_ref(&self) -> Paired<&T> {
        Paired {
            left: &self.left,
            right: &self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Contour {
        [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]
            .into_iter()
            .map(Landmark::from)
            .collect()
    }

    #[test]
    fn square_containment() {
        let square = square();
        assert_eq!(square.contains([5.0, 5.0]), Ok(true));
        assert_eq!(square.contains([10.0, 5.0]), Ok(true));
        assert_eq!(square.contains([0.0, 5.0]), Ok(true));
        assert_eq!(square.contains([10.0, 10.0]), Ok(true));
        assert_eq!(square.contains([11.0, 5.0]), Ok(false));
        assert_eq!(square.contains([5.0, -0.5]), Ok(false));
    }

    #[test]
    fn rejects_non_finite_points() {
        let square = square();
        assert!(matches!(
            square.contains([f32::NAN, 5.0]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            square.contains([1.0, f32::INFINITY]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn degenerate_polygons() {
        assert!(!polygon_contains(&[], [0.0, 0.0]));
        let line = [Landmark::from_xy(0.0, 0.0), Landmark::from_xy(4.0, 0.0)];
        assert!(polygon_contains(&line, [2.0, 0.0]));
        assert!(!polygon_contains(&line, [2.0, 1.0]));
    }

    #[test]
    fn concave() {
        // U shape, opening upwards
        let u: Contour = [
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 8.0],
            [8.0, 8.0],
            [8.0, 0.0],
            [10.0, 0.0],
            [10.0, 10.0],
            [0.0, 10.0],
        ]
        .into_iter()
        .map(Landmark::from)
        .collect();
        assert_eq!(u.contains([1.0, 5.0]), Ok(true));
        assert_eq!(u.contains([5.0, 5.0]), Ok(false));
        assert_eq!(u.contains([5.0, 9.0]), Ok(true));
    }

    #[test]
    fn random_points_in_rectangles() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..200 {
            let x = rng.f32() * 100.0;
            let y = rng.f32() * 100.0;
            let w = 1.0 + rng.f32() * 50.0;
            let h = 1.0 + rng.f32() * 50.0;
            let rect: Contour = [[x, y], [x + w, y], [x + w, y + h], [x, y + h]]
                .into_iter()
                .map(Landmark::from)
                .collect();

            let px = rng.f32() * 160.0 - 5.0;
            let py = rng.f32() * 160.0 - 5.0;
            // Keep clear of the edges, where rounding decides.
            let margin = 0.01;
            let clearly_inside = px > x + margin
                && px < x + w - margin
                && py > y + margin
                && py < y + h - margin;
            let clearly_outside = px < x - margin
                || px > x + w + margin
                || py < y - margin
                || py > y + h + margin;
            let result = rect.contains([px, py]);
            if clearly_inside {
                assert_eq!(result, Ok(true), "{px},{py} in {x},{y},{w},{h}");
            } else if clearly_outside {
                assert_eq!(result, Ok(false), "{px},{py} in {x},{y},{w},{h}");
            }
        }
    }

    #[test]
    fn centroid_and_bounds() {
        let square = square();
        assert_eq!(square.centroid(), Some([5.0, 5.0, 0.0]));
        assert_eq!(
            square.bounding_rect(),
            Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0))
        );
        assert_eq!(Contour::default().centroid(), None);
        assert_eq!(
            square.translated([1.0, -1.0])[0],
            Landmark::from_xy(1.0, -1.0)
        );
    }
}
