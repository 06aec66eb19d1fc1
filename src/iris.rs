//! Radial search for the iris boundary.
//!
//! The landmark model reports a handful of points per iris. They are good enough to locate the
//! iris, but too coarse to outline it. [`IrisRefiner`] casts rays from their center outwards and
//! places a boundary point where luminance drops the most along each ray.

use std::f32::consts::TAU;

use anyhow::ensure;

use crate::{
    contour::{Contour, Paired},
    image::Image,
    landmark::Landmark,
    region::Crop,
};

#[derive(Debug, Clone)]
pub struct IrisRefiner {
    angular_steps: usize,
    max_radius_factor: f32,
    min_radius_factor: f32,
}

impl Default for IrisRefiner {
    fn default() -> Self {
        Self {
            angular_steps: Self::DEFAULT_ANGULAR_STEPS,
            max_radius_factor: Self::DEFAULT_MAX_RADIUS_FACTOR,
            min_radius_factor: Self::DEFAULT_MIN_RADIUS_FACTOR,
        }
    }
}

impl IrisRefiner {
    /// Number of rays cast per iris (every 10°).
    pub const DEFAULT_ANGULAR_STEPS: usize = 36;

    /// Rays end at this multiple of the coarse iris radius.
    pub const DEFAULT_MAX_RADIUS_FACTOR: f32 = 1.8;

    /// Gradients closer to the center than this multiple of the coarse radius are ignored.
    pub const DEFAULT_MIN_RADIUS_FACTOR: f32 = 0.4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn angular_steps(self, angular_steps: usize) -> Self {
        Self {
            angular_steps,
            ..self
        }
    }

    pub fn max_radius_factor(self, max_radius_factor: f32) -> Self {
        Self {
            max_radius_factor,
            ..self
        }
    }

    pub fn min_radius_factor(self, min_radius_factor: f32) -> Self {
        Self {
            min_radius_factor,
            ..self
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.angular_steps > 0, "iris refinement needs at least 1 ray");
        ensure!(
            self.min_radius_factor.is_finite() && self.min_radius_factor >= 0.0,
            "iris minimum radius factor must be a non-negative number (got {})",
            self.min_radius_factor
        );
        ensure!(
            self.max_radius_factor.is_finite() && self.max_radius_factor > self.min_radius_factor,
            "iris maximum radius factor must exceed the minimum factor (got {})",
            self.max_radius_factor
        );
        Ok(())
    }

    /// Refines both irises.
    ///
    /// `coarse` holds the model's iris landmarks in the coordinate system of `crop`. The result is
    /// in the coordinate system of the image `crop` was taken from.
    ///
    /// A side without landmarks yields an empty contour. Fails only if neither side produced a
    /// single boundary point.
    pub fn refine(
        &self,
        coarse: &Paired<Contour>,
        crop: &Crop,
    ) -> anyhow::Result<Paired<Contour>> {
        let offset = crop.offset();
        let refined = coarse.as_ref().map(|side| {
            if side.is_empty() {
                log::warn!("no iris landmarks for one eye, leaving it empty");
            }
            self.refine_side(side, crop.image()).translated(offset)
        });

        ensure!(
            !refined.left.is_empty() || !refined.right.is_empty(),
            "no iris boundary found for either eye"
        );
        Ok(refined)
    }

    /// Searches the iris boundary around one eye's coarse iris landmarks.
    ///
    /// Input and output use the coordinate system of `image`. Every output point has the mean
    /// depth of the input landmarks. Rays starting outside of `image`, or not finding any
    /// gradient before leaving it, produce no point.
    pub fn refine_side(&self, coarse: &Contour, image: &Image) -> Contour {
        let Some([cx, cy, cz]) = coarse.centroid() else {
            return Contour::default();
        };
        let radius = coarse
            .iter()
            .map(|lm| (lm.x() - cx).hypot(lm.y() - cy))
            .sum::<f32>()
            / coarse.len() as f32;
        let max_radius = radius * self.max_radius_factor;
        let min_radius = radius * self.min_radius_factor;

        let Some(center) = image.luminance_at(cx, cy) else {
            log::debug!("iris center ({cx}, {cy}) is outside of {image:?}");
            return Contour::default();
        };

        let mut boundary = Contour::default();
        for i in 0..self.angular_steps {
            let angle = i as f32 / self.angular_steps as f32 * TAU;
            let (sin, cos) = angle.sin_cos();

            let mut max_gradient = f32::NEG_INFINITY;
            let mut best = None;
            let mut prev = center;
            let mut r = 1.0;
            while r < max_radius {
                let (x, y) = (cx + cos * r, cy + sin * r);
                let Some(current) = image.luminance_at(x, y) else {
                    break;
                };

                // Positive when getting darker.
                let gradient = prev - current;
                if r > min_radius && gradient > max_gradient {
                    max_gradient = gradient;
                    best = Some([x, y]);
                }
                prev = current;
                r += 1.0;
            }

            if let Some([x, y]) = best {
                boundary.push(Landmark::new([x, y, cz]));
            }
        }

        boundary
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{image::Color, rect::BoundingBox, region::crop};

    const DARK: Color = Color::gray(40);

    /// Dark image with a white disc of radius `r` around `(cx, cy)`.
    fn eye(size: u32, [cx, cy]: [f32; 2], r: f32) -> Image {
        let mut image = Image::new(size, size);
        image.clear(DARK);
        for y in 0..size {
            for x in 0..size {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                if dx.hypot(dy) < r {
                    image.set(x, y, Color::WHITE);
                }
            }
        }
        image
    }

    /// Four landmarks at distance `r` from the center.
    fn coarse_ring([cx, cy]: [f32; 2], r: f32, z: f32) -> Contour {
        [[r, 0.0], [0.0, r], [-r, 0.0], [0.0, -r]]
            .into_iter()
            .map(|[dx, dy]| Landmark::new([cx + dx, cy + dy, z]))
            .collect()
    }

    #[test]
    fn finds_disc_edge() {
        let image = eye(40, [20.0, 20.0], 8.0);
        // Coarse radius of 6 px: rays run up to 10.8 px and ignore the first 2.4 px.
        let coarse = coarse_ring([20.0, 20.0], 6.0, 0.5);

        let refined = IrisRefiner::new().refine_side(&coarse, &image);
        assert_eq!(refined.len(), IrisRefiner::DEFAULT_ANGULAR_STEPS);
        for point in refined.iter() {
            let dist = (point.x() - 20.0).hypot(point.y() - 20.0);
            assert!((7.5..=9.5).contains(&dist), "{point:?} at {dist}");
            assert_relative_eq!(point.z(), 0.5);
        }
    }

    #[test]
    fn missing_side_is_empty() {
        let image = eye(40, [20.0, 20.0], 8.0);
        let crop = crop(&image, &BoundingBox::new(0.0, 0.0, 40.0, 40.0)).unwrap();
        let coarse = Paired::new(coarse_ring([20.0, 20.0], 6.0, 0.0), Contour::default());

        let refined = IrisRefiner::new().refine(&coarse, &crop).unwrap();
        assert!(!refined.left.is_empty());
        assert!(refined.right.is_empty());

        IrisRefiner::new()
            .refine(&Paired::default(), &crop)
            .unwrap_err();
    }

    #[test]
    fn output_is_global() {
        let mut image = Image::new(100, 100);
        image.clear(DARK);
        let disc = eye(40, [20.0, 20.0], 8.0);
        for y in 0..40 {
            for x in 0..40 {
                image.set(x + 50, y + 30, disc.get(x, y));
            }
        }
        let crop = crop(&image, &BoundingBox::new(50.0, 30.0, 40.0, 40.0)).unwrap();
        let coarse = Paired::new(Contour::default(), coarse_ring([20.0, 20.0], 6.0, 0.0));

        let refined = IrisRefiner::new().refine(&coarse, &crop).unwrap();
        let center = refined.right.centroid().unwrap();
        assert_relative_eq!(center[0], 70.0, epsilon = 1.0);
        assert_relative_eq!(center[1], 50.0, epsilon = 1.0);
    }

    #[test]
    fn center_outside_image() {
        let image = eye(10, [5.0, 5.0], 2.0);
        let coarse = coarse_ring([50.0, 50.0], 3.0, 0.0);
        assert!(IrisRefiner::new().refine_side(&coarse, &image).is_empty());
    }
}
