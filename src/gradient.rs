//! Snapping landmarks onto luminance edges.
//!
//! Landmark models get the relative structure of a face right, but place individual points a few
//! pixels off the visible edge. [`GradientRefiner`] fixes this using a second, independently
//! obtained boundary (the person segmentation outline): for every landmark close to that
//! boundary, the segment between the two is scanned for the strongest luminance change, and the
//! landmark is moved there.

use anyhow::ensure;

use crate::{contour::Contour, image::Image, landmark::Landmark};

/// Moves landmarks onto the strongest luminance edge between them and a reference boundary.
#[derive(Debug, Clone)]
pub struct GradientRefiner {
    snap_threshold: f32,
    steps: usize,
}

impl Default for GradientRefiner {
    fn default() -> Self {
        Self {
            snap_threshold: Self::DEFAULT_SNAP_THRESHOLD,
            steps: Self::DEFAULT_STEPS,
        }
    }
}

impl GradientRefiner {
    /// Landmarks further away from the boundary than this (in pixels) are left alone.
    pub const DEFAULT_SNAP_THRESHOLD: f32 = 15.0;

    /// Number of luminance samples taken along each landmark-to-boundary segment.
    pub const DEFAULT_STEPS: usize = 10;

    /// Landmarks closer to the boundary than this are considered exact already.
    pub const MIN_DISTANCE: f32 = 1.0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum landmark-to-boundary distance at which a landmark is still refined.
    pub fn snap_threshold(self, snap_threshold: f32) -> Self {
        Self {
            snap_threshold,
            ..self
        }
    }

    /// Sets the number of samples taken along each segment.
    ///
    /// A value of 0 is a configuration error: [`GradientRefiner::refine`] will log it and return
    /// its input unchanged.
    pub fn steps(self, steps: usize) -> Self {
        Self { steps, ..self }
    }

    pub fn get_snap_threshold(&self) -> f32 {
        self.snap_threshold
    }

    pub fn get_steps(&self) -> usize {
        self.steps
    }

    /// Checks that the configured parameters are usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.snap_threshold.is_finite() && self.snap_threshold > 0.0,
            "gradient snap threshold must be a positive number (got {})",
            self.snap_threshold
        );
        ensure!(self.steps > 0, "gradient refinement needs at least 1 step");
        Ok(())
    }

    /// Refines every landmark in `landmarks` against `boundary`, sampling luminance from `image`.
    ///
    /// All three inputs must use the same coordinate system. Samples outside of `image` are
    /// clamped to its nearest border pixel.
    ///
    /// If `landmarks` or `boundary` is empty, or the refiner is misconfigured, the landmarks are
    /// returned unchanged.
    pub fn refine(&self, landmarks: &Contour, boundary: &Contour, image: &Image) -> Contour {
        if landmarks.is_empty() || boundary.is_empty() {
            return landmarks.clone();
        }
        if self.steps == 0 {
            log::error!("gradient refinement: step count must be at least 1, skipping");
            return landmarks.clone();
        }

        landmarks
            .iter()
            .map(|lm| self.refine_landmark(*lm, boundary, image))
            .collect()
    }

    fn refine_landmark(
        &self,
        landmark: Landmark,
        boundary: &[Landmark],
        image: &Image,
    ) -> Landmark {
        let Some(target) = nearest(&landmark, boundary) else {
            return landmark;
        };
        let distance = landmark.distance_sq_2d(&target).sqrt();
        if distance > self.snap_threshold || distance < Self::MIN_DISTANCE {
            return landmark;
        }

        let [lx, ly] = landmark.xy();
        let [vx, vy] = [target.x() - lx, target.y() - ly];
        let at = |i: usize| {
            let t = i as f32 / self.steps as f32;
            [lx + vx * t, ly + vy * t]
        };

        let mut best = landmark;
        let mut max_gradient = -1.0;
        let mut last = image.luminance_clamped(lx, ly);
        for i in 1..=self.steps {
            let [x, y] = at(i);
            let current = image.luminance_clamped(x, y);
            let gradient = (current - last).abs();
            if gradient > max_gradient {
                max_gradient = gradient;
                let [px, py] = at(i - 1);
                best = Landmark::new([(px + x) * 0.5, (py + y) * 0.5, landmark.z()]);
            }
            last = current;
        }

        best
    }
}

/// Finds the point of `boundary` closest to `landmark` in 2D. The first of several equally close
/// points wins.
fn nearest(landmark: &Landmark, boundary: &[Landmark]) -> Option<Landmark> {
    let mut min = f32::INFINITY;
    let mut nearest = None;
    for point in boundary {
        let dist = landmark.distance_sq_2d(point);
        if dist < min {
            min = dist;
            nearest = Some(*point);
        }
    }
    nearest
}
