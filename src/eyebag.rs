//! Eyebag contour estimation.
//!
//! The landmark model has no points for the fold below the lower eyelid. [`EyebagEstimator`]
//! finds it from the image alone: inside a region of interest below each eye it looks for the
//! strongest vertical luminance change in every pixel column, then cleans up the resulting
//! polyline (short gaps are interpolated, spikes removed by a median filter).

use anyhow::ensure;

use crate::{
    contour::{Contour, Paired},
    image::Image,
    landmark::Landmark,
    num::TotalF32,
    rect::PixelRect,
    region::Crop,
};

#[derive(Debug, Clone)]
pub struct EyebagEstimator {
    padding: f32,
    min_width: i32,
    smooth_radius: usize,
    max_gap: usize,
    below_factor: f32,
    above_factor: f32,
}

impl Default for EyebagEstimator {
    fn default() -> Self {
        Self {
            padding: Self::DEFAULT_PADDING,
            min_width: Self::DEFAULT_MIN_WIDTH,
            smooth_radius: Self::DEFAULT_SMOOTH_RADIUS,
            max_gap: Self::DEFAULT_MAX_GAP,
            below_factor: Self::DEFAULT_BELOW_FACTOR,
            above_factor: Self::DEFAULT_ABOVE_FACTOR,
        }
    }
}

impl EyebagEstimator {
    /// Margin around the eye's bounding box, in pixels.
    pub const DEFAULT_PADDING: f32 = 8.0;
    /// Minimum width of the searched region, in pixels.
    pub const DEFAULT_MIN_WIDTH: i32 = 12;
    /// Radius of the median filter applied to the edge polyline.
    pub const DEFAULT_SMOOTH_RADIUS: usize = 3;
    /// Longest run of columns without an edge that is filled by interpolation.
    pub const DEFAULT_MAX_GAP: usize = 6;
    /// The region extends this many paddings below the eye.
    pub const DEFAULT_BELOW_FACTOR: f32 = 2.0;
    /// The region extends this many paddings above the eye.
    pub const DEFAULT_ABOVE_FACTOR: f32 = 0.2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn padding(self, padding: f32) -> Self {
        Self { padding, ..self }
    }

    pub fn min_width(self, min_width: i32) -> Self {
        Self { min_width, ..self }
    }

    /// Sets the median filter radius. A radius of 0 is treated as 1.
    pub fn smooth_radius(self, smooth_radius: usize) -> Self {
        Self {
            smooth_radius,
            ..self
        }
    }

    pub fn max_gap(self, max_gap: usize) -> Self {
        Self { max_gap, ..self }
    }

    pub fn below_factor(self, below_factor: f32) -> Self {
        Self {
            below_factor,
            ..self
        }
    }

    pub fn above_factor(self, above_factor: f32) -> Self {
        Self {
            above_factor,
            ..self
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("padding", self.padding),
            ("below factor", self.below_factor),
            ("above factor", self.above_factor),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                "eyebag {name} must be a non-negative number (got {value})"
            );
        }
        ensure!(
            self.min_width >= 0,
            "eyebag minimum width must not be negative (got {})",
            self.min_width
        );
        Ok(())
    }

    /// Estimates the eyebag polylines below both eyes.
    ///
    /// `eyes` are the eye landmarks in the coordinate system of `crop`; the returned polylines are
    /// in the coordinate system of the image `crop` was taken from. Fails if no edge was found
    /// below either eye.
    pub fn detect(
        &self,
        eyes: &Paired<Contour>,
        crop: &Crop,
    ) -> anyhow::Result<Paired<Contour>> {
        let offset = crop.offset();
        let bags = eyes
            .as_ref()
            .map(|eye| self.detect_eye(eye, crop.image()).translated(offset));

        ensure!(
            !bags.left.is_empty() || !bags.right.is_empty(),
            "no eyebag edge found below either eye"
        );
        Ok(bags)
    }

    /// Estimates the eyebag polyline below one eye.
    ///
    /// Input and output use the coordinate system of `image`. The polyline has at most one point
    /// per pixel column, ordered left to right (in image space), with a depth of 0.
    pub fn detect_eye(&self, eye: &Contour, image: &Image) -> Contour {
        let Some(bounds) = eye.bounding_rect() else {
            return Contour::default();
        };
        if image.width() == 0 || image.height() == 0 {
            return Contour::default();
        }

        let roi = self.roi(
            [bounds.x(), bounds.y(), bounds.right(), bounds.bottom()],
            image,
        );
        if roi.is_empty() {
            log::trace!("eyebag region of interest for {bounds:?} is empty");
            return Contour::default();
        }

        let gradient = vertical_gradient(image, roi);
        let mut edges = strongest_rows(&gradient, roi);
        fill_short_gaps(&mut edges, self.max_gap);
        let smoothed = median_filter(&edges, self.smooth_radius.max(1));

        let x_min = (bounds.x() - self.padding).floor().max(0.0);
        let x_max = (bounds.right() + self.padding)
            .ceil()
            .min((image.width() - 1) as f32);

        smoothed
            .iter()
            .enumerate()
            .filter_map(|(col, y)| Some(((roi.x() + col as i32) as f32, (*y)?)))
            .filter(|(x, _)| *x >= x_min && *x <= x_max)
            .map(|(x, y)| Landmark::from_xy(x, y))
            .collect()
    }

    /// Computes the searched region from the eye's bounds `[x_min, y_min, x_max, y_max]`.
    fn roi(&self, [x_min, y_min, x_max, y_max]: [f32; 4], image: &Image) -> PixelRect {
        let w = (image.width() - 1) as f32;
        let h = (image.height() - 1) as f32;
        let pad = self.padding;

        let left = (x_min - pad).clamp(0.0, w).floor() as i32;
        let right = (x_max + pad).clamp(0.0, w).ceil() as i32;
        let top = (y_min - pad * self.above_factor).clamp(0.0, h).floor() as i32;
        let bottom = (y_max + pad * self.below_factor).clamp(0.0, h).ceil() as i32;

        PixelRect::new(left, top, self.min_width.max(right - left), bottom - top)
    }
}

/// Central-difference vertical luminance gradient over `roi`, stored row by row.
///
/// The rows above the first and below the last row of `roi` are taken to repeat the edge row.
/// Columns past the right edge of the image repeat its last column.
fn vertical_gradient(image: &Image, roi: PixelRect) -> Vec<f32> {
    let (rows, cols) = (roi.height() as usize, roi.width() as usize);
    let gray = (0..rows)
        .flat_map(|r| {
            (0..cols).map(move |c| {
                let (x, y) = (roi.x() + c as i32, roi.y() + r as i32);
                image.luminance_clamped(x as f32, y as f32)
            })
        })
        .collect::<Vec<_>>();

    let mut gradient = vec![0.0; rows * cols];
    for r in 0..rows {
        let above = r.saturating_sub(1);
        let below = (r + 1).min(rows - 1);
        for c in 0..cols {
            gradient[r * cols + c] = gray[below * cols + c] - gray[above * cols + c];
        }
    }
    gradient
}

/// Picks the row with the largest absolute gradient in every column, in image Y coordinates.
///
/// The first and last row are never picked, since their gradient is one-sided. The topmost of
/// several equally strong rows wins.
fn strongest_rows(gradient: &[f32], roi: PixelRect) -> Vec<Option<f32>> {
    let (rows, cols) = (roi.height() as usize, roi.width() as usize);
    (0..cols)
        .map(|c| {
            let mut best: Option<(usize, f32)> = None;
            for r in 1..rows.saturating_sub(1) {
                let value = gradient[r * cols + c].abs();
                if best.map_or(true, |(_, max)| value > max) {
                    best = Some((r, value));
                }
            }
            best.map(|(r, _)| (r as i32 + roi.y()) as f32)
        })
        .collect()
}

/// Linearly interpolates runs of at most `max_gap` missing values that have a known value on
/// both sides.
pub(crate) fn fill_short_gaps(values: &mut [Option<f32>], max_gap: usize) {
    let mut i = 0;
    while i < values.len() {
        if values[i].is_some() {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < values.len() && values[j].is_none() {
            j += 1;
        }

        if i > 0 && j < values.len() && j - i <= max_gap {
            if let (Some(a), Some(b)) = (values[i - 1], values[j]) {
                let span = (j - i + 1) as f32;
                for k in i..j {
                    let t = (k - i + 1) as f32 / span;
                    values[k] = Some(a * (1.0 - t) + b * t);
                }
            }
        }
        i = j;
    }
}

/// Sliding median over the known values within `radius` of each position.
///
/// For an even number of known values the upper median is used. Positions with no known values
/// in their window stay unknown.
pub(crate) fn median_filter(values: &[Option<f32>], radius: usize) -> Vec<Option<f32>> {
    let window_len = radius.saturating_mul(2).saturating_add(1);
    let mut window = Vec::with_capacity(window_len.min(values.len()));
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = i.saturating_add(radius).min(values.len() - 1);
            window.clear();
            window.extend(values[lo..=hi].iter().flatten().copied().map(TotalF32));
            if window.is_empty() {
                return None;
            }
            window.sort_unstable();
            Some(window[window.len() / 2].0)
        })
        .collect()
}
