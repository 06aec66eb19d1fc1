//! Pipeline configuration.

use anyhow::{ensure, Context};

use crate::{eyebag::EyebagEstimator, gradient::GradientRefiner, iris::IrisRefiner};

/// Settings of a [`Pipeline`].
///
/// All settings have sensible defaults; use the builder methods to change them.
///
/// [`Pipeline`]: crate::detection::Pipeline
#[derive(Debug, Clone)]
pub struct Config {
    person_label: String,
    person_threshold: f32,
    gradient: GradientRefiner,
    iris: IrisRefiner,
    eyebags: EyebagEstimator,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            person_label: Self::DEFAULT_PERSON_LABEL.to_string(),
            person_threshold: Self::DEFAULT_PERSON_THRESHOLD,
            gradient: GradientRefiner::default(),
            iris: IrisRefiner::default(),
            eyebags: EyebagEstimator::default(),
        }
    }
}

impl Config {
    /// Label of the object detector's class that denotes a person.
    pub const DEFAULT_PERSON_LABEL: &'static str = "person";

    /// Minimum detector confidence required to analyze a person.
    pub const DEFAULT_PERSON_THRESHOLD: f32 = 0.5;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn person_label(self, person_label: impl Into<String>) -> Self {
        Self {
            person_label: person_label.into(),
            ..self
        }
    }

    pub fn person_threshold(self, person_threshold: f32) -> Self {
        Self {
            person_threshold,
            ..self
        }
    }

    pub fn gradient(self, gradient: GradientRefiner) -> Self {
        Self { gradient, ..self }
    }

    pub fn iris(self, iris: IrisRefiner) -> Self {
        Self { iris, ..self }
    }

    pub fn eyebags(self, eyebags: EyebagEstimator) -> Self {
        Self { eyebags, ..self }
    }

    pub fn get_person_label(&self) -> &str {
        &self.person_label
    }

    pub fn get_person_threshold(&self) -> f32 {
        self.person_threshold
    }

    pub fn get_gradient(&self) -> &GradientRefiner {
        &self.gradient
    }

    pub fn get_iris(&self) -> &IrisRefiner {
        &self.iris
    }

    pub fn get_eyebags(&self) -> &EyebagEstimator {
        &self.eyebags
    }

    /// Checks that all settings are within their valid range.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.person_label.is_empty(), "person label is empty");
        ensure!(
            self.person_threshold.is_finite() && self.person_threshold > 0.0,
            "person threshold must be a positive number (got {})",
            self.person_threshold
        );
        self.gradient
            .validate()
            .context("invalid gradient refinement settings")?;
        self.iris
            .validate()
            .context("invalid iris refinement settings")?;
        self.eyebags
            .validate()
            .context("invalid eyebag estimation settings")?;
        Ok(())
    }
}
