//! The person detection pipeline.
//!
//! A [`Pipeline`] turns a captured image into one [`FaceRecord`] per person in it:
//!
//! 1. The capture is segmented into persons and background.
//! 2. An object detector locates persons in the segmented image. Detections with the wrong label
//!    or too little confidence are discarded.
//! 3. A [`FaceRecord`] is launched for each remaining person, and all of them are analyzed
//!    concurrently.

use std::{
    cmp::Reverse,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{bail, ensure, Context};
use itertools::Itertools;

use crate::{
    config::Config,
    image::Image,
    num::TotalF32,
    record::{FaceRecord, PendingRecord},
    rect::BoundingBox,
    services::{Detection, Segmentation, Services},
    settle::{spawn_stage, Stage},
    timer::Timer,
};

/// Returns the bounding boxes of all detections labeled `label` with a confidence of at least
/// `threshold`, most confident first.
pub fn select_persons(detections: &[Detection], label: &str, threshold: f32) -> Vec<BoundingBox> {
    let selected = detections
        .iter()
        .filter(|det| det.label == label && det.confidence >= threshold)
        .sorted_by_key(|det| Reverse(TotalF32(det.confidence)))
        .map(|det| det.bbox)
        .collect::<Vec<_>>();

    let rejected = detections.len() - selected.len();
    if rejected > 0 {
        log::debug!(
            "{} of {} detections are not a '{label}' with confidence >= {threshold}",
            rejected,
            detections.len(),
        );
    }
    selected
}

/// Detects persons and analyzes their faces and bodies.
///
/// A [`Pipeline`] is cheap to clone. Clones share their services (and thus loaded models) and
/// timers.
#[derive(Debug, Clone)]
pub struct Pipeline {
    services: Arc<Services>,
    config: Arc<Config>,
    t_segment: Arc<Timer>,
    t_detect: Arc<Timer>,
    t_analyze: Arc<Timer>,
}

impl Pipeline {
    /// Creates a pipeline after checking `config` for errors.
    pub fn new(services: Services, config: Config) -> anyhow::Result<Self> {
        config.validate().context("invalid pipeline configuration")?;
        Ok(Self {
            services: Arc::new(services),
            config: Arc::new(config),
            t_segment: Arc::new(Timer::new("segment")),
            t_detect: Arc::new(Timer::new("detect")),
            t_analyze: Arc::new(Timer::new("analyze")),
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> + '_ {
        [&*self.t_segment, &*self.t_detect, &*self.t_analyze]
    }

    /// Segments `image`, detects the persons in it, and analyzes each of them.
    ///
    /// Returns one processed [`FaceRecord`] per accepted person, most confident detection first.
    ///
    /// # Errors
    ///
    /// Fails if a model cannot be loaded, or if segmentation or person detection fails. Failures
    /// during the analysis of an individual person are recorded in its [`FaceRecord`] instead.
    pub fn detect(&self, image: &Image) -> anyhow::Result<Vec<FaceRecord>> {
        self.run(image, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::detect`], but skips segmentation since `segmentation` was already
    /// computed.
    pub fn detect_segmented(&self, segmentation: Segmentation) -> anyhow::Result<Vec<FaceRecord>> {
        self.run_segmented(segmentation, &AtomicBool::new(false))
    }

    /// Starts running [`Pipeline::detect`] on a background thread.
    pub fn capture(&self, image: Image) -> Capture {
        let abandoned = Arc::new(AtomicBool::new(false));
        let pipeline = self.clone();
        let flag = abandoned.clone();
        let stage = spawn_stage("capture", move || pipeline.run(&image, &flag));
        Capture {
            stage: Some(stage),
            abandoned,
        }
    }

    fn run(&self, image: &Image, abandoned: &AtomicBool) -> anyhow::Result<Vec<FaceRecord>> {
        let segmenter = self.services.segmenter()?;
        let segmentation = self
            .t_segment
            .time(|| segmenter.segment(image))
            .context("person segmentation failed")?;
        self.run_segmented(segmentation, abandoned)
    }

    fn run_segmented(
        &self,
        segmentation: Segmentation,
        abandoned: &AtomicBool,
    ) -> anyhow::Result<Vec<FaceRecord>> {
        let Segmentation { foreground, mask } = segmentation;
        ensure!(
            foreground.width() == mask.width() && foreground.height() == mask.height(),
            "segmentation mask is {}x{}, but the segmented image is {}x{}",
            mask.width(),
            mask.height(),
            foreground.width(),
            foreground.height(),
        );

        let detector = self.services.detector()?;
        let detections = self
            .t_detect
            .time(|| detector.detect(&foreground))
            .context("person detection failed")?;
        let persons = select_persons(
            &detections,
            self.config.get_person_label(),
            self.config.get_person_threshold(),
        );
        log::debug!("{} person(s) detected", persons.len());

        if abandoned.load(Ordering::Acquire) {
            bail!("capture was discarded");
        }

        let segmented = Arc::new(foreground);
        let mask = Arc::new(mask);
        let pending = persons
            .into_iter()
            .map(|bbox| {
                FaceRecord::launch(
                    segmented.clone(),
                    mask.clone(),
                    bbox,
                    self.services.clone(),
                    self.config.clone(),
                )
            })
            .collect::<Vec<PendingRecord>>();

        let mut records = Vec::with_capacity(pending.len());
        for record in pending {
            if abandoned.load(Ordering::Acquire) {
                bail!("capture was discarded");
            }
            records.push(self.t_analyze.time(|| record.wait()));
        }

        log::debug!("{}", self.timers().into_iter().join(", "));
        Ok(records)
    }
}

/// A [`Pipeline::detect`] call running in the background.
///
/// Dropping a [`Capture`] (or calling [`Capture::discard`]) abandons it: no further persons are
/// analyzed and the result is thrown away when it arrives. Neither blocks.
pub struct Capture {
    stage: Option<Stage<Vec<FaceRecord>>>,
    abandoned: Arc<AtomicBool>,
}

impl Capture {
    /// Returns whether the capture has finished, ie. whether [`Capture::wait`] will return without
    /// blocking.
    pub fn is_settled(&self) -> bool {
        self.stage.as_ref().map_or(true, |stage| stage.is_settled())
    }

    /// Blocks until the capture has finished and returns its records.
    pub fn wait(mut self) -> anyhow::Result<Vec<FaceRecord>> {
        match self.stage.take() {
            Some(stage) => stage.settle(),
            None => bail!("capture was discarded"),
        }
    }

    /// Abandons the capture without waiting for it.
    pub fn discard(self) {}
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.stage.is_some() {
            log::debug!("abandoning capture");
            self.abandoned.store(true, Ordering::Release);
        }
    }
}
