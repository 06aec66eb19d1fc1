//! Per-person analysis results.
//!
//! A [`FaceRecord`] collects everything that is known about one detected person. It is built in
//! two phases:
//!
//! 1. [`FaceRecord::launch`] crops the person out of the segmented capture and starts the
//!    analysis stages (facial landmarks and body outline) on background threads. It returns a
//!    [`PendingRecord`].
//! 2. [`PendingRecord::wait`] waits until every stage has settled, refines the raw results and
//!    returns the finished [`FaceRecord`].
//!
//! Every feature of a record is stored in its own [`Slot`] and can fail independently. Reading a
//! failed feature returns [`Error::Unavailable`] with the reason it failed.

use std::{fmt, sync::Arc};

use anyhow::{anyhow, ensure};

use crate::{
    angle::{estimate_angle, FaceAngle},
    boundary::{extract_boundary, hair_region, Mask},
    config::Config,
    contour::{Contour, Paired},
    error::{Error, Result},
    image::Image,
    landmark::FaceParts,
    rect::BoundingBox,
    region::{self, Crop},
    services::Services,
    settle::{spawn_stage, Stage},
};

/// A feature of a [`FaceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Contour,
    Body,
    Eyes,
    Nose,
    Mouth,
    Eyebrows,
    Eyebags,
    Iris,
    Hair,
    FaceAngle,
}

impl Feature {
    pub const ALL: [Self; 10] = [
        Self::Contour,
        Self::Body,
        Self::Eyes,
        Self::Nose,
        Self::Mouth,
        Self::Eyebrows,
        Self::Eyebags,
        Self::Iris,
        Self::Hair,
        Self::FaceAngle,
    ];

    /// The features derived from facial landmarks.
    const FROM_LANDMARKS: [Self; 8] = [
        Self::Contour,
        Self::Eyes,
        Self::Nose,
        Self::Mouth,
        Self::Eyebrows,
        Self::Eyebags,
        Self::Iris,
        Self::FaceAngle,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Contour => "face contour",
            Feature::Body => "body",
            Feature::Eyes => "eyes",
            Feature::Nose => "nose",
            Feature::Mouth => "mouth",
            Feature::Eyebrows => "eyebrows",
            Feature::Eyebags => "eyebags",
            Feature::Iris => "iris",
            Feature::Hair => "hair",
            Feature::FaceAngle => "face angle",
        })
    }
}

/// Result of the analysis of a single feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// Analysis has not finished yet.
    Pending,
    Ready(T),
    /// Analysis was attempted and failed for the given reason.
    Failed(String),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> Slot<T> {
    /// Converts the outcome of a stage into a slot, logging failures.
    fn settled(feature: Feature, result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) => {
                let reason = format!("{e:#}");
                log::warn!("{feature} analysis failed: {reason}");
                Self::Failed(reason)
            }
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Slot::Pending => Status::Pending,
            Slot::Ready(_) => Status::Ready,
            Slot::Failed(_) => Status::Failed,
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }

    fn fail_if_pending(&mut self, reason: &str) {
        if let Slot::Pending = self {
            *self = Slot::Failed(reason.to_string());
        }
    }
}

/// Value-less summary of a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Ready,
    Failed,
}

/// Everything known about one detected person.
///
/// All coordinates are in the coordinate system of the segmented capture the person was found in.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    bbox: BoundingBox,
    segmented: Arc<Image>,
    crop: Option<Arc<Crop>>,
    processed: bool,

    contour: Slot<Contour>,
    body: Slot<Contour>,
    eyes: Slot<Paired<Contour>>,
    nose: Slot<Contour>,
    mouth: Slot<Contour>,
    eyebrows: Slot<Paired<Contour>>,
    eyebags: Slot<Paired<Contour>>,
    iris: Slot<Paired<Contour>>,
    hair: Slot<Contour>,
    face_angle: Slot<FaceAngle>,
}

impl FaceRecord {
    fn new(bbox: BoundingBox, segmented: Arc<Image>, crop: Option<Arc<Crop>>) -> Self {
        Self {
            bbox,
            segmented,
            crop,
            processed: false,
            contour: Slot::Pending,
            body: Slot::Pending,
            eyes: Slot::Pending,
            nose: Slot::Pending,
            mouth: Slot::Pending,
            eyebrows: Slot::Pending,
            eyebags: Slot::Pending,
            iris: Slot::Pending,
            hair: Slot::Pending,
            face_angle: Slot::Pending,
        }
    }

    /// Starts analyzing the person at `bbox`.
    ///
    /// `segmented` is the capture with the background removed, and `mask` its person mask. Both
    /// may be shared with the records of other persons in the same capture.
    ///
    /// If the person cannot be cropped out of `segmented` (for example because `bbox` has no
    /// area), no analysis is started, and the returned [`PendingRecord`] resolves to a record with
    /// every feature failed.
    pub fn launch(
        segmented: Arc<Image>,
        mask: Arc<Mask>,
        bbox: BoundingBox,
        services: Arc<Services>,
        config: Arc<Config>,
    ) -> PendingRecord {
        log::debug!("{bbox:?}: extracting");
        let crop = match region::crop(&segmented, &bbox) {
            Ok(crop) => Arc::new(crop),
            Err(e) => {
                log::error!("{bbox:?}: extraction failed: {e:#}");
                let mut record = FaceRecord::new(bbox, segmented, None);
                record.finish(&format!("extraction failed: {e:#}"));
                return PendingRecord {
                    state: State::Done(record),
                };
            }
        };

        log::debug!("{bbox:?}: analyzing");
        let landmarks = {
            let crop = crop.clone();
            spawn_stage("landmarks", move || {
                let detector = services.landmarks()?;
                let mut faces = detector.estimate(crop.image())?;
                ensure!(!faces.is_empty(), "no face found");
                if faces.len() > 1 {
                    log::debug!("{} faces found, using the first one", faces.len());
                }
                let face = faces.swap_remove(0);
                ensure!(!face.is_empty(), "face has no landmarks");
                Ok(FaceParts::from_keypoints(&face))
            })
        };
        let body = {
            let mask = mask.clone();
            spawn_stage("body", move || {
                let boundary = extract_boundary(&mask, bbox.round());
                ensure!(!boundary.is_empty(), "no person in segmentation mask");
                Ok(boundary)
            })
        };

        PendingRecord {
            state: State::Analyzing(Box::new(Analysis {
                record: FaceRecord::new(bbox, segmented, Some(crop.clone())),
                crop,
                mask,
                config,
                landmarks,
                body,
            })),
        }
    }

    /// Marks every slot that is still pending as failed and the record as processed.
    fn finish(&mut self, reason: &str) {
        self.contour.fail_if_pending(reason);
        self.body.fail_if_pending(reason);
        self.eyes.fail_if_pending(reason);
        self.nose.fail_if_pending(reason);
        self.mouth.fail_if_pending(reason);
        self.eyebrows.fail_if_pending(reason);
        self.eyebags.fail_if_pending(reason);
        self.iris.fail_if_pending(reason);
        self.hair.fail_if_pending(reason);
        self.face_angle.fail_if_pending(reason);
        self.processed = true;
        log::debug!("{:?}: processed", self.bbox);
    }

    fn read<'a, T>(&'a self, feature: Feature, slot: &'a Slot<T>) -> Result<&'a T> {
        if !self.processed {
            return Err(Error::NotProcessed);
        }
        match slot {
            Slot::Ready(value) => Ok(value),
            Slot::Failed(reason) => Err(Error::Unavailable {
                feature,
                reason: reason.clone(),
            }),
            Slot::Pending => Err(Error::NotProcessed),
        }
    }

    /// Returns whether analysis of this record has finished.
    ///
    /// Once this returns `true`, every feature is either available or failed, and the record
    /// does not change anymore.
    #[inline]
    pub fn has_processed(&self) -> bool {
        self.processed
    }

    /// Returns the bounding box of the person, as reported by the object detector.
    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Returns the segmented capture this record was derived from.
    #[inline]
    pub fn segmented(&self) -> &Image {
        &self.segmented
    }

    /// Returns the crop of the person, or `None` if it could not be extracted.
    pub fn cropped(&self) -> Option<&Crop> {
        self.crop.as_deref()
    }

    /// Returns the state of the slot holding `feature`.
    pub fn status(&self, feature: Feature) -> Status {
        match feature {
            Feature::Contour => self.contour.status(),
            Feature::Body => self.body.status(),
            Feature::Eyes => self.eyes.status(),
            Feature::Nose => self.nose.status(),
            Feature::Mouth => self.mouth.status(),
            Feature::Eyebrows => self.eyebrows.status(),
            Feature::Eyebags => self.eyebags.status(),
            Feature::Iris => self.iris.status(),
            Feature::Hair => self.hair.status(),
            Feature::FaceAngle => self.face_angle.status(),
        }
    }

    /// The outline of the face, snapped onto the body outline where they are close.
    pub fn contour(&self) -> Result<&Contour> {
        self.read(Feature::Contour, &self.contour)
    }

    /// The outline of the person's segmentation mask within the bounding box.
    pub fn body(&self) -> Result<&Contour> {
        self.read(Feature::Body, &self.body)
    }

    pub fn eyes(&self) -> Result<&Paired<Contour>> {
        self.read(Feature::Eyes, &self.eyes)
    }

    pub fn nose(&self) -> Result<&Contour> {
        self.read(Feature::Nose, &self.nose)
    }

    pub fn mouth(&self) -> Result<&Contour> {
        self.read(Feature::Mouth, &self.mouth)
    }

    pub fn eyebrows(&self) -> Result<&Paired<Contour>> {
        self.read(Feature::Eyebrows, &self.eyebrows)
    }

    /// The polylines along the folds below the eyes.
    pub fn eyebags(&self) -> Result<&Paired<Contour>> {
        self.read(Feature::Eyebags, &self.eyebags)
    }

    /// The refined iris outlines. A side whose iris was not found is empty.
    pub fn iris(&self) -> Result<&Paired<Contour>> {
        self.read(Feature::Iris, &self.iris)
    }

    /// The outline of the person's hair (the part of the person above the chin, outside of the
    /// face contour).
    pub fn hair(&self) -> Result<&Contour> {
        self.read(Feature::Hair, &self.hair)
    }

    pub fn face_angle(&self) -> Result<FaceAngle> {
        self.read(Feature::FaceAngle, &self.face_angle).copied()
    }

    /// Returns whether `point` lies on or inside the face contour.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] if a coordinate of `point` is not finite, even before
    /// the record is processed. Otherwise fails like [`FaceRecord::contour`].
    pub fn is_face_touched(&self, point: [f32; 2]) -> Result<bool> {
        if !point.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "touch point {point:?} is not finite"
            )));
        }
        self.contour()?.contains(point)
    }
}

/// A [`FaceRecord`] whose analysis is still running.
///
/// Dropping a [`PendingRecord`] abandons its analysis without waiting for it.
pub struct PendingRecord {
    state: State,
}

enum State {
    Done(FaceRecord),
    Analyzing(Box<Analysis>),
}

struct Analysis {
    record: FaceRecord,
    crop: Arc<Crop>,
    mask: Arc<Mask>,
    config: Arc<Config>,
    landmarks: Stage<FaceParts>,
    body: Stage<Contour>,
}

impl PendingRecord {
    /// Returns whether all analysis stages have settled, ie. whether [`PendingRecord::wait`] will
    /// return without waiting for them.
    pub fn has_settled(&self) -> bool {
        match &self.state {
            State::Done(_) => true,
            State::Analyzing(a) => a.landmarks.is_settled() && a.body.is_settled(),
        }
    }

    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        match &self.state {
            State::Done(record) => record.bbox,
            State::Analyzing(a) => a.record.bbox,
        }
    }

    /// Waits for all analysis stages to settle, then refines their results.
    ///
    /// The returned record is always processed.
    pub fn wait(self) -> FaceRecord {
        match self.state {
            State::Done(record) => record,
            State::Analyzing(analysis) => analysis.refine(),
        }
    }
}

impl fmt::Debug for PendingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRecord")
            .field("bbox", &self.bbox())
            .field("settled", &self.has_settled())
            .finish()
    }
}

impl Analysis {
    fn refine(self) -> FaceRecord {
        let Analysis {
            mut record,
            crop,
            mask,
            config,
            landmarks,
            body,
        } = self;

        // Settle all stages before touching any of their results.
        let landmarks = landmarks.settle();
        let body = body.settle();

        let bbox = record.bbox;
        log::debug!("{bbox:?}: refining");
        record.body = Slot::settled(Feature::Body, body);

        match landmarks {
            Ok(local) => {
                let global = local.translated(crop.offset());

                let contour = match &record.body {
                    Slot::Ready(body) => {
                        config
                            .get_gradient()
                            .refine(&global.contour, body, &record.segmented)
                    }
                    _ => global.contour,
                };
                record.contour = Slot::settled(Feature::Contour, non_empty(contour));
                record.eyes = Slot::settled(Feature::Eyes, paired_non_empty(global.eyes));
                record.nose = Slot::settled(Feature::Nose, non_empty(global.nose));
                record.mouth = Slot::settled(Feature::Mouth, non_empty(global.mouth));
                record.eyebrows =
                    Slot::settled(Feature::Eyebrows, paired_non_empty(global.eyebrows));

                record.iris =
                    Slot::settled(Feature::Iris, config.get_iris().refine(&local.iris, &crop));
                record.eyebags = Slot::settled(
                    Feature::Eyebags,
                    config.get_eyebags().detect(&local.eyes, &crop),
                );
                record.face_angle = Slot::settled(Feature::FaceAngle, estimate_angle(&global.all));
            }
            Err(e) => {
                let reason = format!("landmark detection failed: {e:#}");
                log::warn!("{bbox:?}: {reason}");
                for feature in Feature::FROM_LANDMARKS {
                    record.fail(feature, &reason);
                }
            }
        }

        let hair = match (&record.body, &record.contour) {
            (Slot::Ready(_), Slot::Ready(face)) => {
                let hair = hair_region(&mask, bbox.round(), face);
                if hair.is_empty() {
                    Err(anyhow!("no hair region above the face"))
                } else {
                    Ok(hair)
                }
            }
            _ => Err(anyhow!("requires both the body and the face contour")),
        };
        record.hair = Slot::settled(Feature::Hair, hair);

        record.finish("not analyzed");
        record
    }
}

impl FaceRecord {
    fn fail(&mut self, feature: Feature, reason: &str) {
        let reason = reason.to_string();
        match feature {
            Feature::Contour => self.contour = Slot::Failed(reason),
            Feature::Body => self.body = Slot::Failed(reason),
            Feature::Eyes => self.eyes = Slot::Failed(reason),
            Feature::Nose => self.nose = Slot::Failed(reason),
            Feature::Mouth => self.mouth = Slot::Failed(reason),
            Feature::Eyebrows => self.eyebrows = Slot::Failed(reason),
            Feature::Eyebags => self.eyebags = Slot::Failed(reason),
            Feature::Iris => self.iris = Slot::Failed(reason),
            Feature::Hair => self.hair = Slot::Failed(reason),
            Feature::FaceAngle => self.face_angle = Slot::Failed(reason),
        }
    }
}

fn non_empty(contour: Contour) -> anyhow::Result<Contour> {
    ensure!(!contour.is_empty(), "no landmarks");
    Ok(contour)
}

fn paired_non_empty(pair: Paired<Contour>) -> anyhow::Result<Paired<Contour>> {
    ensure!(
        !pair.left.is_empty() || !pair.right.is_empty(),
        "no landmarks for either side"
    );
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn launch(bbox: BoundingBox, services: Services) -> PendingRecord {
        let scene = test::portrait();
        FaceRecord::launch(
            Arc::new(scene.image.clone()),
            Arc::new(scene.mask.clone()),
            bbox,
            Arc::new(services),
            Arc::new(Config::new()),
        )
    }

    #[test]
    fn unprocessed_record_raises() {
        let record = FaceRecord::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            Arc::new(Image::new(10, 10)),
            None,
        );
        assert!(!record.has_processed());
        assert_eq!(record.contour(), Err(Error::NotProcessed));
        assert_eq!(record.iris(), Err(Error::NotProcessed));
        assert_eq!(record.face_angle(), Err(Error::NotProcessed));
        assert_eq!(record.is_face_touched([1.0, 1.0]), Err(Error::NotProcessed));
        assert!(matches!(
            record.is_face_touched([f32::NAN, 1.0]),
            Err(Error::InvalidArgument(_))
        ));
        for feature in Feature::ALL {
            assert_eq!(record.status(feature), Status::Pending);
        }
    }

    #[test]
    fn degenerate_bbox_fails_everything() {
        let pending = launch(BoundingBox::new(10.0, 10.0, 0.0, 20.0), test::services());
        assert!(pending.has_settled());
        let record = pending.wait();
        assert!(record.has_processed());
        assert!(record.cropped().is_none());
        for feature in Feature::ALL {
            assert_eq!(record.status(feature), Status::Failed, "{feature}");
        }
        match record.body() {
            Err(Error::Unavailable { feature, reason }) => {
                assert_eq!(feature, Feature::Body);
                assert!(reason.starts_with("extraction failed"), "{reason}");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn full_analysis() {
        let record = launch(test::PERSON_BBOX, test::services()).wait();
        assert!(record.has_processed());
        for feature in Feature::ALL {
            assert_eq!(record.status(feature), Status::Ready, "{feature}");
        }

        // Landmarks are reported relative to the crop and stored relative to the capture.
        let [ox, oy] = [test::PERSON_BBOX.x(), test::PERSON_BBOX.y()];
        let nose = record.nose().unwrap();
        let [cx, cy] = test::FACE_CENTER;
        assert_eq!(nose[0].xy(), [ox + cx, oy + cy]);

        assert!(record.is_face_touched([ox + cx, oy + cy]).unwrap());
        assert!(!record.is_face_touched([0.0, 0.0]).unwrap());
        assert!(matches!(
            record.is_face_touched([f32::NAN, 0.0]),
            Err(Error::InvalidArgument(_))
        ));

        for p in record.body().unwrap().iter() {
            assert!(test::PERSON_BBOX.contains_point(p.xy()), "{p:?}");
        }
        let crop = record.cropped().unwrap();
        assert_eq!(crop.origin(), [ox as i32, oy as i32]);
    }

    #[test]
    fn zero_faces_fail_landmark_features() {
        let record = launch(test::PERSON_BBOX, test::services_without_faces()).wait();
        assert!(record.has_processed());
        for feature in [
            Feature::Contour,
            Feature::Eyes,
            Feature::Nose,
            Feature::Mouth,
            Feature::Eyebrows,
        ] {
            assert_eq!(record.status(feature), Status::Failed, "{feature}");
        }
        assert_eq!(record.status(Feature::Body), Status::Ready);
        // Hair needs the face contour.
        assert_eq!(record.status(Feature::Hair), Status::Failed);
        match record.eyes() {
            Err(Error::Unavailable { reason, .. }) => {
                assert_eq!(reason, "landmark detection failed: no face found")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn empty_mask_fails_body_only() {
        let scene = test::portrait();
        let record = FaceRecord::launch(
            Arc::new(scene.image.clone()),
            Arc::new(Mask::new(test::WIDTH, test::HEIGHT)),
            test::PERSON_BBOX,
            Arc::new(test::services()),
            Arc::new(Config::new()),
        )
        .wait();
        assert_eq!(record.status(Feature::Body), Status::Failed);
        assert_eq!(record.status(Feature::Hair), Status::Failed);
        // Without a body outline, the contour is used as-is.
        assert_eq!(record.status(Feature::Contour), Status::Ready);
        assert_eq!(record.status(Feature::Iris), Status::Ready);
    }
}
