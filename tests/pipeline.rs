use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use purimark::{
    boundary::Mask,
    config::Config,
    detection::Pipeline,
    image::{Color, Image},
    landmark::Keypoint,
    record::{Feature, Status},
    rect::{BoundingBox, PixelRect},
    services::{
        Detection, LandmarkDetector, ObjectDetector, PersonSegmenter, Segmentation, Services,
    },
    Error,
};
use rayon::prelude::*;

/// Two persons side by side on a 200x100 capture.
fn capture() -> Segmentation {
    let mut foreground = Image::new(200, 100);
    let mut mask = Mask::new(200, 100);
    for person in [PixelRect::new(20, 10, 60, 90), PixelRect::new(120, 10, 60, 90)] {
        foreground.fill_rect(person, Color::from_rgb8(200, 170, 150));
        mask.fill_rect(person, true);
    }
    Segmentation { foreground, mask }
}

struct Segmenter;

impl PersonSegmenter for Segmenter {
    fn segment(&self, image: &Image) -> anyhow::Result<Segmentation> {
        let capture = capture();
        anyhow::ensure!(
            image.width() == capture.foreground.width(),
            "unexpected capture size"
        );
        Ok(capture)
    }
}

struct Detector;

impl ObjectDetector for Detector {
    fn detect(&self, _: &Image) -> anyhow::Result<Vec<Detection>> {
        Ok(vec![
            Detection::new("person", 0.6, BoundingBox::new(15.0, 5.0, 70.0, 95.0)),
            Detection::new("person", 0.4, BoundingBox::new(115.0, 5.0, 70.0, 95.0)),
        ])
    }
}

/// Reports a square "face" in the middle of every crop.
struct Landmarks;

impl LandmarkDetector for Landmarks {
    fn estimate(&self, image: &Image) -> anyhow::Result<Vec<Vec<Keypoint>>> {
        let (cx, cy) = (image.width() as f32 / 2.0, 30.0);
        let mut face = Vec::new();
        for [dx, dy] in [[-15.0, -15.0], [15.0, -15.0], [15.0, 15.0], [-15.0, 15.0]] {
            face.push(Keypoint::new("faceOval", [cx + dx, cy + dy, 0.0]));
        }
        for [dx, dy] in [[-8.0, -5.0], [-4.0, -5.0], [-6.0, -7.0], [-6.0, -3.0]] {
            face.push(Keypoint::new("rightEyeUpper0", [cx + dx, cy + dy, 0.0]));
            face.push(Keypoint::new("rightIris", [cx + dx / 2.0, cy + dy, 0.0]));
        }
        face.push(Keypoint::new("noseTip", [cx, cy, -2.0]));
        face.push(Keypoint::new("lipsUpperOuter", [cx, cy + 8.0, 0.0]));
        face.push(Keypoint::new("leftEyebrowUpper", [cx + 6.0, cy - 10.0, 0.0]));
        Ok(vec![face])
    }
}

struct Faceless;

impl LandmarkDetector for Faceless {
    fn estimate(&self, _: &Image) -> anyhow::Result<Vec<Vec<Keypoint>>> {
        Ok(Vec::new())
    }
}

fn pipeline(landmarks: Arc<dyn LandmarkDetector>) -> Pipeline {
    let services = Services::from_instances(Arc::new(Segmenter), Arc::new(Detector), landmarks);
    Pipeline::new(services, Config::new()).unwrap()
}

#[test]
fn only_confident_persons_are_analyzed() {
    let records = pipeline(Arc::new(Landmarks))
        .detect(&Image::new(200, 100))
        .unwrap();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert!(record.has_processed());
    assert_eq!(record.bbox(), BoundingBox::new(15.0, 5.0, 70.0, 95.0));
    assert_eq!(record.cropped().unwrap().origin(), [15, 5]);

    // The crop is 70 px wide, so the nose sits at x = 15 + 35.
    let nose = record.nose().unwrap();
    assert_eq!(nose[0].xy(), [50.0, 35.0]);
    assert!(record.is_face_touched([50.0, 35.0]).unwrap());

    let eyes = record.eyes().unwrap();
    assert!(eyes.left.is_empty());
    assert_eq!(eyes.right.len(), 4);

    assert_eq!(record.status(Feature::Body), Status::Ready);
    assert_eq!(record.status(Feature::Iris), Status::Ready);
    assert!(record.face_angle().unwrap().roll.is_finite());
}

#[test]
fn zero_faces_still_processes_the_record() {
    let records = pipeline(Arc::new(Faceless))
        .detect(&Image::new(200, 100))
        .unwrap();
    assert_eq!(records.len(), 1);

    let record = &records[0];
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
    assert!(matches!(
        record.mouth(),
        Err(Error::Unavailable {
            feature: Feature::Mouth,
            ..
        })
    ));
    assert!(record.body().is_ok());
}

#[test]
fn degenerate_boxes_fail_every_feature() {
    struct Degenerate;
    impl ObjectDetector for Degenerate {
        fn detect(&self, _: &Image) -> anyhow::Result<Vec<Detection>> {
            Ok(vec![
                Detection::new("person", 0.9, BoundingBox::new(10.0, 10.0, 0.0, 30.0)),
                Detection::new("person", 0.8, BoundingBox::new(10.0, 10.0, 30.0, -5.0)),
                Detection::new("person", 0.7, BoundingBox::new(500.0, 10.0, 30.0, 30.0)),
            ])
        }
    }
    let services = Services::from_instances(
        Arc::new(Segmenter),
        Arc::new(Degenerate),
        Arc::new(Landmarks),
    );
    let pipeline = Pipeline::new(services, Config::new()).unwrap();

    let records = pipeline.detect_segmented(capture()).unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert!(record.has_processed());
        assert!(record.cropped().is_none());
        for feature in Feature::ALL {
            assert_eq!(record.status(feature), Status::Failed, "{feature}");
        }
        assert!(record.contour().is_err());
    }
}

#[test]
fn models_load_once_across_concurrent_captures() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let services = Services::new(
        || Ok(Arc::new(Segmenter) as Arc<dyn PersonSegmenter>),
        || Ok(Arc::new(Detector) as Arc<dyn ObjectDetector>),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Landmarks) as Arc<dyn LandmarkDetector>)
        },
    );
    assert!(!services.is_loaded());
    let pipeline = Pipeline::new(services, Config::new()).unwrap();

    let counts = (0..16)
        .into_par_iter()
        .map(|_| pipeline.detect(&Image::new(200, 100)).unwrap().len())
        .collect::<Vec<_>>();
    assert!(counts.iter().all(|&n| n == 1));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(pipeline.services().is_loaded());
}

#[test]
fn background_capture() {
    purimark::init_logger!();

    let capture = pipeline(Arc::new(Landmarks)).capture(Image::new(200, 100));
    let records = capture.wait().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].has_processed());

    // A capture of the wrong size fails in the segmenter.
    let err = pipeline(Arc::new(Landmarks))
        .capture(Image::new(1, 1))
        .wait()
        .unwrap_err();
    assert!(err.to_string().contains("segmentation"), "{err:#}");
}
