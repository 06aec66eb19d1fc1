//! Interfaces to the machine learning models the pipeline relies on.
//!
//! `purimark` does not run any neural networks itself. Person segmentation, object detection and
//! facial landmark estimation are provided by implementations of [`PersonSegmenter`],
//! [`ObjectDetector`] and [`LandmarkDetector`], which are bundled into a [`Services`] handle and
//! passed to the [`Pipeline`].
//!
//! Models are usually expensive to load, so [`Services`] loads each of them lazily, on first use,
//! and then shares the loaded instance between all concurrent detections.
//!
//! [`Pipeline`]: crate::detection::Pipeline

use std::{fmt, sync::Arc};

use anyhow::Context;
use once_cell::sync::OnceCell;

use crate::{boundary::Mask, image::Image, landmark::Keypoint, rect::BoundingBox};

/// Output of a [`PersonSegmenter`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// The input image with everything but the detected persons removed (made transparent).
    pub foreground: Image,
    /// Which pixels of `foreground` belong to a person.
    pub mask: Mask,
}

/// Separates persons from the background.
pub trait PersonSegmenter: Send + Sync {
    /// Segments `image`.
    ///
    /// When there is nobody in the image, implementations should return an empty (fully
    /// transparent) foreground and mask rather than an error.
    fn segment(&self, image: &Image) -> anyhow::Result<Segmentation>;
}

/// An object found by an [`ObjectDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Locates and classifies objects in an image.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &Image) -> anyhow::Result<Vec<Detection>>;
}

/// Estimates facial landmarks.
pub trait LandmarkDetector: Send + Sync {
    /// Returns the named keypoints of every face found in `image`, in `image`'s coordinate system.
    ///
    /// Keypoint names are matched by prefix to sort them into facial features (see
    /// [`FaceRegion`]). An empty list means no face was found.
    ///
    /// [`FaceRegion`]: crate::landmark::FaceRegion
    fn estimate(&self, image: &Image) -> anyhow::Result<Vec<Vec<Keypoint>>>;
}

type Loader<T> = Box<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// A lazily loaded, shared model instance.
///
/// The loader runs at most once at a time: threads that call [`ModelCell::get`] while the model
/// is being loaded wait for the load to finish and then share its result. If loading fails, the
/// error is returned to every waiting caller and the next call tries again.
pub struct ModelCell<T: ?Sized> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
    loader: Loader<T>,
}

impl<T: ?Sized> ModelCell<T> {
    /// Creates a [`ModelCell`] that will call `loader` on first use.
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Creates a [`ModelCell`] holding an already loaded model.
    ///
    /// After [`ModelCell::unload`], the same instance will be handed out again.
    pub fn preloaded(name: &'static str, model: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let reload = model.clone();
        Self {
            name,
            cell: OnceCell::with_value(model),
            loader: Box::new(move || Ok(reload.clone())),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the model, loading it if necessary.
    pub fn get(&self) -> anyhow::Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                log::debug!("loading {} model", self.name);
                (self.loader)().with_context(|| format!("failed to load {} model", self.name))
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Drops the cell's reference to the loaded model, if any.
    ///
    /// Users of the model that are still running keep it alive until they finish. The next call
    /// to [`ModelCell::get`] loads it again.
    pub fn unload(&mut self) -> bool {
        let unloaded = self.cell.take().is_some();
        if unloaded {
            log::debug!("unloaded {} model", self.name);
        }
        unloaded
    }
}

impl<T: ?Sized> fmt::Debug for ModelCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCell")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// The set of models used by the [`Pipeline`].
///
/// [`Pipeline`]: crate::detection::Pipeline
#[derive(Debug)]
pub struct Services {
    segmenter: ModelCell<dyn PersonSegmenter>,
    detector: ModelCell<dyn ObjectDetector>,
    landmarks: ModelCell<dyn LandmarkDetector>,
}

impl Services {
    /// Creates a [`Services`] handle whose models are created by the given loaders on first use.
    pub fn new<S, D, L>(segmenter: S, detector: D, landmarks: L) -> Self
    where
        S: Fn() -> anyhow::Result<Arc<dyn PersonSegmenter>> + Send + Sync + 'static,
        D: Fn() -> anyhow::Result<Arc<dyn ObjectDetector>> + Send + Sync + 'static,
        L: Fn() -> anyhow::Result<Arc<dyn LandmarkDetector>> + Send + Sync + 'static,
    {
        Self {
            segmenter: ModelCell::new("person segmentation", segmenter),
            detector: ModelCell::new("object detection", detector),
            landmarks: ModelCell::new("face landmark", landmarks),
        }
    }

    /// Creates a [`Services`] handle from already loaded models.
    pub fn from_instances(
        segmenter: Arc<dyn PersonSegmenter>,
        detector: Arc<dyn ObjectDetector>,
        landmarks: Arc<dyn LandmarkDetector>,
    ) -> Self {
        Self {
            segmenter: ModelCell::preloaded("person segmentation", segmenter),
            detector: ModelCell::preloaded("object detection", detector),
            landmarks: ModelCell::preloaded("face landmark", landmarks),
        }
    }

    pub fn segmenter(&self) -> anyhow::Result<Arc<dyn PersonSegmenter>> {
        self.segmenter.get()
    }

    pub fn detector(&self) -> anyhow::Result<Arc<dyn ObjectDetector>> {
        self.detector.get()
    }

    pub fn landmarks(&self) -> anyhow::Result<Arc<dyn LandmarkDetector>> {
        self.landmarks.get()
    }

    /// Returns whether all models are currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.segmenter.is_loaded() && self.detector.is_loaded() && self.landmarks.is_loaded()
    }

    /// Unloads all models. They will be loaded again when next used.
    pub fn unload(&mut self) {
        self.segmenter.unload();
        self.detector.unload();
        self.landmarks.unload();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rayon::prelude::*;

    use super::*;

    struct Nobody;

    impl ObjectDetector for Nobody {
        fn detect(&self, _: &Image) -> anyhow::Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn nobody() -> anyhow::Result<Arc<dyn ObjectDetector>> {
        Ok(Arc::new(Nobody))
    }

    #[test]
    fn loads_once_under_contention() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let cell = ModelCell::<dyn ObjectDetector>::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            nobody()
        });

        (0..64).into_par_iter().for_each(|_| {
            let detector = cell.get().unwrap();
            assert!(detector.detect(&Image::new(1, 1)).unwrap().is_empty());
        });
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut cell = ModelCell::<dyn ObjectDetector>::new("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model file missing");
            }
            nobody()
        });

        let err = cell.get().err().unwrap();
        assert_eq!(format!("{err:#}"), "failed to load flaky model: model file missing");
        assert!(!cell.is_loaded());

        cell.get().unwrap();
        assert!(cell.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        assert!(cell.unload());
        assert!(!cell.unload());
        cell.get().unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn preloaded_survives_unload() {
        let detector: Arc<dyn ObjectDetector> = Arc::new(Nobody);
        let mut cell = ModelCell::preloaded("detector", detector.clone());
        assert!(cell.is_loaded());
        cell.unload();
        assert!(Arc::ptr_eq(&cell.get().unwrap(), &detector));
    }
}
