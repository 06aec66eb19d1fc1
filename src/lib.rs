//! Person detection and anatomical contour refinement.
//!
//! `purimark` takes a captured image, finds the people in it, and produces a [`FaceRecord`] per
//! person: face outline, eyes, nose, mouth, eyebrows, eyebags, iris, body silhouette, and hair
//! region, all in the coordinate system of the captured image. The results are meant for
//! downstream compositing (filters, stickers, printing).
//!
//! The machine learning models (person segmentation, object detection, facial landmarks) are not
//! part of this crate. They are plugged in via the traits in [`services`] and lazily loaded on
//! first use. What this crate does is orchestrate them and upgrade their coarse output:
//!
//! - [`region`] crops the per-person working image out of the segmented capture.
//! - [`gradient`] snaps landmark coordinates onto nearby luminance edges.
//! - [`iris`] searches for the iris boundary along radial rays.
//! - [`eyebag`] traces the lower eyelid fold from a vertical gradient profile.
//! - [`angle`] derives roll, pitch, and yaw from 3D landmarks.
//! - [`record`] and [`detection`] run all of this concurrently per person and collect the
//!   results, tolerating failure of any individual stage.
//!
//! # Coordinates
//!
//! All public coordinates are pixel coordinates of the captured image: X points right, Y points
//! *down*. Z is the relative depth reported by the landmark model, or `0.0` if there is none.
//! "Left" and "right" of paired features are from the point of view of the depicted person, not
//! the viewer.
//!
//! # Logging
//!
//! Diagnostics are emitted via the [`log`] crate. Binaries can call [`init_logger!`] to print
//! them to stderr.
//!
//! [`FaceRecord`]: record::FaceRecord

use log::LevelFilter;

pub mod angle;
pub mod boundary;
pub mod config;
pub mod contour;
pub mod detection;
pub mod error;
pub mod eyebag;
pub mod gradient;
pub mod image;
pub mod iris;
pub mod landmark;
pub mod num;
pub mod record;
pub mod rect;
pub mod region;
pub mod services;
pub mod settle;
pub mod timer;


pub use error::Error;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `purimark` will log at *debug* level. Everything else can be configured
/// with the `RUST_LOG` environment variable.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
