//! Head orientation from 3D face landmarks.

use nalgebra::Vector3;

use crate::landmark::Landmark;

/// Index of the outer corner of the left eye in a 468-point face mesh.
pub const LEFT_EYE: usize = 33;
/// Index of the outer corner of the right eye.
pub const RIGHT_EYE: usize = 263;
pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;

/// Orientation of a face, in degrees.
///
/// The axis conventions are fixed, since downstream effects depend on them:
///
/// - `yaw` is positive when the nose points towards +X (the right of the image).
/// - `pitch` is positive when the nose points towards -Y (up in the image).
/// - `roll` is the angle of the eye-to-eye axis against the image's X axis, positive when the
///   right eye sits lower in the image than the left one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceAngle {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Estimates the orientation of a face from its landmarks.
///
/// `landmarks` are indexed like the face mesh reported by the landmark model ([`LEFT_EYE`],
/// [`RIGHT_EYE`], [`NOSE_TIP`], [`CHIN`]). Landmarks missing from a shorter list are substituted
/// with the centroid of all landmarks.
///
/// Fails if `landmarks` is empty.
pub fn estimate_angle(landmarks: &[Landmark]) -> anyhow::Result<FaceAngle> {
    anyhow::ensure!(
        !landmarks.is_empty(),
        "cannot estimate face angle without landmarks"
    );

    let centroid = landmarks
        .iter()
        .fold(Vector3::zeros(), |acc, lm| acc + Vector3::from(lm.position()))
        / landmarks.len() as f32;
    let get = |index: usize| {
        landmarks
            .get(index)
            .map_or(centroid, |lm| Vector3::from(lm.position()))
    };

    let left_eye = get(LEFT_EYE);
    let right_eye = get(RIGHT_EYE);
    let nose = get(NOSE_TIP);
    let chin = get(CHIN);

    let eye_mid = (left_eye + right_eye) * 0.5;
    let mut forward = normalize(nose - eye_mid);
    if forward.norm() < 1e-4 {
        forward = normalize(chin - eye_mid);
    }
    let right = normalize(right_eye - left_eye);
    let up = normalize(forward.cross(&right));
    let right = normalize(up.cross(&forward));

    let yaw = forward.x.atan2(forward.z);
    let pitch = (-forward.y).clamp(-1.0, 1.0).asin();
    let roll = right.y.atan2(right.x);

    Ok(FaceAngle {
        roll: roll.to_degrees(),
        pitch: pitch.to_degrees(),
        yaw: yaw.to_degrees(),
    })
}

/// Normalizes `v`, leaving the zero vector at zero.
fn normalize(v: Vector3<f32>) -> Vector3<f32> {
    let mut norm = v.norm();
    if norm == 0.0 || norm.is_nan() {
        norm = 1e-9;
    }
    v / norm
}
