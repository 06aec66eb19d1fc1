//! Landmarks and their grouping into facial features.
//!
//! The landmark collaborator returns a flat list of named [`Keypoint`]s per face. The anatomical
//! feature a keypoint belongs to is encoded as a prefix of its name (`faceOval`, `leftEye`,
//! `lips`, ...); [`FaceParts::from_keypoints`] sorts them into [`Contour`]s.

use std::fmt;

use crate::contour::{Contour, Paired};

type Position = [f32; 3];

/// A landmark in 3D space.
///
/// X and Y are pixel coordinates, Z is the relative depth reported by the landmark model (`0.0`
/// if the model does not report depth).
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy, Default)]
pub struct Landmark {
    pos: Position,
}

impl Landmark {
    #[inline]
    pub fn new(position: Position) -> Self {
        Self { pos: position }
    }

    /// Creates a landmark at `(x, y)` with a depth of 0.
    #[inline]
    pub fn from_xy(x: f32, y: f32) -> Self {
        Self::new([x, y, 0.0])
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn xy(&self) -> [f32; 2] {
        [self.pos[0], self.pos[1]]
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Returns a copy of this landmark with X and Y moved by `[dx, dy]`. Z is left untouched.
    #[must_use]
    #[inline]
    pub fn translate(&self, [dx, dy]: [f32; 2]) -> Self {
        Self::new([self.pos[0] + dx, self.pos[1] + dy, self.pos[2]])
    }

    /// Returns a copy of this landmark with its depth replaced by `z`.
    #[must_use]
    #[inline]
    pub fn with_z(&self, z: f32) -> Self {
        Self::new([self.pos[0], self.pos[1], z])
    }

    /// Returns the squared 2D distance between `self` and `other`, ignoring depth.
    #[inline]
    pub fn distance_sq_2d(&self, other: &Landmark) -> f32 {
        let dx = self.pos[0] - other.pos[0];
        let dy = self.pos[1] - other.pos[1];
        dx * dx + dy * dy
    }
}

impl From<[f32; 2]> for Landmark {
    #[inline]
    fn from([x, y]: [f32; 2]) -> Self {
        Self::from_xy(x, y)
    }
}

impl From<[f32; 3]> for Landmark {
    #[inline]
    fn from(pos: [f32; 3]) -> Self {
        Self::new(pos)
    }
}

/// A landmark as reported by the landmark collaborator, optionally tagged with the name of the
/// anatomical feature it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub name: Option<String>,
    pub landmark: Landmark,
}

impl Keypoint {
    pub fn new<N: Into<String>>(name: N, landmark: impl Into<Landmark>) -> Self {
        Self {
            name: Some(name.into()),
            landmark: landmark.into(),
        }
    }

    /// Creates a keypoint that does not belong to any named feature.
    pub fn unnamed(landmark: impl Into<Landmark>) -> Self {
        Self {
            name: None,
            landmark: landmark.into(),
        }
    }
}

/// The anatomical regions distinguished by keypoint name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceRegion {
    FaceOval,
    LeftEye,
    RightEye,
    LeftEyebrow,
    RightEyebrow,
    Nose,
    Lips,
    LeftIris,
    RightIris,
}

impl FaceRegion {
    pub const ALL: [Self; 9] = [
        Self::FaceOval,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEyebrow,
        Self::RightEyebrow,
        Self::Nose,
        Self::Lips,
        Self::LeftIris,
        Self::RightIris,
    ];

    /// Returns the keypoint name prefix identifying this region.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::FaceOval => "faceOval",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEyebrow => "leftEyebrow",
            Self::RightEyebrow => "rightEyebrow",
            Self::Nose => "nose",
            Self::Lips => "lips",
            Self::LeftIris => "leftIris",
            Self::RightIris => "rightIris",
        }
    }

    /// Returns whether a keypoint called `name` belongs to this region.
    ///
    /// `leftEyebrow...` shares its prefix with `leftEye`, but only belongs to the eyebrow.
    pub fn matches(self, name: &str) -> bool {
        if !name.starts_with(self.prefix()) {
            return false;
        }
        match self {
            Self::LeftEye => !name.starts_with(Self::LeftEyebrow.prefix()),
            Self::RightEye => !name.starts_with(Self::RightEyebrow.prefix()),
            _ => true,
        }
    }

    /// Determines the region a keypoint called `name` belongs to.
    pub fn classify(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|region| region.matches(name))
    }
}

impl fmt::Display for FaceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// The keypoints of one face, sorted into anatomical features.
///
/// Each contour keeps the order in which the landmark model reported its keypoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceParts {
    pub contour: Contour,
    pub eyes: Paired<Contour>,
    pub eyebrows: Paired<Contour>,
    pub nose: Contour,
    pub mouth: Contour,
    pub iris: Paired<Contour>,
    /// Every keypoint of the face, named or not, in model order.
    ///
    /// Landmark models address specific points by their index in this list.
    pub all: Contour,
}

impl FaceParts {
    pub fn from_keypoints(keypoints: &[Keypoint]) -> Self {
        let mut parts = Self::default();
        for keypoint in keypoints {
            parts.all.push(keypoint.landmark);

            let Some(region) = keypoint.name.as_deref().and_then(FaceRegion::classify) else {
                continue;
            };
            let target = match region {
                FaceRegion::FaceOval => &mut parts.contour,
                FaceRegion::LeftEye => &mut parts.eyes.left,
                FaceRegion::RightEye => &mut parts.eyes.right,
                FaceRegion::LeftEyebrow => &mut parts.eyebrows.left,
                FaceRegion::RightEyebrow => &mut parts.eyebrows.right,
                FaceRegion::Nose => &mut parts.nose,
                FaceRegion::Lips => &mut parts.mouth,
                FaceRegion::LeftIris => &mut parts.iris.left,
                FaceRegion::RightIris => &mut parts.iris.right,
            };
            target.push(keypoint.landmark);
        }
        parts
    }

    /// Moves every landmark by `offset`, converting from crop to global coordinates.
    #[must_use]
    pub fn translated(&self, offset: [f32; 2]) -> Self {
        Self {
            contour: self.contour.translated(offset),
            eyes: self.eyes.as_ref().map(|c| c.translated(offset)),
            eyebrows: self.eyebrows.as_ref().map(|c| c.translated(offset)),
            nose: self.nose.translated(offset),
            mouth: self.mouth.translated(offset),
            iris: self.iris.as_ref().map(|c| c.translated(offset)),
            all: self.all.translated(offset),
        }
    }
}
