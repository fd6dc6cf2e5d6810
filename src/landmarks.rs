//! Landmark data model: per-face landmark sets, anchor indices and the
//! output contract of an external landmark detector.

use crate::constants::{
    FOREHEAD_INDEX, LEFT_EAR_INDEX, LEFT_EYE_OUTER_INDEX, NOSE_BRIDGE_INDEX, RIGHT_EAR_INDEX,
    RIGHT_EYE_OUTER_INDEX,
};
use crate::coordinate_mapper::Dimensions;
use crate::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single tracked facial point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A landmark is usable only when all three coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Placeholder for indices a detector did not report
    pub fn missing() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
        }
    }
}

impl From<[f64; 3]> for Landmark {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Coordinate convention of a landmark set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSpace {
    /// x, y in [0, 1] of the source frame; z relative, on the same scale as x
    #[default]
    Normalized,
    /// x, y, z already expressed in source-frame pixels
    SourcePixels,
}

/// Ordered landmarks of one detected face in one video frame
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
    space: LandmarkSpace,
}

impl LandmarkSet {
    /// Create a set from a dense, index-ordered list of points
    pub fn new(points: Vec<Landmark>, space: LandmarkSpace) -> Self {
        Self { points, space }
    }

    /// Create a dense set of `len` points where only the given indices are known
    ///
    /// # Errors
    ///
    /// Returns an error if an index is outside `0..len`
    pub fn from_sparse<I>(len: usize, points: I, space: LandmarkSpace) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, Landmark)>,
    {
        let mut dense = vec![Landmark::missing(); len];
        for (index, point) in points {
            let slot = dense.get_mut(index).ok_or_else(|| {
                Error::InvalidInput(format!("Landmark index {index} out of range for set of {len}"))
            })?;
            *slot = point;
        }
        Ok(Self::new(dense, space))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn space(&self) -> LandmarkSpace {
        self.space
    }

    /// Landmark at `index`, or `None` when absent or non-finite
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied().filter(Landmark::is_finite)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.points.iter()
    }

    /// Landmark at `index` expressed in source pixels.
    ///
    /// Normalized depth is scaled by the source width so it shares units
    /// with x.
    pub fn source_px(&self, index: usize, source: Dimensions) -> Option<Vector3<f64>> {
        let lm = self.get(index)?;
        Some(match self.space {
            LandmarkSpace::Normalized => Vector3::new(
                lm.x * source.width,
                lm.y * source.height,
                lm.z * source.width,
            ),
            LandmarkSpace::SourcePixels => Vector3::new(lm.x, lm.y, lm.z),
        })
    }

    /// Spread between the nearest and farthest finite landmark depth
    pub fn z_range(&self) -> f64 {
        let (min, max) = self
            .points
            .iter()
            .filter(|p| p.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));
        if min.is_finite() && max.is_finite() {
            max - min
        } else {
            0.0
        }
    }
}

/// Fixed mapping from anatomical anchors to detector landmark indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorSet {
    pub nose_bridge: usize,
    pub forehead: usize,
    pub left_ear: usize,
    pub right_ear: usize,
    pub left_eye_outer: usize,
    pub right_eye_outer: usize,
}

impl Default for AnchorSet {
    fn default() -> Self {
        Self {
            nose_bridge: NOSE_BRIDGE_INDEX,
            forehead: FOREHEAD_INDEX,
            left_ear: LEFT_EAR_INDEX,
            right_ear: RIGHT_EAR_INDEX,
            left_eye_outer: LEFT_EYE_OUTER_INDEX,
            right_eye_outer: RIGHT_EYE_OUTER_INDEX,
        }
    }
}

impl AnchorSet {
    /// All anchor indices, in a fixed order
    pub fn indices(&self) -> [usize; 6] {
        [
            self.nose_bridge,
            self.forehead,
            self.left_ear,
            self.right_ear,
            self.left_eye_outer,
            self.right_eye_outer,
        ]
    }
}

/// What an external landmark detector reports for one video frame.
///
/// Either contract (landmarks or a head transformation matrix) is enough;
/// richer detectors supply both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectorOutput {
    /// Landmarks of the first detected face
    pub landmarks: Option<LandmarkSet>,
    /// Column-major 4x4 head transformation matrix of the first face
    pub transformation_matrix: Option<[f64; 16]>,
}

impl DetectorOutput {
    pub fn from_landmarks(landmarks: LandmarkSet) -> Self {
        Self {
            landmarks: Some(landmarks),
            transformation_matrix: None,
        }
    }

    pub fn from_matrix(matrix: [f64; 16]) -> Self {
        Self {
            landmarks: None,
            transformation_matrix: Some(matrix),
        }
    }

    /// True when neither contract produced data
    pub fn is_empty(&self) -> bool {
        self.landmarks.as_ref().map_or(true, LandmarkSet::is_empty) && self.transformation_matrix.is_none()
    }
}
