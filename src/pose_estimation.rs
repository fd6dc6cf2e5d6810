//! Rigid pose estimation from face landmarks.
//!
//! One detector output in, one target transform (or an explicit reason why
//! there is none) out. Three sources of orientation are supported: an
//! orthonormal basis from ear/forehead/nose anchors, a planar fallback from 2D
//! cues when the detector reports no usable depth, and a head transformation
//! matrix when the detector provides one.

use crate::config::{DepthReferenceConfig, MatrixConfig, PoseConfig, TryOnConfig, YawBoostConfig};
use crate::constants::EPSILON;
use crate::coordinate_mapper::CoordinateMapper;
use crate::landmarks::{AnchorSet, DetectorOutput, LandmarkSet, LandmarkSpace};
use crate::transform::{quaternion_from_basis, EulerYxz, RigidTransform};
use log::{debug, info};
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much of the estimated head rotation the overlay follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMode {
    /// Follow the full rotation
    #[default]
    Full,
    /// Follow yaw, damp and clamp pitch and roll to keep the frame level
    Level,
    /// Follow yaw only
    YawOnly,
}

/// Where a target's orientation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationMethod {
    /// Orthonormal basis from 3D anchors
    Basis,
    /// Roll and yaw from 2D cues, landmark depth was flat
    Planar,
    /// Detector head transformation matrix
    Matrix,
}

/// Target pose for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTarget {
    pub transform: RigidTransform,
    /// Heading of the target orientation, radians
    pub yaw: f64,
    pub method: EstimationMethod,
}

/// Why a frame produced no target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTargetReason {
    NoFace,
    TooFewLandmarks { found: usize, required: usize },
    MissingAnchor(usize),
    DegenerateGeometry,
    ViewportNotReady,
}

impl fmt::Display for NoTargetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFace => write!(f, "no face"),
            Self::TooFewLandmarks { found, required } => {
                write!(f, "too few landmarks ({found} < {required})")
            }
            Self::MissingAnchor(index) => write!(f, "missing anchor landmark {index}"),
            Self::DegenerateGeometry => write!(f, "degenerate anchor geometry"),
            Self::ViewportNotReady => write!(f, "viewport not ready"),
        }
    }
}

/// Result of estimating one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    Target(PoseTarget),
    NoTarget(NoTargetReason),
}

impl Estimate {
    pub fn target(&self) -> Option<&PoseTarget> {
        match self {
            Self::Target(target) => Some(target),
            Self::NoTarget(_) => None,
        }
    }
}

/// Anchor points of one frame, in source pixels and world space
struct Anchors {
    nose_px: Vector3<f64>,
    forehead_px: Vector3<f64>,
    left_ear_px: Vector3<f64>,
    right_ear_px: Vector3<f64>,
    left_eye_px: Vector3<f64>,
    right_eye_px: Vector3<f64>,
    nose: Vector3<f64>,
    forehead: Vector3<f64>,
    left_ear: Vector3<f64>,
    right_ear: Vector3<f64>,
    left_eye: Vector3<f64>,
    right_eye: Vector3<f64>,
}

/// Landmark-driven pose estimator
pub struct PoseEstimator {
    anchors: AnchorSet,
    pose: PoseConfig,
    yaw_boost: YawBoostConfig,
    depth: DepthReferenceConfig,
    depth_reference: Option<f64>,
}

impl PoseEstimator {
    /// Create an estimator from the session configuration
    pub fn new(config: &TryOnConfig) -> Self {
        info!(
            "Initializing PoseEstimator (orientation: {:?}, yaw boost: {})",
            config.pose.orientation_mode, config.yaw_boost.enabled
        );
        Self {
            anchors: config.anchors,
            pose: config.pose.clone(),
            yaw_boost: config.yaw_boost.clone(),
            depth: config.depth_reference.clone(),
            depth_reference: None,
        }
    }

    /// Forget the adaptive depth reference
    pub fn reset(&mut self) {
        self.depth_reference = None;
    }

    /// Current adaptive depth reference, before clamping
    pub fn depth_reference(&self) -> Option<f64> {
        self.depth_reference
    }

    /// Estimate the target pose for one frame.
    ///
    /// `size_factor` is the viewport size factor in `[0, 1]`; `user_adjustment`
    /// is the frame-width preference, non-finite values mean neutral.
    pub fn estimate(
        &mut self,
        output: &DetectorOutput,
        mapper: &CoordinateMapper,
        size_factor: f64,
        user_adjustment: f64,
    ) -> Estimate {
        if !mapper.is_ready() {
            return Estimate::NoTarget(NoTargetReason::ViewportNotReady);
        }
        let adjustment = self.adjustment_ratio(user_adjustment);

        let landmarks = output.landmarks.as_ref().filter(|set| !set.is_empty());
        if let Some(matrix) = &output.transformation_matrix {
            if self.pose.matrix.prefer_matrix || landmarks.is_none() {
                match self.target_from_matrix(matrix, adjustment) {
                    Some(target) => return Estimate::Target(target),
                    None => debug!("Unusable head transformation matrix, falling back to landmarks"),
                }
            }
        }

        let Some(set) = landmarks else {
            return Estimate::NoTarget(NoTargetReason::NoFace);
        };
        if set.len() < self.pose.min_landmarks {
            return Estimate::NoTarget(NoTargetReason::TooFewLandmarks {
                found: set.len(),
                required: self.pose.min_landmarks,
            });
        }

        match self.target_from_landmarks(set, mapper, size_factor, adjustment) {
            Ok(target) => Estimate::Target(target),
            Err(reason) => Estimate::NoTarget(reason),
        }
    }

    /// User frame-width preference relative to its neutral reference
    fn adjustment_ratio(&self, user_adjustment: f64) -> f64 {
        let reference = self.pose.frame_width_reference;
        let value = if user_adjustment.is_finite() {
            user_adjustment
        } else {
            reference
        };
        value / reference
    }

    fn target_from_landmarks(
        &mut self,
        set: &LandmarkSet,
        mapper: &CoordinateMapper,
        size_factor: f64,
        adjustment: f64,
    ) -> Result<PoseTarget, NoTargetReason> {
        let frame = mapper.frame().ok_or(NoTargetReason::ViewportNotReady)?;
        let source_width = frame.source.width;
        let anchors = self.resolve_anchors(set, mapper)?;

        let z_range = match set.space() {
            LandmarkSpace::Normalized => set.z_range(),
            LandmarkSpace::SourcePixels => set.z_range() / source_width,
        };
        let planar = z_range < self.pose.flat_z_threshold;

        let (raw_orientation, method) = if planar {
            (self.planar_orientation(&anchors), EstimationMethod::Planar)
        } else {
            let basis = basis_orientation(&anchors.left_ear, &anchors.right_ear, &anchors.nose, &anchors.forehead)
                .ok_or(NoTargetReason::DegenerateGeometry)?;
            (basis, EstimationMethod::Basis)
        };
        let orientation = self.apply_orientation_mode(&raw_orientation);

        let ear_px = planar_distance(&anchors.left_ear_px, &anchors.right_ear_px);
        let eye_px = planar_distance(&anchors.left_eye_px, &anchors.right_eye_px);
        let mut scale = self.mixed_scale(ear_px, eye_px, source_width) * adjustment;

        let (depth_ratio, next_reference) = self.depth_ratio(
            anchors.nose_px.z / source_width,
            anchors.forehead_px.z / source_width,
        );
        scale /= depth_ratio.powf(self.depth.strength);

        let mut depth_shift = 0.0;
        if self.yaw_boost.enabled {
            let yaw_norm = self.yaw_boost_fraction(&anchors.left_ear, &anchors.right_ear);
            let t = size_factor.clamp(0.0, 1.0);
            let boost_max = self.yaw_boost.scale_boost_small
                + (self.yaw_boost.scale_boost_large - self.yaw_boost.scale_boost_small) * t;
            scale *= 1.0 + boost_max * yaw_norm;
            depth_shift = self.yaw_boost.depth_shift * yaw_norm;
        }

        if !scale.is_finite() || scale < EPSILON {
            return Err(NoTargetReason::DegenerateGeometry);
        }
        let scale = scale.clamp(self.pose.min_scale, self.pose.max_scale);

        let mut position = anchors.nose + orientation * (self.pose.bridge_offset * scale);
        position.z += depth_shift;

        if next_reference.is_some() {
            self.depth_reference = next_reference;
        }

        let transform = RigidTransform::new(position, orientation, scale);
        if !transform.is_valid() {
            return Err(NoTargetReason::DegenerateGeometry);
        }

        debug!(
            "Pose target ({method:?}): position [{:.3}, {:.3}, {:.3}], scale {scale:.3}",
            position.x, position.y, position.z
        );

        Ok(PoseTarget {
            transform,
            yaw: EulerYxz::from_quaternion(&orientation).yaw,
            method,
        })
    }

    fn resolve_anchors(&self, set: &LandmarkSet, mapper: &CoordinateMapper) -> Result<Anchors, NoTargetReason> {
        let frame = mapper.frame().ok_or(NoTargetReason::ViewportNotReady)?;
        let px = |index: usize| set.source_px(index, frame.source).ok_or(NoTargetReason::MissingAnchor(index));
        let world = |p: &Vector3<f64>| mapper.to_world(p).ok_or(NoTargetReason::ViewportNotReady);

        let a = &self.anchors;
        let nose_px = px(a.nose_bridge)?;
        let forehead_px = px(a.forehead)?;
        let left_ear_px = px(a.left_ear)?;
        let right_ear_px = px(a.right_ear)?;
        let left_eye_px = px(a.left_eye_outer)?;
        let right_eye_px = px(a.right_eye_outer)?;

        Ok(Anchors {
            nose: world(&nose_px)?,
            forehead: world(&forehead_px)?,
            left_ear: world(&left_ear_px)?,
            right_ear: world(&right_ear_px)?,
            left_eye: world(&left_eye_px)?,
            right_eye: world(&right_eye_px)?,
            nose_px,
            forehead_px,
            left_ear_px,
            right_ear_px,
            left_eye_px,
            right_eye_px,
        })
    }

    /// Weighted blend of the ear- and eye-distance scale estimates
    fn mixed_scale(&self, ear_px: f64, eye_px: f64, source_width: f64) -> f64 {
        let p = &self.pose;
        let ear_estimate = ear_px / source_width * p.ear_coefficient;
        let eye_estimate = eye_px / source_width * p.eye_coefficient;
        (ear_estimate * p.ear_weight + eye_estimate * p.eye_weight) / (p.ear_weight + p.eye_weight)
    }

    /// Ratio of the current face depth to the adaptive reference.
    ///
    /// Returns the ratio and the reference to store if the frame is used.
    fn depth_ratio(&self, nose_z: f64, forehead_z: f64) -> (f64, Option<f64>) {
        let d = &self.depth;
        let face_depth = (nose_z - forehead_z).abs();
        if !d.enabled || !face_depth.is_finite() || face_depth <= d.min_face_depth {
            return (1.0, None);
        }

        let reference = match self.depth_reference {
            Some(previous) => previous * (1.0 - d.adapt_rate) + face_depth * d.adapt_rate,
            None => face_depth,
        };
        let clamped = reference.clamp(d.min, d.max);
        let ratio = (face_depth / clamped).clamp(d.min_ratio, d.max_ratio);
        (ratio, Some(reference))
    }

    /// Fraction of the maximum boost angle reached by the ear line, in `[0, 1]`
    fn yaw_boost_fraction(&self, left_ear: &Vector3<f64>, right_ear: &Vector3<f64>) -> f64 {
        let max_angle = self.yaw_boost.max_angle_deg.to_radians();
        let delta = right_ear - left_ear;
        // Mirroring flips the ear line's X direction but not the turn magnitude.
        let angle = delta.z.atan2(delta.x.abs()).abs().min(max_angle);
        angle / max_angle
    }

    /// Roll from the eye line and yaw from ear-to-nose asymmetry
    fn planar_orientation(&self, a: &Anchors) -> UnitQuaternion<f64> {
        let max_roll = self.pose.planar_max_roll_deg.to_radians();
        let max_yaw = self.pose.planar_max_yaw_deg.to_radians();

        let mut eye_line = a.right_eye - a.left_eye;
        if eye_line.x < 0.0 {
            eye_line = -eye_line;
        }
        let roll = eye_line.y.atan2(eye_line.x).clamp(-max_roll, max_roll);

        let to_left = planar_distance(&a.nose, &a.left_ear);
        let to_right = planar_distance(&a.right_ear, &a.nose);
        let asymmetry = (to_left - to_right) / (to_left + to_right).max(1e-6);
        let direction = if a.right_ear.x >= a.left_ear.x { 1.0 } else { -1.0 };
        let yaw = (direction * asymmetry * max_yaw).clamp(-max_yaw, max_yaw);

        EulerYxz::new(yaw, 0.0, roll).to_quaternion()
    }

    fn apply_orientation_mode(&self, q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        match self.pose.orientation_mode {
            OrientationMode::Full => *q,
            OrientationMode::Level => {
                let e = EulerYxz::from_quaternion(q);
                let gains = &self.pose.level_gains;
                let max = &self.pose.level_max_deg;
                let clamp = |v: f64, deg: f64| v.clamp(-deg.to_radians(), deg.to_radians());
                EulerYxz::new(
                    clamp(e.yaw * gains.yaw, max.yaw),
                    clamp(e.pitch * gains.pitch, max.pitch),
                    clamp(e.roll * gains.roll, max.roll),
                )
                .to_quaternion()
            }
            OrientationMode::YawOnly => {
                let e = EulerYxz::from_quaternion(q);
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), e.yaw)
            }
        }
    }

    /// Decompose a detector head matrix into a target
    fn target_from_matrix(&self, data: &[f64; 16], adjustment: f64) -> Option<PoseTarget> {
        let transform = matrix_target(data, &self.pose.matrix)?;
        let scale = transform.scale * adjustment;
        if !scale.is_finite() || scale < EPSILON {
            return None;
        }
        let orientation = self.apply_orientation_mode(&transform.orientation);
        let transform = RigidTransform::new(
            transform.position,
            orientation,
            scale.clamp(self.pose.min_scale, self.pose.max_scale),
        );
        Some(PoseTarget {
            transform,
            yaw: EulerYxz::from_quaternion(&orientation).yaw,
            method: EstimationMethod::Matrix,
        })
    }
}

/// Decompose a column-major head matrix, applying the configured axis flip
/// and pushing the position along the head's local Z axis
pub fn matrix_target(data: &[f64; 16], config: &MatrixConfig) -> Option<RigidTransform> {
    let mut matrix = Matrix4::from_column_slice(data);
    if config.flip_z {
        matrix *= Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, -1.0));
    }
    let mut transform = RigidTransform::from_matrix(&matrix)?;
    transform.position += transform.orientation * Vector3::new(0.0, 0.0, config.depth_offset);
    Some(transform)
}

/// Build the head orientation from world-space anchors.
///
/// X runs ear to ear, Y from nose bridge to forehead, Z out of the face. A
/// mirrored display reverses the ear line; the basis is reflected back so Z
/// faces the camera and the rotation stays proper. Returns `None` for
/// coincident or collinear anchors.
pub fn basis_orientation(
    left_ear: &Vector3<f64>,
    right_ear: &Vector3<f64>,
    nose: &Vector3<f64>,
    forehead: &Vector3<f64>,
) -> Option<UnitQuaternion<f64>> {
    let mut x = (right_ear - left_ear).try_normalize(EPSILON)?;
    let y0 = (forehead - nose).try_normalize(EPSILON)?;

    let mut z = x.cross(&y0).try_normalize(1e-6)?;
    if z.z < 0.0 {
        x = -x;
        z = x.cross(&y0).try_normalize(1e-6)?;
    }
    let y = z.cross(&x).try_normalize(EPSILON)?;

    Some(quaternion_from_basis(&x, &y, &z))
}

fn planar_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}
