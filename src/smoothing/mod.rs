//! Temporal smoothing of the overlay pose.
//!
//! Landmarks jitter frame to frame; the filters here low-pass the target pose
//! against the previously applied pose so the overlay glides instead of
//! shaking. Smoothing state is explicit and owned by the filter, never hidden
//! in the renderable object.

/// Exponential (one-pole) smoothing of position, orientation, scale and yaw
pub mod exponential;

pub use exponential::{blend, ExponentialPoseFilter, SmoothingFactors};

use crate::pose_estimation::PoseTarget;
use crate::transform::RigidTransform;
use crate::Result;
use nalgebra::{UnitQuaternion, Vector3};

/// Smoothed pose plus the scalar yaw tracked for yaw-only orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmootherState {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub scale: f64,
    pub yaw: f64,
}

impl SmootherState {
    pub fn new(transform: RigidTransform, yaw: f64) -> Self {
        Self {
            position: transform.position,
            orientation: transform.orientation,
            scale: transform.scale,
            yaw,
        }
    }

    pub fn transform(&self) -> RigidTransform {
        RigidTransform::new(self.position, self.orientation, self.scale)
    }

    /// Transform whose rotation is rebuilt from the smoothed yaw alone
    pub fn yaw_only_transform(&self) -> RigidTransform {
        RigidTransform::new(
            self.position,
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.yaw),
            self.scale,
        )
    }
}

impl From<&PoseTarget> for SmootherState {
    fn from(target: &PoseTarget) -> Self {
        Self::new(target.transform, target.yaw)
    }
}

/// Trait for all pose filters
pub trait PoseFilter: Send + Sync {
    /// Fold a new target into the filter and return the pose to apply
    fn apply(&mut self, target: &SmootherState) -> SmootherState;

    /// Last applied pose, if any
    fn state(&self) -> Option<&SmootherState>;

    /// Forget history; the next target is applied as is
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// Filter that applies every target unchanged
#[derive(Debug, Default)]
pub struct PassThroughFilter {
    last: Option<SmootherState>,
}

impl PoseFilter for PassThroughFilter {
    fn apply(&mut self, target: &SmootherState) -> SmootherState {
        self.last = Some(*target);
        *target
    }

    fn state(&self) -> Option<&SmootherState> {
        self.last.as_ref()
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "PassThroughFilter"
    }
}

/// Create a pose filter by type name
pub fn create_filter(filter_type: &str, factors: SmoothingFactors) -> Result<Box<dyn PoseFilter>> {
    match filter_type.to_lowercase().as_str() {
        "none" | "passthrough" | "pass_through" => Ok(Box::new(PassThroughFilter::default())),
        "exponential" => Ok(Box::new(ExponentialPoseFilter::new(factors))),
        _ => Err(crate::Error::ConfigError(format!("Unknown filter type: {filter_type}"))),
    }
}
