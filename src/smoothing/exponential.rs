use super::{PoseFilter, SmootherState};
use crate::transform::{lerp_angle, slerp_shortest};

/// Fraction of the previously applied value kept each frame, per concern.
///
/// `0` applies the target immediately; values towards `1` smooth harder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingFactors {
    pub position: f64,
    pub rotation: f64,
    pub scale: f64,
    pub yaw: f64,
}

impl SmoothingFactors {
    /// Same factor for every concern
    pub fn uniform(alpha: f64) -> Self {
        Self {
            position: alpha,
            rotation: alpha,
            scale: alpha,
            yaw: alpha,
        }
    }
}

/// Blend `target` into `previous`.
///
/// Position and scale move linearly by `1 - alpha`, orientation along the
/// shortest great arc, yaw along the shorter way around the circle.
pub fn blend(previous: &SmootherState, target: &SmootherState, factors: &SmoothingFactors) -> SmootherState {
    let t_pos = 1.0 - factors.position;
    let t_rot = 1.0 - factors.rotation;
    let t_scale = 1.0 - factors.scale;
    let t_yaw = 1.0 - factors.yaw;

    SmootherState {
        position: previous.position.lerp(&target.position, t_pos),
        orientation: slerp_shortest(&previous.orientation, &target.orientation, t_rot),
        scale: previous.scale + (target.scale - previous.scale) * t_scale,
        yaw: lerp_angle(previous.yaw, target.yaw, t_yaw),
    }
}

/// Exponential smoothing filter over the whole pose
pub struct ExponentialPoseFilter {
    factors: SmoothingFactors,
    state: Option<SmootherState>,
}

impl ExponentialPoseFilter {
    pub fn new(factors: SmoothingFactors) -> Self {
        Self {
            factors: SmoothingFactors {
                position: factors.position.clamp(0.0, 1.0),
                rotation: factors.rotation.clamp(0.0, 1.0),
                scale: factors.scale.clamp(0.0, 1.0),
                yaw: factors.yaw.clamp(0.0, 1.0),
            },
            state: None,
        }
    }

    pub fn factors(&self) -> SmoothingFactors {
        self.factors
    }
}

impl PoseFilter for ExponentialPoseFilter {
    fn apply(&mut self, target: &SmootherState) -> SmootherState {
        // First frame after (re)acquisition is applied exactly.
        let next = match &self.state {
            Some(previous) => blend(previous, target, &self.factors),
            None => *target,
        };
        self.state = Some(next);
        next
    }

    fn state(&self) -> Option<&SmootherState> {
        self.state.as_ref()
    }

    fn reset(&mut self) {
        self.state = None;
    }

    fn name(&self) -> &str {
        "ExponentialPoseFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::RigidTransform;
    use nalgebra::{UnitQuaternion, Vector3};
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn pose(x: f64, angle: f64, scale: f64, yaw: f64) -> SmootherState {
        SmootherState::new(
            RigidTransform::new(
                Vector3::new(x, 0.0, 0.0),
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle),
                scale,
            ),
            yaw,
        )
    }

    #[test]
    fn test_first_frame_bootstrap() {
        let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(0.9));
        let target = pose(5.0, 0.4, 2.0, 0.4);
        assert_eq!(filter.apply(&target), target);
    }

    #[test]
    fn test_second_frame_is_blended() {
        let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(0.5));
        filter.apply(&pose(10.0, 0.0, 1.0, 0.0));
        let out = filter.apply(&pose(20.0, 1.0, 3.0, 1.0));
        assert!((out.position.x - 15.0).abs() < 1e-12);
        assert!((out.scale - 2.0).abs() < 1e-12);
        assert!((out.orientation.angle() - 0.5).abs() < 1e-9);
        assert!((out.yaw - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_factor_applies_target() {
        let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(0.0));
        filter.apply(&pose(0.0, 0.0, 1.0, 0.0));
        let target = pose(7.0, 0.3, 4.0, 0.3);
        let out = filter.apply(&target);
        assert!((out.position - target.position).norm() < 1e-12);
        assert!(out.orientation.angle_to(&target.orientation) < 1e-9);
    }

    #[test]
    fn test_reset_reboots() {
        let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(0.5));
        filter.apply(&pose(0.0, 0.0, 1.0, 0.0));
        filter.reset();
        assert!(filter.state().is_none());
        let target = pose(100.0, 0.0, 1.0, 0.0);
        assert_eq!(filter.apply(&target), target);
    }

    #[test]
    fn test_convergence_within_one_percent() {
        let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(0.65));
        filter.apply(&pose(0.0, 0.0, 1.0, 0.0));
        let target = pose(1.0, 0.0, 2.0, 0.0);
        let mut frames = 0;
        loop {
            let out = filter.apply(&target);
            frames += 1;
            if (out.position.x - 1.0).abs() <= 0.01 && (out.scale - 2.0).abs() <= 0.01 {
                break;
            }
            assert!(frames < 30, "did not converge within 30 frames");
        }
        assert!(frames <= 11);
    }

    #[test]
    fn test_yaw_wraps_across_pi() {
        let previous = pose(0.0, 0.0, 1.0, PI - 0.1);
        let target = pose(0.0, 0.0, 1.0, -PI + 0.1);
        let out = blend(&previous, &target, &SmoothingFactors::uniform(0.5));
        assert!((out.yaw.abs() - PI).abs() < 1e-9, "yaw went the long way: {}", out.yaw);
    }

    proptest! {
        #[test]
        fn prop_no_overshoot(
            start in -50.0f64..50.0,
            goal in -50.0f64..50.0,
            s0 in 0.5f64..8.0,
            s1 in 0.5f64..8.0,
            alpha in 0.0f64..0.99,
        ) {
            let mut filter = ExponentialPoseFilter::new(SmoothingFactors::uniform(alpha));
            filter.apply(&pose(start, 0.0, s0, 0.0));
            let target = pose(goal, 0.0, s1, 0.0);
            let (lo, hi) = (start.min(goal), start.max(goal));
            let (slo, shi) = (s0.min(s1), s0.max(s1));
            for _ in 0..40 {
                let out = filter.apply(&target);
                prop_assert!(out.position.x >= lo - 1e-9 && out.position.x <= hi + 1e-9);
                prop_assert!(out.scale >= slo - 1e-9 && out.scale <= shi + 1e-9);
            }
        }
    }
}
