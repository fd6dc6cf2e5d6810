//! Rigid transform value carried between pipeline stages, plus the rotation
//! helpers the estimator and smoother share.
//!
//! Poses travel as position + unit quaternion + uniform scale. A 4x4 matrix is
//! only produced at the renderer hand-off, and only consumed when a detector
//! reports a head transformation matrix.

use crate::constants::EPSILON;
use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};
use std::f64::consts::PI;

/// Complete pose of the overlay object in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub scale: f64,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>, scale: f64) -> Self {
        Self {
            position,
            orientation,
            scale,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity(), 1.0)
    }

    /// Compose into a column-major renderer matrix: `T * R * S`
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::new_translation(&self.position)
            * self.orientation.to_homogeneous()
            * Matrix4::new_scaling(self.scale)
    }

    /// True when every component is finite and the scale is positive
    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
            && self.scale.is_finite()
            && self.scale > 0.0
    }

    /// Decompose an affine matrix into translation, rotation and uniform scale.
    ///
    /// Per-axis scales are averaged. A reflection (negative determinant) is
    /// folded into the X scale the same way scene-graph engines do, so the
    /// rotation part stays proper. Returns `None` for singular or non-finite
    /// input.
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let upper: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let mut sx = upper.column(0).norm();
        let sy = upper.column(1).norm();
        let sz = upper.column(2).norm();
        if sx < EPSILON || sy < EPSILON || sz < EPSILON {
            return None;
        }
        if upper.determinant() < 0.0 {
            sx = -sx;
        }

        let rotation = Matrix3::from_columns(&[upper.column(0) / sx, upper.column(1) / sy, upper.column(2) / sz]);

        let extracted = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        let orientation = UnitQuaternion::new_normalize(extracted.into_inner());
        let position = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let scale = (sx.abs() + sy + sz) / 3.0;

        Some(Self::new(position, orientation, scale))
    }
}

/// Build a rotation from three orthonormal basis vectors (columns X, Y, Z)
pub fn quaternion_from_basis(x: &Vector3<f64>, y: &Vector3<f64>, z: &Vector3<f64>) -> UnitQuaternion<f64> {
    let rotation = Rotation3::from_basis_unchecked(&[*x, *y, *z]);
    UnitQuaternion::from_rotation_matrix(&rotation)
}

/// Shortest-path spherical interpolation from `from` towards `to` by `t`.
///
/// Falls back to normalized linear interpolation when the two rotations are
/// nearly identical, where slerp is numerically ill-defined.
pub fn slerp_shortest(from: &UnitQuaternion<f64>, to: &UnitQuaternion<f64>, t: f64) -> UnitQuaternion<f64> {
    let a = from.coords;
    let mut b = to.coords;
    let mut cos_theta = a.dot(&b);
    if cos_theta < 0.0 {
        b = -b;
        cos_theta = -cos_theta;
    }

    if cos_theta > 0.9995 {
        return UnitQuaternion::new_normalize(Quaternion::from(a.lerp(&b, t)));
    }

    let theta = cos_theta.acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    UnitQuaternion::new_normalize(Quaternion::from(a * wa + b * wb))
}

/// Wrap an angle into `(-PI, PI]`
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Interpolate between two angles along the shorter arc
pub fn lerp_angle(from: f64, to: f64, t: f64) -> f64 {
    wrap_angle(from + wrap_angle(to - from) * t)
}

/// Yaw/pitch/roll of a rotation using the Y-X-Z intrinsic order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerYxz {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl EulerYxz {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Decompose `R = Ry(yaw) * Rx(pitch) * Rz(roll)`
    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        let rotation = q.to_rotation_matrix();
        let m = rotation.matrix();
        let m12 = m[(1, 2)].clamp(-1.0, 1.0);
        let pitch = (-m12).asin();
        if m12.abs() < 0.999_999_9 {
            Self::new(m[(0, 2)].atan2(m[(2, 2)]), pitch, m[(1, 0)].atan2(m[(1, 1)]))
        } else {
            Self::new((-m[(2, 0)]).atan2(m[(0, 0)]), pitch, 0.0)
        }
    }

    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.yaw)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.pitch)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.roll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_roundtrip() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.4, 0.25);
        let t = RigidTransform::new(Vector3::new(1.0, -2.0, 3.0), q, 2.5);
        let back = RigidTransform::from_matrix(&t.to_matrix()).unwrap();

        assert!((back.position - t.position).norm() < 1e-9);
        assert!(back.orientation.angle_to(&t.orientation) < 1e-9);
        assert!((back.scale - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_matrix_rejects_singular() {
        assert!(RigidTransform::from_matrix(&Matrix4::zeros()).is_none());
        let mut m = Matrix4::identity();
        m[(0, 0)] = f64::NAN;
        assert!(RigidTransform::from_matrix(&m).is_none());
    }

    #[test]
    fn test_from_matrix_with_reflection_keeps_proper_rotation() {
        let flip = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, -1.0));
        let t = RigidTransform::from_matrix(&flip).unwrap();
        assert!((t.orientation.to_rotation_matrix().matrix().determinant() - 1.0).abs() < 1e-9);
        assert!((t.scale - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0);

        assert!(slerp_shortest(&a, &b, 0.0).angle_to(&a) < 1e-9);
        assert!(slerp_shortest(&a, &b, 1.0).angle_to(&b) < 1e-9);
        let mid = slerp_shortest(&a, &b, 0.5);
        assert!((mid.angle() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_slerp_takes_short_path_for_negated_quaternion() {
        let a = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2);
        let b = UnitQuaternion::new_unchecked(-a.into_inner());
        let mid = slerp_shortest(&a, &b, 0.5);
        assert!(mid.angle_to(&a) < 1e-9);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(-2.0 * PI + 0.1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_angle_crosses_pi_boundary() {
        let from = PI - 0.1;
        let to = -PI + 0.1;
        let mid = lerp_angle(from, to, 0.5);
        assert!((mid.abs() - PI).abs() < 1e-9, "expected ~±PI, got {mid}");
    }

    #[test]
    fn test_euler_yxz_roundtrip() {
        let e = EulerYxz::new(0.4, -0.2, 0.15);
        let back = EulerYxz::from_quaternion(&e.to_quaternion());
        assert!((back.yaw - e.yaw).abs() < 1e-9);
        assert!((back.pitch - e.pitch).abs() < 1e-9);
        assert!((back.roll - e.roll).abs() < 1e-9);
    }
}
