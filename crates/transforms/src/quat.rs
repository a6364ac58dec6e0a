//! Quaternion and rotation-vector operations.
//!
//! All quaternions are unit rotations in scalar-last (x, y, z, w) order at
//! the API boundary; internally `nalgebra::Quaternion` stores the scalar
//! first. Rotation vectors are axis-angle: direction is the axis, magnitude
//! is the angle in radians.

use nalgebra::{Quaternion, Vector3};

/// Which frame a rotation delta is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// World/base frame: `q_to * q_from⁻¹`.
    Base,
    /// Tool/body frame: `q_from⁻¹ * q_to`.
    Tool,
}

/// Build a quaternion from scalar-last components.
pub fn from_xyzw(x: f64, y: f64, z: f64, w: f64) -> Quaternion<f64> {
    Quaternion::new(w, x, y, z)
}

/// Scalar-last components of a quaternion.
pub fn to_xyzw(q: Quaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Normalize to unit length; a degenerate (zero-norm) input becomes the
/// identity rotation.
pub fn normalize(q: Quaternion<f64>) -> Quaternion<f64> {
    let n = q.norm();
    if n <= 0.0 {
        return Quaternion::identity();
    }
    Quaternion::new(q.w / n, q.i / n, q.j / n, q.k / n)
}

/// Conjugate; the inverse for unit quaternions.
pub fn conjugate(q: Quaternion<f64>) -> Quaternion<f64> {
    q.conjugate()
}

/// Hamilton product `a * b` (non-commutative).
pub fn multiply(a: Quaternion<f64>, b: Quaternion<f64>) -> Quaternion<f64> {
    a * b
}

/// Convert a unit quaternion to an axis-angle rotation vector.
///
/// The hemisphere with `w >= 0` is chosen first so the shorter of the two
/// equivalent rotations is returned.
pub fn to_rotvec(q: Quaternion<f64>) -> Vector3<f64> {
    let q = normalize(q);
    let (x, y, z, w) = if q.w < 0.0 {
        (-q.i, -q.j, -q.k, -q.w)
    } else {
        (q.i, q.j, q.k, q.w)
    };

    let w = w.clamp(-1.0, 1.0);
    let angle = 2.0 * w.acos();
    let s = (1.0 - w * w).max(0.0).sqrt(); // == |sin(angle/2)|

    if s < 1e-8 || angle < 1e-8 {
        return Vector3::zeros();
    }

    Vector3::new(x / s, y / s, z / s) * angle
}

/// Convert an axis-angle rotation vector back to a quaternion.
pub fn from_rotvec(r: Vector3<f64>) -> Quaternion<f64> {
    let angle = r.norm();
    if angle < 1e-12 {
        return Quaternion::identity();
    }
    let axis = r / angle;
    let half = angle / 2.0;
    let s = half.sin();
    Quaternion::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
}

/// Relative rotation from `q_from` to `q_to` in the given frame.
pub fn delta(q_from: Quaternion<f64>, q_to: Quaternion<f64>, frame: Frame) -> Quaternion<f64> {
    let inv = q_from.conjugate();
    match frame {
        Frame::Tool => inv * q_to,
        Frame::Base => q_to * inv,
    }
}

/// Rotate a vector by a quaternion (`q v q*`) using the two-cross-product
/// form.
pub fn rotate_vector(v: Vector3<f64>, q: Quaternion<f64>) -> Vector3<f64> {
    let u = Vector3::new(q.i, q.j, q.k);
    let t = u.cross(&v) * 2.0;
    v + t * q.w + u.cross(&t)
}

/// XYZ-intrinsic Euler angles (roll, pitch, yaw) in radians.
pub fn to_euler_xyz(q: Quaternion<f64>) -> (f64, f64, f64) {
    let (x, y, z, w) = (q.i, q.j, q.k, q.w);

    let sinr_cosp = 2.0 * (w * x + y * z);
    let cosr_cosp = 1.0 - 2.0 * (x * x + y * y);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = 2.0 * (w * y - z * x);
    let pitch = if sinp.abs() >= 1.0 {
        (std::f64::consts::FRAC_PI_2).copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny_cosp = 2.0 * (w * z + x * y);
    let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
    let yaw = siny_cosp.atan2(cosy_cosp);

    (roll, pitch, yaw)
}

/// Quaternion from XYZ-intrinsic Euler angles in radians.
pub fn from_euler_xyz(x_rot: f64, y_rot: f64, z_rot: f64) -> Quaternion<f64> {
    let (sx, cx) = (x_rot / 2.0).sin_cos();
    let (sy, cy) = (y_rot / 2.0).sin_cos();
    let (sz, cz) = (z_rot / 2.0).sin_cos();

    Quaternion::new(
        cx * cy * cz - sx * sy * sz,
        sx * cy * cz + cx * sy * sz,
        cx * sy * cz - sx * cy * sz,
        cx * cy * sz + sx * sy * cz,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn quat_close(a: Quaternion<f64>, b: Quaternion<f64>, epsilon: f64) {
        // q and -q represent the same rotation
        let dot = a.w * b.w + a.i * b.i + a.j * b.j + a.k * b.k;
        assert!(
            dot.abs() > 1.0 - epsilon,
            "quaternions differ: {a:?} vs {b:?}"
        );
    }

    #[test]
    fn test_normalize_unit_norm() {
        let q = from_xyzw(1.0, 2.0, 3.0, 4.0);
        let n = normalize(q);
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_degenerate_is_identity() {
        let q = normalize(from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_eq!(to_xyzw(q), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_multiply_conjugate_is_identity() {
        let q = normalize(from_xyzw(0.3, -0.2, 0.5, 0.8));
        let product = multiply(q, conjugate(q));
        quat_close(product, Quaternion::identity(), 1e-12);
    }

    #[test]
    fn test_rotvec_roundtrip_within_pi() {
        let cases = [
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(0.0, -1.2, 0.0),
            Vector3::new(0.5, 0.5, -0.5),
            Vector3::new(0.0, 0.0, 3.0),
            Vector3::new(1.0, 1.0, 1.0).normalize() * (PI - 1e-3),
        ];
        for r in cases {
            let back = to_rotvec(from_rotvec(r));
            assert_relative_eq!((back - r).norm(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rotvec_zero_for_identity() {
        assert_eq!(to_rotvec(Quaternion::identity()), Vector3::zeros());
        assert_eq!(from_rotvec(Vector3::zeros()), Quaternion::identity());
    }

    #[test]
    fn test_rotvec_hemisphere_picks_shorter() {
        // -q encodes the same rotation; the rotation vector must not flip to
        // the long way around
        let r = Vector3::new(0.0, 0.0, 1.0);
        let q = from_rotvec(r);
        let negated = from_xyzw(-q.i, -q.j, -q.k, -q.w);
        assert_relative_eq!((to_rotvec(negated) - r).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_base_and_tool() {
        let a = from_rotvec(Vector3::new(0.0, 0.0, 0.4));
        let b = from_rotvec(Vector3::new(0.0, 0.0, 1.0));
        // Both conventions agree for coaxial rotations
        let base = delta(a, b, Frame::Base);
        let tool = delta(a, b, Frame::Tool);
        let expected = from_rotvec(Vector3::new(0.0, 0.0, 0.6));
        quat_close(base, expected, 1e-9);
        quat_close(tool, expected, 1e-9);
    }

    #[test]
    fn test_delta_recovers_target() {
        let a = normalize(from_xyzw(0.1, 0.2, -0.3, 0.9));
        let b = normalize(from_xyzw(-0.4, 0.1, 0.2, 0.85));
        // Base-frame delta: d * a == b
        let d = delta(a, b, Frame::Base);
        quat_close(multiply(d, a), b, 1e-9);
        // Tool-frame delta: a * d == b
        let d = delta(a, b, Frame::Tool);
        quat_close(multiply(a, d), b, 1e-9);
    }

    #[test]
    fn test_rotate_vector_matches_sandwich() {
        let q = normalize(from_xyzw(0.2, -0.5, 0.1, 0.8));
        let v = Vector3::new(1.0, -2.0, 0.5);

        let fast = rotate_vector(v, q);

        // Direct sandwich q v q*
        let vq = Quaternion::new(0.0, v.x, v.y, v.z);
        let s = q * vq * q.conjugate();
        let direct = Vector3::new(s.i, s.j, s.k);

        assert_relative_eq!((fast - direct).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_vector_quarter_turn() {
        // 90 degrees about Z maps +X to +Y
        let q = from_rotvec(Vector3::new(0.0, 0.0, PI / 2.0));
        let v = rotate_vector(Vector3::new(1.0, 0.0, 0.0), q);
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_roundtrip() {
        let cases = [
            (0.0, 0.0, 0.0),
            (0.3, -0.2, 0.9),
            (-1.0, 0.5, -0.7),
            (PI / 4.0, PI / 6.0, -PI / 3.0),
        ];
        for (x_rot, y_rot, z_rot) in cases {
            let q = from_euler_xyz(x_rot, y_rot, z_rot);
            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
            let (roll, pitch, yaw) = to_euler_xyz(q);
            assert_relative_eq!(roll, x_rot, epsilon = 1e-9);
            assert_relative_eq!(pitch, y_rot, epsilon = 1e-9);
            assert_relative_eq!(yaw, z_rot, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_euler_identity() {
        let (roll, pitch, yaw) = to_euler_xyz(Quaternion::identity());
        assert_relative_eq!(roll, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-12);
        assert_relative_eq!(yaw, 0.0, epsilon = 1e-12);
    }
}
