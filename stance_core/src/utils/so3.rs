// stance_core/src/utils/so3.rs

//! Rotation helpers for the local tangent-space orientation convention,
//! `q_true = q_hat * exp(delta)`.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Constructs the skew-symmetric matrix `[v]x` such that `[v]x * u = v x u`.
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map from a rotation vector to a unit quaternion.
#[inline]
pub fn exp(rotation_vector: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*rotation_vector)
}

/// Logarithm map from a unit quaternion to a rotation vector in the ball of
/// radius pi.
#[inline]
pub fn log(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}

/// Applies a local tangent-space increment: `q * exp(delta)`.
#[inline]
pub fn retract(rotation: &UnitQuaternion<f64>, delta: &Vector3<f64>) -> UnitQuaternion<f64> {
    rotation * exp(delta)
}

/// The local tangent-space difference `log(a^-1 * b)`.
#[inline]
pub fn local_difference(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>) -> Vector3<f64> {
    log(&(a.inverse() * b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross_product() {
        let v = Vector3::new(0.3, -1.2, 2.0);
        let u = Vector3::new(-0.7, 0.4, 0.9);
        assert_relative_eq!(skew(&v) * u, v.cross(&u), epsilon = 1e-12);
        assert_relative_eq!(skew(&v).transpose(), -skew(&v), epsilon = 1e-12);
    }

    #[test]
    fn test_retract_and_difference_are_inverse() {
        let q = UnitQuaternion::from_euler_angles(0.2, -0.4, 1.1);
        let delta = Vector3::new(0.01, -0.03, 0.02);
        let moved = retract(&q, &delta);
        assert_relative_eq!(local_difference(&q, &moved), delta, epsilon = 1e-12);
    }

    #[test]
    fn test_exp_of_zero_is_identity() {
        let q = exp(&Vector3::zeros());
        assert_relative_eq!(q.angle(), 0.0);
        assert_relative_eq!(log(&q), Vector3::zeros());
    }
}
