//! Helper functions: conversions between poses, 4x4 matrices and 6-vectors, geodesic distance.

use std::f64::consts::PI;

use tracing::debug;

use crate::tsr_error::TsrError;
use crate::tsr_traits::{Pose, Xyzrpy};
use nalgebra::{Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Weight of the rotation angle (radians) against the translation (meters) in the
/// geodesic distance.
pub const GEODESIC_ROTATION_WEIGHT: f64 = 1.0;

/// How far a 4x4 matrix may deviate from a rigid transform and still be accepted.
/// Covers matrices written by hand with rounded rotation entries.
const RIGIDITY_TOLERANCE: f64 = 1e-3;

/// Builds the transform from [x, y, z, roll, pitch, yaw].
/// The rotation is yaw around Z, then pitch around Y, then roll around X, in the
/// rotated frame (R = Rz(yaw) * Ry(pitch) * Rx(roll)); the translation is applied last.
pub fn xyzrpy_to_pose(v: &Xyzrpy) -> Pose {
    Isometry3::from_parts(
        Translation3::new(v[0], v[1], v[2]),
        UnitQuaternion::from_euler_angles(v[3], v[4], v[5]),
    )
}

/// Decomposes the transform into [x, y, z, roll, pitch, yaw], pitch within [-PI/2, PI/2].
pub fn pose_to_xyzrpy(pose: &Pose) -> Xyzrpy {
    let ([x, y, z], q) = pose_to_translation_quaternion(pose);
    let [yaw, pitch, roll] = quaternion_to_ypr(&q);
    [x, y, z, roll, pitch, yaw]
}

/// Builds the transform from [x, y, z, yaw, pitch, roll].
pub fn xyzypr_to_pose(v: &[f64; 6]) -> Pose {
    xyzrpy_to_pose(&[v[0], v[1], v[2], v[5], v[4], v[3]])
}

/// Splits the transform into translation and quaternion in [x, y, z, w] ordering.
pub fn pose_to_translation_quaternion(pose: &Pose) -> ([f64; 3], [f64; 4]) {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    ([t.x, t.y, t.z], [q.i, q.j, q.k, q.w])
}

/// Converts quaternion in [x, y, z, w] ordering into [yaw, pitch, roll].
pub fn quaternion_to_ypr(q: &[f64; 4]) -> [f64; 3] {
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[3], q[0], q[1], q[2]));
    let (roll, pitch, yaw) = rotation.euler_angles();
    [yaw, pitch, roll]
}

/// Applies `b` in the frame of `a` (matrix product a * b).
pub fn compose(a: &Pose, b: &Pose) -> Pose {
    a * b
}

pub fn invert(pose: &Pose) -> Pose {
    pose.inverse()
}

/// Converts 4x4 homogeneous matrix into the pose. The matrix must be a rigid transform
/// (orthonormal rotation with the determinant 1, bottom row [0, 0, 0, 1]) within
/// a small tolerance; the rotation is normalized.
pub fn matrix_to_pose(m: &Matrix4<f64>) -> Result<Pose, TsrError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(TsrError::NotRigid(format!("non-finite entries in {}", m)));
    }
    let bottom = [m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)] - 1.0];
    if bottom.iter().any(|v| v.abs() > RIGIDITY_TOLERANCE) {
        return Err(TsrError::NotRigid(format!("bottom row must be [0, 0, 0, 1] in {}", m)));
    }

    let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let orthogonality = (r.transpose() * r - Matrix3::identity()).amax();
    if orthogonality > RIGIDITY_TOLERANCE || r.determinant() <= 0.0 {
        return Err(TsrError::NotRigid(format!("rotation part is not orthonormal in {}", m)));
    }

    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let rotation = UnitQuaternion::new_normalize(q.into_inner());
    let translation = Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let pose = Isometry3::from_parts(translation, rotation);

    let adjustment = (pose_to_matrix(&pose) - m).amax();
    if adjustment > 1e-12 {
        debug!("Rotation normalized, matrix entries changed by up to {:e}", adjustment);
    }
    Ok(pose)
}

pub fn pose_to_matrix(pose: &Pose) -> Matrix4<f64> {
    pose.to_homogeneous()
}

/// Error between two poses: translation difference and the angle of the
/// relative rotation a⁻¹ * b.
pub fn geodesic_error(a: &Pose, b: &Pose) -> (Vector3<f64>, f64) {
    let translation = b.translation.vector - a.translation.vector;
    // atan2 stays accurate for small angles, where acos of the scalar part does not.
    let relative = a.rotation.inverse() * b.rotation;
    let angle = 2.0 * relative.vector().norm().atan2(relative.scalar().abs());
    (translation, angle)
}

/// Geodesic distance between two poses: sqrt(|Δt|² + (r * θ)²) where Δt is the
/// translation difference and θ the angle of the relative rotation.
pub fn geodesic_distance(a: &Pose, b: &Pose, r: f64) -> f64 {
    let (translation, angle) = geodesic_error(a, b);
    (translation.norm_squared() + (r * angle).powi(2)).sqrt()
}

/// Wraps the angle into [-PI, PI).
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Converts slice into chart coordinates, checking the length.
pub fn xyzrpy_from_slice(values: &[f64]) -> Result<Xyzrpy, TsrError> {
    <[f64; 6]>::try_from(values).map_err(|_| TsrError::InvalidLength {
        expected: 6,
        found: values.len(),
    })
}

pub fn dump_pose(isometry: &Isometry3<f64>) {
    let ([x, y, z], [qx, qy, qz, qw]) = pose_to_translation_quaternion(isometry);

    println!(
        "x: {:.5}, y: {:.5}, z: {:.5},  quat: {:.5},{:.5},{:.5},{:.5}",
        x, y, z, qx, qy, qz, qw
    );
}

/// Print chart coordinates, rotations converted to degrees. NaN is printed as "*".
pub fn dump_xyzrpy(xyzrpy: &Xyzrpy) {
    let mut row_str = String::new();
    for (i, v) in xyzrpy.iter().enumerate() {
        if v.is_nan() {
            row_str.push_str("    * ");
        } else if i < 3 {
            row_str.push_str(&format!("{:5.3} ", v));
        } else {
            row_str.push_str(&format!("{:5.2} ", v.to_degrees()));
        }
    }
    println!("[{}]", row_str.trim_end());
}

pub fn assert_pose_eq(ta: &Isometry3<f64>, tb: &Isometry3<f64>,
                 distance_tolerance: f64, angular_tolerance: f64) -> bool {
    fn bad(ta: &Isometry3<f64>, tb: &Isometry3<f64>) {
        dump_pose(ta);
        dump_pose(tb);
    }

    let (translation, angle) = geodesic_error(ta, tb);

    if translation.norm() > distance_tolerance {
        bad(ta, tb);
        panic!("Poses have too different translations");
    }

    if angle.abs() > angular_tolerance {
        bad(ta, tb);
        panic!("Poses have too different angles");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_xyzrpy_round_trip() {
        let v = [0.1, -0.2, 0.3, 0.4, -0.5, 0.6];
        let back = pose_to_xyzrpy(&xyzrpy_to_pose(&v));
        for i in 0..6 {
            assert!((v[i] - back[i]).abs() < 1e-12, "{:?} vs {:?}", v, back);
        }
    }

    #[test]
    fn test_yaw_then_pitch_then_roll() {
        // Pure yaw of 90 degrees maps X to Y
        let pose = xyzrpy_to_pose(&[1.0, 2.0, 3.0, 0.0, 0.0, FRAC_PI_2]);
        let p = pose * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert!((p - nalgebra::Point3::new(1.0, 3.0, 3.0)).norm() < 1e-12);

        // Same rotation, vector in yaw-pitch-roll order
        let ypr = xyzypr_to_pose(&[1.0, 2.0, 3.0, FRAC_PI_2, 0.0, 0.0]);
        assert_pose_eq(&pose, &ypr, 1e-12, 1e-12);
    }

    #[test]
    fn test_quaternion_to_ypr() {
        let pose = xyzrpy_to_pose(&[0.0, 0.0, 0.0, 0.3, 0.2, 0.1]);
        let (_, q) = pose_to_translation_quaternion(&pose);
        let ypr = quaternion_to_ypr(&q);
        assert!((ypr[0] - 0.1).abs() < 1e-12);
        assert!((ypr[1] - 0.2).abs() < 1e-12);
        assert!((ypr[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_round_trip() {
        let pose = xyzrpy_to_pose(&[0.5, 0.0, -1.0, 0.1, 1.2, -2.5]);
        let back = matrix_to_pose(&pose_to_matrix(&pose)).expect("rigid");
        assert_pose_eq(&pose, &back, 1e-12, 1e-12);
        assert_pose_eq(&compose(&pose, &invert(&pose)), &Pose::identity(), 1e-12, 1e-12);
    }

    #[test]
    fn test_matrix_not_rigid() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = 2.0;
        assert!(matches!(matrix_to_pose(&m), Err(TsrError::NotRigid(_))));

        let mut m = Matrix4::identity();
        m[(3, 0)] = 1.0;
        assert!(matches!(matrix_to_pose(&m), Err(TsrError::NotRigid(_))));

        // Reflection
        let mut m = Matrix4::identity();
        m[(2, 2)] = -1.0;
        assert!(matches!(matrix_to_pose(&m), Err(TsrError::NotRigid(_))));
    }

    #[test]
    fn test_matrix_with_rounded_rotation() {
        // Rotation of 30 degrees around Z written with three decimals
        let m = Matrix4::new(
            0.866, -0.5, 0.0, 1.0,
            0.5, 0.866, 0.0, 2.0,
            0.0, 0.0, 1.0, 3.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let pose = matrix_to_pose(&m).expect("close enough to rigid");
        let back = pose_to_matrix(&pose);
        let r = back.fixed_view::<3, 3>(0, 0).into_owned();
        assert!((r.transpose() * r - Matrix3::identity()).amax() < 1e-12);
        assert!((back - m).amax() < 1e-3);
        assert!((back - m).amax() > 1e-6);
        assert_eq!(back[(1, 3)], 2.0);
    }

    #[test]
    fn test_geodesic_distance() {
        let a = xyzrpy_to_pose(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let b = xyzrpy_to_pose(&[3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((geodesic_distance(&a, &b, 1.0) - 5.0).abs() < 1e-12);

        let c = xyzrpy_to_pose(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.5]);
        assert!((geodesic_distance(&a, &c, 1.0) - 0.5).abs() < 1e-12);
        assert!((geodesic_distance(&a, &c, 2.0) - 1.0).abs() < 1e-12);
        assert!((geodesic_distance(&c, &a, GEODESIC_ROTATION_WEIGHT) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(PI) + PI).abs() < 1e-12);
        assert_eq!(wrap_angle(0.25), 0.25);
    }

    #[test]
    fn test_xyzrpy_from_slice() {
        assert_eq!(xyzrpy_from_slice(&[1.0; 6]).unwrap(), [1.0; 6]);
        assert!(matches!(
            xyzrpy_from_slice(&[1.0; 5]),
            Err(TsrError::InvalidLength { expected: 6, found: 5 })
        ));
    }
}
