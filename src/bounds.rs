//! Checks of chart coordinates against the TSR box.
//!
//! Translation bounds are plain intervals. Rotation bounds are compared modulo 2*PI:
//! the angle is measured from the lower bound going up, so a range like [3.0, 3.5]
//! that crosses PI accepts -2.7 as well as 3.4, and any range of 2*PI or wider
//! accepts every angle.

use std::f64::consts::PI;

use crate::tsr_error::TsrError;
use crate::tsr_traits::{Bounds, Xyzrpy, EPSILON};

const TWO_PI: f64 = 2.0 * PI;

/// Validates the box: finite, not reversed, rotation ranges not wider than 2*PI.
pub fn validate(bw: &Bounds) -> Result<(), TsrError> {
    for (dof, [min, max]) in bw.iter().copied().enumerate() {
        if !min.is_finite() || !max.is_finite() {
            return Err(TsrError::NonFiniteBound { dof });
        }
        if min > max {
            return Err(TsrError::ReversedBound { dof, min, max });
        }
        if dof >= 3 && max - min > TWO_PI + EPSILON {
            return Err(TsrError::RotationRange { dof, range: max - min });
        }
    }
    Ok(())
}

/// Per-DOF check of the chart coordinates. NaN fails unless `ignore_nan` is set.
pub fn check(bw: &Bounds, xyzrpy: &Xyzrpy, ignore_nan: bool) -> [bool; 6] {
    std::array::from_fn(|i| {
        let value = xyzrpy[i];
        if value.is_nan() {
            return ignore_nan;
        }
        let [min, max] = bw[i];
        if i < 3 {
            within_interval(value, min, max)
        } else {
            within_rotation(value, min, max)
        }
    })
}

/// Center of the box, initial guess for the distance projection.
pub fn midpoint(bw: &Bounds) -> Xyzrpy {
    std::array::from_fn(|i| (bw[i][0] + bw[i][1]) / 2.0)
}

/// Lower and upper corners of the box.
pub fn corners(bw: &Bounds) -> (Xyzrpy, Xyzrpy) {
    (std::array::from_fn(|i| bw[i][0]), std::array::from_fn(|i| bw[i][1]))
}

/// Sum of squared distances of the coordinates to the box, rotations measured around
/// the circle. Zero inside the box, NaN values count as inside.
pub fn violation(bw: &Bounds, xyzrpy: &Xyzrpy) -> f64 {
    (0..6)
        .map(|i| {
            let value = xyzrpy[i];
            if value.is_nan() {
                return 0.0;
            }
            let [min, max] = bw[i];
            let excess = if i < 3 {
                (min - value).max(value - max).max(0.0)
            } else {
                rotation_excess(value, min, max)
            };
            excess * excess
        })
        .sum()
}

fn rotation_excess(angle: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range >= TWO_PI {
        return 0.0;
    }
    let offset = (angle - min).rem_euclid(TWO_PI);
    if offset <= range { 0.0 } else { (offset - range).min(TWO_PI - offset) }
}

fn within_interval(value: f64, min: f64, max: f64) -> bool {
    value + EPSILON >= min && value - EPSILON <= max
}

fn within_rotation(angle: f64, min: f64, max: f64) -> bool {
    if !angle.is_finite() {
        return false;
    }
    let range = max - min;
    if range >= TWO_PI - EPSILON {
        return true;
    }
    let offset = (angle - min).rem_euclid(TWO_PI);
    offset <= range + EPSILON || offset >= TWO_PI - EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsr_traits::ZERO_BOUNDS;

    fn rotation_bounds(dof: usize, min: f64, max: f64) -> Bounds {
        let mut bw = ZERO_BOUNDS;
        bw[dof] = [min, max];
        bw
    }

    #[test]
    fn test_no_wrap_around() {
        let bw = [[-1.0, 1.0], [0.0, 0.5], [0.0, 0.0], [-0.5, 0.5], [0.0, 0.3], [-PI, PI]];
        assert!(check(&bw, &[0.5, 0.25, 0.0, 0.1, 0.2, 3.0], false).iter().all(|&c| c));
        assert_eq!(
            check(&bw, &[1.5, 0.25, 0.0, 0.1, -0.2, 3.0], false),
            [false, true, true, true, false, true]
        );
    }

    #[test]
    fn test_epsilon_at_the_boundary() {
        let bw = ZERO_BOUNDS;
        let on_edge = [EPSILON * 0.5, -EPSILON * 0.5, 0.0, EPSILON * 0.5, -EPSILON * 0.5, 0.0];
        assert!(check(&bw, &on_edge, false).iter().all(|&c| c));
        let outside = [EPSILON * 2.0, 0.0, 0.0, -EPSILON * 2.0, 0.0, 0.0];
        assert_eq!(check(&bw, &outside, false), [false, true, true, false, true, true]);
    }

    #[test]
    fn test_rotation_wrap_around() {
        // Range crossing PI
        let bw = rotation_bounds(5, 3.0, 3.5);
        assert!(check(&bw, &[0.0, 0.0, 0.0, 0.0, 0.0, 3.2], false)[5]);
        assert!(check(&bw, &[0.0, 0.0, 0.0, 0.0, 0.0, 3.5 - 2.0 * PI], false)[5]);
        assert!(!check(&bw, &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0], false)[5]);

        // Same angle written with extra turns
        let bw = rotation_bounds(3, -0.1, 0.1);
        assert!(check(&bw, &[0.0, 0.0, 0.0, 4.0 * PI + 0.05, 0.0, 0.0], false)[3]);
        assert!(check(&bw, &[0.0, 0.0, 0.0, -2.0 * PI - 0.05, 0.0, 0.0], false)[3]);
        assert!(!check(&bw, &[0.0, 0.0, 0.0, PI, 0.0, 0.0], false)[3]);
    }

    #[test]
    fn test_full_circle() {
        let bw = rotation_bounds(4, -PI, PI);
        for angle in [-PI, -1.0, 0.0, 2.0, PI, 7.0] {
            assert!(check(&bw, &[0.0, 0.0, 0.0, 0.0, angle, 0.0], false)[4], "{}", angle);
        }
    }

    #[test]
    fn test_nan_handling() {
        let bw = [[-1.0, 1.0]; 6];
        let xyzrpy = [f64::NAN, 0.0, 0.0, f64::NAN, 0.0, 0.0];
        assert_eq!(check(&bw, &xyzrpy, false), [false, true, true, false, true, true]);
        assert_eq!(check(&bw, &xyzrpy, true), [true; 6]);
    }

    #[test]
    fn test_validate() {
        assert!(validate(&rotation_bounds(3, -PI, PI)).is_ok());
        assert!(validate(&rotation_bounds(3, 0.0, 2.0 * PI + EPSILON * 0.5)).is_ok());
        assert!(matches!(
            validate(&rotation_bounds(3, -4.0, 4.0)),
            Err(TsrError::RotationRange { dof: 3, .. })
        ));
        assert!(validate(&[[-10.0, 10.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]]).is_ok());
        assert!(matches!(
            validate(&rotation_bounds(1, 1.0, -1.0)),
            Err(TsrError::ReversedBound { dof: 1, .. })
        ));
        assert!(matches!(
            validate(&rotation_bounds(0, f64::NEG_INFINITY, 0.0)),
            Err(TsrError::NonFiniteBound { dof: 0 })
        ));
    }

    #[test]
    fn test_violation() {
        let bw = [[-1.0, 1.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [1.0, 2.0], [3.0, 3.5]];
        assert_eq!(violation(&bw, &[0.5, 0.0, 0.0, 0.0, 1.5, 3.2]), 0.0);
        assert!((violation(&bw, &[2.0, 0.0, 0.0, 0.0, 1.5, 3.2]) - 1.0).abs() < 1e-12);
        // Pitch 0.5 below the range, yaw -2.7 is 3.58 inside the wrapped range
        assert!((violation(&bw, &[0.0, 0.0, 0.0, 0.0, 0.5, 3.5 - 2.0 * PI]) - 0.25).abs() < 1e-12);
        // Closer to the lower end going around the circle
        let v = violation(&bw, &[0.0, 0.0, 0.0, 0.0, 1.5, 2.9]);
        assert!((v - 0.01).abs() < 1e-12, "{}", v);
        assert_eq!(violation(&bw, &[f64::NAN, 0.0, 0.0, 0.0, f64::NAN, 3.0]), 0.0);
    }

    #[test]
    fn test_midpoint_and_corners() {
        let bw = [[0.0, 1.0], [-1.0, 1.0], [2.0, 4.0], [0.0, 0.0], [-0.5, 0.0], [0.1, 0.3]];
        let mid = midpoint(&bw);
        assert_eq!(mid, [0.5, 0.0, 3.0, 0.0, -0.25, 0.2]);
        let (lower, upper) = corners(&bw);
        assert_eq!(lower, [0.0, -1.0, 2.0, 0.0, -0.5, 0.1]);
        assert_eq!(upper, [1.0, 1.0, 4.0, 0.0, 0.0, 0.3]);
    }
}
