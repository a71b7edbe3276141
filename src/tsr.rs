//! Task Space Region: a box in the local xyz + roll/pitch/yaw chart of a displaced frame,
//! defining the set of allowed end-effector poses
//!
//! ```text
//! { T0_w * Tw(b) * Tw_e : b within Bw }
//! ```
//!
//! where `T0_w` places the displaced frame `w` in the reference frame, `Tw_e` is the
//! end-effector offset from `w`, and `Tw(b)` is the transform of the chart coordinates
//! `b = [x, y, z, roll, pitch, yaw]`.
//!
//! ```
//! use nalgebra::{Isometry3, Translation3, UnitQuaternion};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use rs_tsr::tsr::Tsr;
//! use rs_tsr::tsr_traits::{TaskSpaceRegion, UNCONSTRAINED};
//!
//! // Grasp anywhere around a vertical cylinder standing at (0.5, 0, 0.8),
//! // 5 cm up or down, approaching from any direction.
//! let cylinder = Isometry3::from_parts(Translation3::new(0.5, 0.0, 0.8), UnitQuaternion::identity());
//! let hand_offset = Isometry3::from_parts(Translation3::new(-0.1, 0.0, 0.0), UnitQuaternion::identity());
//! let mut bw = [[0.0, 0.0]; 6];
//! bw[2] = [-0.05, 0.05];
//! bw[5] = [-std::f64::consts::PI, std::f64::consts::PI];
//!
//! let tsr = Tsr::new(cylinder, hand_offset, bw).expect("valid bounds");
//! let mut rng = StdRng::seed_from_u64(7);
//! let grasp = tsr.sample(Some(&UNCONSTRAINED), &mut rng).expect("sampling");
//! assert!(tsr.contains(&grasp).iter().all(|&ok| ok));
//! assert_eq!(tsr.distance(&grasp).distance, 0.0);
//! ```

use std::f64::consts::PI;

use nalgebra::Matrix4;
use rand::{Rng, RngCore};
use tracing::{debug, warn};

use crate::bounds;
use crate::minimizer::{BoundedMinimizer, MinimizerSettings, ProjectionFactor};
use crate::tsr_error::TsrError;
use crate::tsr_traits::{Bounds, Pose, Projection, TaskSpaceRegion, Xyzrpy, UNCONSTRAINED, ZERO_BOUNDS};
use crate::utils::{compose, invert, matrix_to_pose, pose_to_xyzrpy, wrap_angle, xyzrpy_to_pose, GEODESIC_ROTATION_WEIGHT};

#[derive(Debug, Clone, PartialEq)]
pub struct Tsr {
    /// Reference frame 0 to the displaced frame w
    t0_w: Pose,
    /// Displaced frame w to the end-effector frame e
    tw_e: Pose,
    /// Box in the chart of w, [min, max] per DOF
    bw: Bounds,
    /// Manipulator this constraint applies to. Not used by the geometry.
    manip_index: Option<usize>,
    /// Body and link the TSR is attached to. Not used by the geometry.
    link_reference: Option<String>,
}

impl Default for Tsr {
    /// Identity frames and zero box: a single-point constraint at the reference frame.
    fn default() -> Self {
        Tsr {
            t0_w: Pose::identity(),
            tw_e: Pose::identity(),
            bw: ZERO_BOUNDS,
            manip_index: None,
            link_reference: None,
        }
    }
}

impl Tsr {
    /// Creates the TSR, failing if the bounds are not finite, reversed, or a
    /// rotation range is wider than 2*PI.
    pub fn new(t0_w: Pose, tw_e: Pose, bw: Bounds) -> Result<Self, TsrError> {
        bounds::validate(&bw)?;
        Ok(Tsr { t0_w, tw_e, bw, ..Default::default() })
    }

    /// Creates the TSR from 4x4 homogeneous matrices, that must be rigid transforms.
    pub fn from_matrices(t0_w: &Matrix4<f64>, tw_e: &Matrix4<f64>, bw: Bounds) -> Result<Self, TsrError> {
        Tsr::new(matrix_to_pose(t0_w)?, matrix_to_pose(tw_e)?, bw)
    }

    pub fn with_manip_index(mut self, manip_index: Option<usize>) -> Self {
        self.manip_index = manip_index;
        self
    }

    pub fn with_link_reference(mut self, link_reference: Option<String>) -> Self {
        self.link_reference = link_reference;
        self
    }

    pub fn t0_w(&self) -> &Pose {
        &self.t0_w
    }

    pub fn tw_e(&self) -> &Pose {
        &self.tw_e
    }

    pub fn bw(&self) -> &Bounds {
        &self.bw
    }

    pub fn manip_index(&self) -> Option<usize> {
        self.manip_index
    }

    pub fn link_reference(&self) -> Option<&str> {
        self.link_reference.as_deref()
    }

    /// End-effector pose for the chart coordinates with `frame` in place of `T0_w`.
    /// Coordinates are not checked.
    pub(crate) fn transform_in_frame(&self, frame: &Pose, xyzrpy: &Xyzrpy) -> Pose {
        compose(&compose(frame, &xyzrpy_to_pose(xyzrpy)), &self.tw_e)
    }

    pub(crate) fn check_all(&self, xyzrpy: &Xyzrpy, ignore_nan: bool) -> [bool; 6] {
        bounds::check(&self.bw, xyzrpy, ignore_nan)
    }

    /// Same as `distance` but with the given solver tuning.
    pub fn distance_with(&self, pose: &Pose, settings: &MinimizerSettings) -> Projection<Xyzrpy> {
        let xyzrpy = self.to_xyzrpy(pose);
        if self.check_all(&xyzrpy, false).iter().all(|&ok| ok) {
            return Projection { distance: 0.0, xyzrpy, converged: true };
        }

        let factor = ProjectionFactor::new(self.t0_w, vec![self.tw_e], *pose, GEODESIC_ROTATION_WEIGHT);
        let solution = BoundedMinimizer::new(*settings).project(&factor, &[self.bw]);
        let closest = solution.xyzrpy.first().copied().unwrap_or_else(|| bounds::midpoint(&self.bw));
        if !solution.converged {
            warn!("TSR distance not converged, best distance {}", solution.distance);
        }
        debug!("TSR distance {} at {:?}", solution.distance, closest);

        Projection {
            distance: solution.distance,
            xyzrpy: closest,
            converged: solution.converged,
        }
    }

    /// Samples using the thread local random generator.
    pub fn sample_xyzrpy_random(&self, partial: Option<&Xyzrpy>) -> Result<Xyzrpy, TsrError> {
        self.sample_xyzrpy(partial, &mut rand::thread_rng())
    }
}

impl TaskSpaceRegion for Tsr {
    type Coordinates = Xyzrpy;
    type Validity = [bool; 6];
    type Containment = [bool; 6];

    /// Checks each of the six values against its bounds, with EPSILON tolerance.
    /// Never fails for a single TSR.
    fn is_valid(&self, xyzrpy: &Xyzrpy, ignore_nan: bool) -> Result<[bool; 6], TsrError> {
        Ok(self.check_all(xyzrpy, ignore_nan))
    }

    fn to_transform(&self, xyzrpy: &Xyzrpy) -> Result<Pose, TsrError> {
        let check = self.check_all(xyzrpy, false);
        if !check.iter().all(|&ok| ok) {
            return Err(TsrError::InvalidPose { check });
        }
        Ok(self.transform_in_frame(&self.t0_w, xyzrpy))
    }

    /// Of the two roll/pitch/yaw decompositions of the rotation, returns the one within
    /// the box, or the one closer to it if neither is.
    fn to_xyzrpy(&self, pose: &Pose) -> Xyzrpy {
        let tw = compose(&compose(&invert(&self.t0_w), pose), &invert(&self.tw_e));
        let principal = pose_to_xyzrpy(&tw);
        if self.check_all(&principal, false).iter().all(|&ok| ok) {
            return principal;
        }
        let [x, y, z, roll, pitch, yaw] = principal;
        let flipped = [x, y, z, wrap_angle(roll + PI), wrap_angle(PI - pitch), wrap_angle(yaw + PI)];
        if bounds::violation(&self.bw, &flipped) < bounds::violation(&self.bw, &principal) {
            flipped
        } else {
            principal
        }
    }

    fn sample_xyzrpy(&self, partial: Option<&Xyzrpy>, rng: &mut dyn RngCore) -> Result<Xyzrpy, TsrError> {
        let partial = partial.unwrap_or(&UNCONSTRAINED);
        let check = self.check_all(partial, true);
        if !check.iter().all(|&ok| ok) {
            return Err(TsrError::OutOfBounds { check });
        }
        Ok(std::array::from_fn(|i| {
            if partial[i].is_nan() {
                let [min, max] = self.bw[i];
                min + (max - min) * rng.r#gen::<f64>()
            } else {
                partial[i]
            }
        }))
    }

    fn distance(&self, pose: &Pose) -> Projection<Xyzrpy> {
        self.distance_with(pose, &MinimizerSettings::default())
    }

    fn contains(&self, pose: &Pose) -> [bool; 6] {
        self.check_all(&self.to_xyzrpy(pose), false)
    }
}
