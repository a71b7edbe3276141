//! Shared types and the common interface of a single TSR and a TSR chain.

extern crate nalgebra as na;

use na::Isometry3;
use rand::RngCore;

use crate::tsr_error::TsrError;

/// Pose is a rigid transform, containing both Cartesian position and rotation quaternion.
/// ```
/// extern crate nalgebra as na;
/// use na::{Isometry3, Translation3, UnitQuaternion};
///
/// type Pose = Isometry3<f64>;
///
/// let translation = Translation3::new(1.0, 0.0, 0.0);
/// let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
/// let transform = Pose::from_parts(translation, rotation);
/// ```
pub type Pose = Isometry3<f64>;

/// Local chart coordinate of a TSR: [x, y, z, roll, pitch, yaw], meters and radians.
/// Any of the values may be NaN, meaning "unconstrained" when sampling.
pub type Xyzrpy = [f64; 6];

/// Bounds of the TSR box, [min, max] for each of x, y, z, roll, pitch, yaw.
pub type Bounds = [[f64; 2]; 6];

/// Tolerance used when checking chart values against the bounds, so that
/// round-off at the boundary of the box (and zero-width bounds) is accepted.
pub const EPSILON: f64 = 0.001;

/// All six DOF unconstrained, sample everything.
pub const UNCONSTRAINED: Xyzrpy = [f64::NAN; 6];

/// Zero-width box at the origin, a single-point constraint.
pub const ZERO_BOUNDS: Bounds = [[0.0, 0.0]; 6];

/// Result of projecting a pose onto a TSR or TSR chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<C> {
    /// Geodesic distance from the pose to the closest point found.
    pub distance: f64,
    /// Chart coordinates of the closest point found.
    pub xyzrpy: C,
    /// False if the solver failed. The reported point is still the best one found.
    pub converged: bool,
}

/// Operations common to a single TSR and a TSR chain.
///
/// For a [`crate::tsr::Tsr`] the coordinates are a single [`Xyzrpy`], for a
/// [`crate::tsr_chain::TsrChain`] a list of them, one per chain element.
pub trait TaskSpaceRegion {
    /// Chart coordinates parameterizing poses of this region.
    type Coordinates;
    /// Per-DOF check results for the given coordinates.
    type Validity;
    /// What `contains` reports.
    type Containment;

    /// Checks if the coordinates are a valid sample. If `ignore_nan` is set, NaN
    /// (unconstrained) values are reported as valid.
    fn is_valid(&self, xyzrpy: &Self::Coordinates, ignore_nan: bool) -> Result<Self::Validity, TsrError>;

    /// Converts chart coordinates into the end-effector transform.
    fn to_transform(&self, xyzrpy: &Self::Coordinates) -> Result<Pose, TsrError>;

    /// Converts the end-effector transform into chart coordinates.
    fn to_xyzrpy(&self, pose: &Pose) -> Self::Coordinates;

    /// Samples chart coordinates, drawing NaN values uniformly from the bounds and keeping
    /// provided values (that must be within the bounds). `None` samples everything.
    fn sample_xyzrpy(&self, partial: Option<&Self::Coordinates>, rng: &mut dyn RngCore)
        -> Result<Self::Coordinates, TsrError>;

    /// Samples the end-effector transform, see `sample_xyzrpy`.
    fn sample(&self, partial: Option<&Self::Coordinates>, rng: &mut dyn RngCore) -> Result<Pose, TsrError> {
        let xyzrpy = self.sample_xyzrpy(partial, rng)?;
        self.to_transform(&xyzrpy)
    }

    /// Geodesic distance from the pose to the region, with the closest chart coordinates.
    fn distance(&self, pose: &Pose) -> Projection<Self::Coordinates>;

    /// Checks if the region contains the pose.
    fn contains(&self, pose: &Pose) -> Self::Containment;
}
