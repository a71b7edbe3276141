//! Task Space Regions (TSRs) and TSR chains for describing sets of allowed end-effector
//! poses in manipulation planning: grasping, placement and articulated constraints like
//! doors and drawers.
//!
//! A TSR is a reference frame `T0_w`, an end-effector offset `Tw_e` and a box `Bw` in
//! the xyz + roll/pitch/yaw chart of `w`. A chain composes several TSRs, each using the
//! output of the previous one as its reference frame.
//!
//! # Features
//!
//! - Forward map from chart coordinates to poses, and back from poses to chart coordinates.
//! - Containment checks, with rotation bounds honored modulo 2*PI.
//! - Uniform sampling, optionally with some of the coordinates fixed.
//! - Geodesic distance from a pose to the region, with the closest chart point, computed
//!   as bounded Levenberg-Marquardt least squares with tiny-solver.
//! - JSON and YAML record format, compatible with the dictionaries used by
//!   OpenRAVE-style planners (`T0_w`, `Tw_e`, `Bw`, `manipindex`, `bodyandlink`).
//!
//! ## Conventions
//!
//! Transforms are `nalgebra::Isometry3<f64>`. Chart coordinates are `[x, y, z, roll, pitch, yaw]`
//! with rotation `Rz(yaw) * Ry(pitch) * Rx(roll)`. NaN in a chart vector means "not given".

pub mod tsr_traits;
pub mod tsr_error;

#[path = "utils/utils.rs"]
pub mod utils;

pub mod bounds;
pub mod minimizer;

pub mod tsr;
pub mod tsr_chain;

pub mod tsr_from_file;
