//! Projection of a pose onto the box of chart coordinates, as a bounded least-squares
//! problem solved by tiny-solver.
//!
//! The residual is the 6-vector `[Δt; r * log(Ra⁻¹ Rb)]` between the folded end-effector
//! pose and the target, so its norm is the geodesic distance. Each chain element is one
//! 6-parameter block, bounded by its `Bw`. Zero-width DOFs are fixed. The solver starts
//! from the box midpoints and uses Levenberg-Marquardt with automatic differentiation.

use std::collections::HashMap;

use nalgebra::{convert, DVector, Isometry3, Quaternion, RealField, Translation3, UnitQuaternion, Vector3};
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;
use tracing::{debug, warn};

use crate::bounds;
use crate::tsr_traits::{Bounds, Pose, Xyzrpy};

/// Tuning of the solver, mapped onto tiny-solver's optimizer options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerSettings {
    pub max_iterations: usize,
    /// Stop when the cost decreases by less than this.
    pub min_abs_decrease: f64,
    /// Stop when the cost decreases by less than this fraction.
    pub min_rel_decrease: f64,
    /// Stop when the cost (half the squared distance) drops below this.
    pub min_error: f64,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        MinimizerSettings {
            max_iterations: 100,
            min_abs_decrease: 1e-16,
            min_rel_decrease: 1e-12,
            min_error: 1e-16,
        }
    }
}

impl MinimizerSettings {
    fn to_optimizer_options(self) -> OptimizerOptions {
        let mut options = OptimizerOptions::default();
        options.max_iteration = self.max_iterations;
        options.min_abs_error_decrease_threshold = self.min_abs_decrease;
        options.min_rel_error_decrease_threshold = self.min_rel_decrease;
        options.min_error_threshold = self.min_error;
        options
    }
}

/// Residual between the chain end-effector and the target pose.
#[derive(Debug, Clone)]
pub struct ProjectionFactor {
    /// Reference frame of the first element
    first_frame: Pose,
    /// `Tw_e` of each element
    offsets: Vec<Pose>,
    target: Pose,
    rotation_weight: f64,
}

impl ProjectionFactor {
    pub fn new(first_frame: Pose, offsets: Vec<Pose>, target: Pose, rotation_weight: f64) -> Self {
        ProjectionFactor { first_frame, offsets, target, rotation_weight }
    }

    fn residual_generic<T: RealField>(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), self.offsets.len(), "expected one block per chain element");
        let mut frame = cast_pose::<T>(&self.first_frame);
        for (offset, b) in self.offsets.iter().zip(params) {
            let chart = Isometry3::from_parts(
                Translation3::new(b[0].clone(), b[1].clone(), b[2].clone()),
                UnitQuaternion::from_euler_angles(b[3].clone(), b[4].clone(), b[5].clone()),
            );
            frame = frame * chart * cast_pose::<T>(offset);
        }

        let target = cast_pose::<T>(&self.target);
        let dt = target.translation.vector - frame.translation.vector;
        let rotation = rotation_log(&(frame.rotation.inverse() * target.rotation)) * convert::<f64, T>(self.rotation_weight);
        DVector::from_vec(vec![
            dt[0].clone(), dt[1].clone(), dt[2].clone(),
            rotation[0].clone(), rotation[1].clone(), rotation[2].clone(),
        ])
    }

    /// Geodesic distance for the given chart coordinates of all elements.
    pub fn distance(&self, xyzrpy: &[Xyzrpy]) -> f64 {
        let params: Vec<DVector<f64>> = xyzrpy.iter().map(|b| DVector::from_column_slice(b)).collect();
        self.residual_generic::<f64>(&params).norm()
    }
}

impl<T: RealField> Factor<T> for ProjectionFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        self.residual_generic(params)
    }
}

fn cast_pose<T: RealField>(pose: &Pose) -> Isometry3<T> {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    Isometry3::from_parts(
        Translation3::new(convert(t.x), convert(t.y), convert(t.z)),
        UnitQuaternion::new_unchecked(Quaternion::new(convert(q.w), convert(q.i), convert(q.j), convert(q.k))),
    )
}

/// Rotation vector (axis * angle) of the unit quaternion, angle within [0, PI].
fn rotation_log<T: RealField>(q: &UnitQuaternion<T>) -> Vector3<T> {
    let (w, v) = (q.scalar(), q.vector().clone_owned());
    let (w, v) = if w < T::zero() { (-w, -v) } else { (w, v) };
    // First order near identity, where the norm below has no derivative
    if v.norm_squared() < convert(1e-24) {
        return v * convert::<f64, T>(2.0);
    }
    let sin_half = v.norm();
    let angle = sin_half.clone().atan2(w) * convert::<f64, T>(2.0);
    v * (angle / sin_half)
}

/// Outcome of the projection: the closest chart coordinates found, always within the boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub xyzrpy: Vec<Xyzrpy>,
    pub distance: f64,
    /// False if the solver failed. The point is then the best one known.
    pub converged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BoundedMinimizer {
    pub settings: MinimizerSettings,
}

fn block_name(i: usize) -> String {
    format!("xyzrpy{}", i)
}

impl BoundedMinimizer {
    pub fn new(settings: MinimizerSettings) -> Self {
        BoundedMinimizer { settings }
    }

    /// Finds chart coordinates within `boxes` (one per element of the factor)
    /// minimizing the distance to the factor's target.
    pub fn project(&self, factor: &ProjectionFactor, boxes: &[Bounds]) -> Solution {
        debug_assert_eq!(factor.offsets.len(), boxes.len());
        let start: Vec<Xyzrpy> = boxes.iter().map(bounds::midpoint).collect();
        let start_distance = factor.distance(&start);

        let mut problem = Problem::new();
        let mut free = 0;
        for (i, bw) in boxes.iter().enumerate() {
            let name = block_name(i);
            let (lower, upper) = bounds::corners(bw);
            for dof in 0..6 {
                if upper[dof] <= lower[dof] {
                    problem.fix_variable(&name, dof);
                } else {
                    problem.set_variable_bounds(&name, dof, lower[dof], upper[dof]);
                    free += 1;
                }
            }
        }
        if free == 0 {
            return Solution { xyzrpy: start, distance: start_distance, converged: true };
        }

        let names: Vec<String> = (0..boxes.len()).map(block_name).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        problem.add_residual_block(6, &name_refs, Box::new(factor.clone()), None);

        let initial: HashMap<String, DVector<f64>> = names
            .iter()
            .zip(&start)
            .map(|(name, b)| (name.clone(), DVector::from_column_slice(b)))
            .collect();

        let optimizer = LevenbergMarquardtOptimizer::default();
        let Some(solved) = optimizer.optimize(&problem, &initial, Some(self.settings.to_optimizer_options())) else {
            warn!("Projection solver failed, keeping the box center at distance {}", start_distance);
            return Solution { xyzrpy: start, distance: start_distance, converged: false };
        };

        // Clamped again so the point is feasible whatever the solver's bound handling
        let xyzrpy: Vec<Xyzrpy> = names
            .iter()
            .zip(boxes)
            .zip(&start)
            .map(|((name, bw), fallback)| match solved.get(name) {
                Some(x) if x.len() == 6 => std::array::from_fn(|k| x[k].clamp(bw[k][0], bw[k][1])),
                _ => *fallback,
            })
            .collect();
        let distance = factor.distance(&xyzrpy);
        debug!("Projection from distance {} to {} over {} free DOFs", start_distance, distance, free);

        if distance <= start_distance {
            Solution { xyzrpy, distance, converged: true }
        } else {
            warn!("Projection solver ended further away ({}) than it started ({})", distance, start_distance);
            Solution { xyzrpy: start, distance: start_distance, converged: false }
        }
    }
}
