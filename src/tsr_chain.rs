//! TSR chain: ordered composition of TSRs, where the reference frame of each TSR is the
//! end-effector pose produced by the previous one. Expresses compound constraints like
//! approach followed by grasp, or a door handle rotating around the hinge.
//!
//! Chain elements are not modified when the chain is evaluated. The reference frames
//! each element effectively used are returned by [`TsrChain::fold`].

use rand::RngCore;
use tracing::{debug, warn};

use crate::minimizer::{BoundedMinimizer, MinimizerSettings, ProjectionFactor};
use crate::tsr::Tsr;
use crate::tsr_error::TsrError;
use crate::tsr_traits::{Pose, Projection, TaskSpaceRegion, Xyzrpy, EPSILON, UNCONSTRAINED};
use crate::utils::{geodesic_distance, GEODESIC_ROTATION_WEIGHT};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TsrChain {
    /// Apply the chain when sampling the start configuration
    pub sample_start: bool,
    /// Apply the chain when sampling the goal configuration
    pub sample_goal: bool,
    /// Apply the chain over the whole trajectory
    pub constrain: bool,
    /// Body whose joints mimic the chain parameters. Passed through to the planner.
    pub mimic_body_name: Option<String>,
    /// 0-based indices of the mimicking joints, increasing and consecutive.
    pub mimic_body_joints: Vec<usize>,
    tsrs: Vec<Tsr>,
}

/// Outcome of folding chart coordinates through the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTransform {
    /// End-effector pose of the last element.
    pub transform: Pose,
    /// Reference frame used by each element: the first TSR's own `T0_w`, then the
    /// output of the previous element.
    pub frames: Vec<Pose>,
}

impl TsrChain {
    pub fn new(sample_start: bool, sample_goal: bool, constrain: bool) -> Self {
        TsrChain { sample_start, sample_goal, constrain, ..Default::default() }
    }

    pub fn with_tsr(mut self, tsr: Tsr) -> Self {
        self.append(tsr);
        self
    }

    pub fn with_tsrs(mut self, tsrs: impl IntoIterator<Item = Tsr>) -> Self {
        self.tsrs.extend(tsrs);
        self
    }

    pub fn with_mimic_body(mut self, name: impl Into<String>, joints: Vec<usize>) -> Self {
        self.mimic_body_name = Some(name.into());
        self.mimic_body_joints = joints;
        self
    }

    /// Adds the TSR to the end of the chain.
    pub fn append(&mut self, tsr: Tsr) {
        self.tsrs.push(tsr);
    }

    pub fn tsrs(&self) -> &[Tsr] {
        &self.tsrs
    }

    pub fn len(&self) -> usize {
        self.tsrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tsrs.is_empty()
    }

    fn check_length(&self, found: usize) -> Result<(), TsrError> {
        if found != self.tsrs.len() {
            return Err(TsrError::ChainLength { expected: self.tsrs.len(), found });
        }
        Ok(())
    }

    /// Validates the coordinates and folds them through the chain left to right,
    /// returning the final pose together with the reference frame of every element.
    /// An empty chain produces the identity.
    pub fn fold(&self, xyzrpy: &[Xyzrpy]) -> Result<ChainTransform, TsrError> {
        let check = self.is_valid_slice(xyzrpy, false)?;
        let failed: Vec<usize> = check
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.iter().all(|&ok| ok))
            .map(|(i, _)| i)
            .collect();
        if !failed.is_empty() {
            return Err(TsrError::InvalidChainPose { failed, check });
        }

        let mut frames = Vec::with_capacity(self.tsrs.len());
        let mut frame = self.first_frame();
        for (tsr, b) in self.tsrs.iter().zip(xyzrpy) {
            frames.push(frame);
            frame = tsr.transform_in_frame(&frame, b);
        }
        Ok(ChainTransform { transform: frame, frames })
    }

    fn first_frame(&self) -> Pose {
        self.tsrs.first().map_or_else(Pose::identity, |tsr| *tsr.t0_w())
    }

    fn is_valid_slice(&self, xyzrpy: &[Xyzrpy], ignore_nan: bool) -> Result<Vec<[bool; 6]>, TsrError> {
        self.check_length(xyzrpy.len())?;
        Ok(self
            .tsrs
            .iter()
            .zip(xyzrpy)
            .map(|(tsr, b)| tsr.check_all(b, ignore_nan))
            .collect())
    }

    /// Same as `distance` but with the given solver tuning.
    pub fn distance_with(&self, pose: &Pose, settings: &MinimizerSettings) -> Projection<Vec<Xyzrpy>> {
        if self.tsrs.is_empty() {
            return Projection {
                distance: geodesic_distance(&Pose::identity(), pose, GEODESIC_ROTATION_WEIGHT),
                xyzrpy: Vec::new(),
                converged: true,
            };
        }

        let factor = ProjectionFactor::new(
            self.first_frame(),
            self.tsrs.iter().map(|tsr| *tsr.tw_e()).collect(),
            *pose,
            GEODESIC_ROTATION_WEIGHT,
        );
        let boxes: Vec<_> = self.tsrs.iter().map(|tsr| *tsr.bw()).collect();
        let solution = BoundedMinimizer::new(*settings).project(&factor, &boxes);
        if !solution.converged {
            warn!("TSR chain distance not converged, best distance {}", solution.distance);
        }
        debug!("TSR chain of {} distance {}", self.tsrs.len(), solution.distance);

        Projection {
            distance: solution.distance,
            xyzrpy: solution.xyzrpy,
            converged: solution.converged,
        }
    }

    /// Samples using the thread local random generator.
    pub fn sample_xyzrpy_random(&self, partial: Option<&Vec<Xyzrpy>>) -> Result<Vec<Xyzrpy>, TsrError> {
        self.sample_xyzrpy(partial, &mut rand::thread_rng())
    }
}

impl TaskSpaceRegion for TsrChain {
    type Coordinates = Vec<Xyzrpy>;
    type Validity = Vec<[bool; 6]>;
    type Containment = bool;

    /// Element-wise check. Fails if the number of coordinates differs from the chain length.
    fn is_valid(&self, xyzrpy: &Vec<Xyzrpy>, ignore_nan: bool) -> Result<Vec<[bool; 6]>, TsrError> {
        self.is_valid_slice(xyzrpy, ignore_nan)
    }

    fn to_transform(&self, xyzrpy: &Vec<Xyzrpy>) -> Result<Pose, TsrError> {
        Ok(self.fold(xyzrpy)?.transform)
    }

    /// The closest chart coordinates found by `distance`.
    fn to_xyzrpy(&self, pose: &Pose) -> Vec<Xyzrpy> {
        self.distance(pose).xyzrpy
    }

    fn sample_xyzrpy(&self, partial: Option<&Vec<Xyzrpy>>, rng: &mut dyn RngCore)
        -> Result<Vec<Xyzrpy>, TsrError> {
        match partial {
            Some(partial) => {
                self.check_length(partial.len())?;
                self.tsrs
                    .iter()
                    .zip(partial)
                    .map(|(tsr, b)| tsr.sample_xyzrpy(Some(b), rng))
                    .collect()
            }
            None => self
                .tsrs
                .iter()
                .map(|tsr| tsr.sample_xyzrpy(Some(&UNCONSTRAINED), rng))
                .collect(),
        }
    }

    /// Jointly optimizes the coordinates of all elements, starting from the box centers.
    fn distance(&self, pose: &Pose) -> Projection<Vec<Xyzrpy>> {
        self.distance_with(pose, &MinimizerSettings::default())
    }

    fn contains(&self, pose: &Pose) -> bool {
        self.distance(pose).distance.abs() < EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsr_traits::ZERO_BOUNDS;
    use crate::utils::{assert_pose_eq, xyzrpy_to_pose};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    /// Hand sliding along a bar, then rotating around its own approach axis.
    fn slide_and_turn() -> TsrChain {
        let mut slide = ZERO_BOUNDS;
        slide[0] = [-0.2, 0.2];
        let bar = Tsr::new(
            xyzrpy_to_pose(&[0.6, 0.1, 0.9, 0.0, 0.0, PI / 4.0]),
            xyzrpy_to_pose(&[0.0, 0.0, 0.05, 0.0, 0.0, 0.0]),
            slide,
        ).expect("valid bounds");

        let mut turn = ZERO_BOUNDS;
        turn[5] = [-0.5, 0.5];
        let hand = Tsr::new(
            Pose::identity(),
            xyzrpy_to_pose(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]),
            turn,
        ).expect("valid bounds");

        TsrChain::new(false, true, false).with_tsr(bar).with_tsr(hand)
    }

    #[test]
    fn test_fold_matches_manual_composition() {
        let chain = slide_and_turn();
        let b1 = [0.1, 0.0, 0.0, 0.0, 0.0, 0.0];
        let b2 = [0.0, 0.0, 0.0, 0.0, 0.0, -0.3];

        let first = &chain.tsrs()[0];
        let second = &chain.tsrs()[1];
        let t1 = first.to_transform(&b1).expect("valid");
        let manual = t1 * xyzrpy_to_pose(&b2) * second.tw_e();

        let folded = chain.fold(&[b1, b2]).expect("valid");
        assert_pose_eq(&folded.transform, &manual, 1e-12, 1e-12);
        assert_eq!(folded.frames.len(), 2);
        assert_eq!(folded.frames[0], *first.t0_w());
        assert_pose_eq(&folded.frames[1], &t1, 1e-12, 1e-12);

        let transform = chain.to_transform(&vec![b1, b2]).expect("valid");
        assert_eq!(transform, folded.transform);

        // Elements are not modified by evaluation
        assert_eq!(*chain.tsrs()[1].t0_w(), Pose::identity());
    }

    #[test]
    fn test_is_valid_length_mismatch() {
        let chain = slide_and_turn();
        let result = chain.is_valid(&vec![[0.0; 6]], false);
        assert!(matches!(result, Err(TsrError::ChainLength { expected: 2, found: 1 })));
        assert!(chain.to_transform(&vec![[0.0; 6]; 3]).is_err());
    }

    #[test]
    fn test_to_transform_lists_failed_elements() {
        let chain = slide_and_turn();
        let result = chain.to_transform(&vec![[0.0; 6], [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]]);
        match result {
            Err(TsrError::InvalidChainPose { failed, check }) => {
                assert_eq!(failed, vec![1]);
                assert_eq!(check[1], [true, true, true, true, true, false]);
            }
            other => panic!("Expected InvalidChainPose, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_valid() {
        let chain = slide_and_turn();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let sample = chain.sample_xyzrpy(None, &mut rng).expect("sampling");
            let check = chain.is_valid(&sample, false).expect("same length");
            assert!(check.iter().all(|c| c.iter().all(|&ok| ok)));
        }
    }

    #[test]
    fn test_sample_partial() {
        let chain = slide_and_turn();
        let mut rng = StdRng::seed_from_u64(5);
        let partial = vec![[0.15, 0.0, 0.0, 0.0, 0.0, 0.0], UNCONSTRAINED];
        let sample = chain.sample_xyzrpy(Some(&partial), &mut rng).expect("sampling");
        assert_eq!(sample[0], partial[0]);
        assert!(sample[1][5] >= -0.5 && sample[1][5] <= 0.5);

        assert!(matches!(
            chain.sample_xyzrpy(Some(&vec![UNCONSTRAINED]), &mut rng),
            Err(TsrError::ChainLength { .. })
        ));
        let outside = vec![[0.5, 0.0, 0.0, 0.0, 0.0, 0.0], UNCONSTRAINED];
        assert!(matches!(
            chain.sample_xyzrpy(Some(&outside), &mut rng),
            Err(TsrError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_distance_of_sample() {
        let chain = slide_and_turn();
        let mut rng = StdRng::seed_from_u64(17);
        let sample = chain.sample_xyzrpy(None, &mut rng).expect("sampling");
        let pose = chain.to_transform(&sample).expect("valid");

        let projection = chain.distance(&pose);
        assert!(projection.distance < 1e-4, "{}", projection.distance);
        assert_eq!(projection.xyzrpy.len(), 2);
        assert!((projection.xyzrpy[0][0] - sample[0][0]).abs() < 1e-3);
        assert!((projection.xyzrpy[1][5] - sample[1][5]).abs() < 1e-3);
        assert!(chain.contains(&pose));
        assert_eq!(chain.to_xyzrpy(&pose), projection.xyzrpy);
    }

    #[test]
    fn test_distance_outside() {
        let chain = slide_and_turn();
        let far = xyzrpy_to_pose(&[3.0, -2.0, 0.0, 0.0, 0.0, 0.0]);
        let projection = chain.distance(&far);
        assert!(projection.distance > 1.0);
        assert!(!chain.contains(&far));

        let folded = chain.to_transform(&projection.xyzrpy).expect("projection is within bounds");
        let reported = geodesic_distance(&folded, &far, GEODESIC_ROTATION_WEIGHT);
        assert!((reported - projection.distance).abs() < 1e-9);
    }

    #[test]
    fn test_flags_and_mimic_body() {
        let chain = TsrChain::new(true, false, true).with_mimic_body("door", vec![0, 1]);
        assert!(chain.sample_start);
        assert!(!chain.sample_goal);
        assert!(chain.constrain);
        assert_eq!(chain.mimic_body_name.as_deref(), Some("door"));
        assert_eq!(chain.mimic_body_joints, vec![0, 1]);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_empty_chain() {
        let chain = TsrChain::default();
        assert_eq!(chain.to_transform(&Vec::new()).expect("empty"), Pose::identity());
        let target = xyzrpy_to_pose(&[0.0, 0.0, 2.0, 0.0, 0.0, 0.0]);
        let projection = chain.distance(&target);
        assert!((projection.distance - 2.0).abs() < 1e-12);
        assert!(projection.xyzrpy.is_empty());
    }
}
