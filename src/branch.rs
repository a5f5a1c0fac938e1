//! Random branch-point selection
//!
//! New participants are dropped onto a uniformly random existing step of an
//! experiment and describe it; their description becomes a child of that step.

use crate::error::ApiError;
use crate::experiment::{Experiment, Step};
use crate::types::{ExperimentId, StepIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A step chosen as the parent for the next generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPoint {
    pub experiment_id: ExperimentId,
    pub index: StepIndex,
    pub step: Step,
}

/// Pick a step uniformly at random: every index in `[0, len)` has probability `1/len`.
pub fn pick_random_branch_point<R: Rng + ?Sized>(
    experiment: &Experiment,
    rng: &mut R,
) -> Result<BranchPoint, ApiError> {
    if experiment.steps.is_empty() {
        return Err(ApiError::EmptyExperiment(experiment.id.clone()));
    }
    let index = rng.random_range(0..experiment.steps.len());
    Ok(BranchPoint {
        experiment_id: experiment.id.clone(),
        index,
        step: experiment.steps[index].clone(),
    })
}
