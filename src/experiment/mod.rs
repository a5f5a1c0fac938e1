//! Experiment lineage model
//!
//! An experiment is one independent lineage tree of image steps. Step 0 is the
//! root image; every later step names an earlier step as its parent. The full
//! collection of experiments is the [`LineageLog`], the unit of persistence.

pub mod document;
pub mod id;
pub mod validate;

pub use validate::{validate, Violation};

use crate::error::ApiError;
use crate::types::{ExperimentId, StepIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One image in a lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the owning experiment's step sequence.
    pub index: StepIndex,
    /// Blob reference (URL) of the image.
    pub image_ref: String,
    /// Branch point this step was generated from; `None` only for the root.
    pub parent_index: Option<StepIndex>,
    /// Description that produced this image; `None` for the root.
    pub prompt: Option<String>,
}

impl Step {
    pub fn root(image_ref: impl Into<String>) -> Self {
        Self {
            index: 0,
            image_ref: image_ref.into(),
            parent_index: None,
            prompt: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }
}

/// One lineage tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<Step>,
}

impl Experiment {
    /// Create an experiment holding only its root step.
    pub fn new(
        id: ExperimentId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
        root_image_ref: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            created_at,
            steps: vec![Step::root(root_image_ref)],
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: StepIndex) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Check that `parent_index` names an existing step.
    pub fn check_parent(&self, parent_index: StepIndex) -> Result<(), ApiError> {
        if parent_index < self.steps.len() {
            Ok(())
        } else {
            Err(ApiError::InvalidParent {
                experiment_id: self.id.clone(),
                parent_index,
                step_count: self.steps.len(),
            })
        }
    }

    /// Append a step branching from `parent_index`.
    ///
    /// The new step takes the next index, so its parent always precedes it.
    /// Existing steps are never touched.
    pub fn append_step(
        &mut self,
        image_ref: impl Into<String>,
        parent_index: StepIndex,
        prompt: Option<String>,
    ) -> Result<Step, ApiError> {
        self.check_parent(parent_index)?;
        let step = Step {
            index: self.steps.len(),
            image_ref: image_ref.into(),
            parent_index: Some(parent_index),
            prompt,
        };
        self.steps.push(step.clone());
        Ok(step)
    }

    /// Indices of steps whose parent is `index`.
    pub fn children_of(&self, index: StepIndex) -> Vec<StepIndex> {
        self.steps
            .iter()
            .filter(|s| s.parent_index == Some(index))
            .map(|s| s.index)
            .collect()
    }

    pub fn summary(&self) -> ExperimentSummary {
        ExperimentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            step_count: self.steps.len(),
            created_at: self.created_at,
        }
    }
}

/// Listing projection of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: ExperimentId,
    pub name: String,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Ordered collection of every experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineageLog {
    pub experiments: Vec<Experiment>,
}

impl LineageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_experiments(experiments: Vec<Experiment>) -> Self {
        Self { experiments }
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    pub fn contains_id(&self, id: &ExperimentId) -> bool {
        self.experiments.iter().any(|e| &e.id == id)
    }

    pub fn find(&self, id: &ExperimentId) -> Option<&Experiment> {
        self.experiments.iter().find(|e| &e.id == id)
    }

    pub fn find_mut(&mut self, id: &ExperimentId) -> Option<&mut Experiment> {
        self.experiments.iter_mut().find(|e| &e.id == id)
    }

    pub fn get(&self, id: &ExperimentId) -> Result<&Experiment, ApiError> {
        self.find(id).ok_or_else(|| ApiError::NotFound(id.clone()))
    }

    pub fn get_mut(&mut self, id: &ExperimentId) -> Result<&mut Experiment, ApiError> {
        self.find_mut(id).ok_or_else(|| ApiError::NotFound(id.clone()))
    }

    /// Append a new experiment with a fresh id that is unique within this log.
    pub fn create_experiment(
        &mut self,
        name: impl Into<String>,
        root_image_ref: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Experiment {
        let id = id::unique_experiment_id(self);
        let experiment = Experiment::new(id, name, created_at, root_image_ref);
        self.experiments.push(experiment.clone());
        experiment
    }

    pub fn summaries(&self) -> Vec<ExperimentSummary> {
        self.experiments.iter().map(Experiment::summary).collect()
    }

    pub fn total_steps(&self) -> usize {
        self.experiments.iter().map(|e| e.steps.len()).sum()
    }
}
