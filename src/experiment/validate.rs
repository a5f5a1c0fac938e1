//! Structural integrity checks for a single experiment.
//!
//! Not used on the hot path; the append API cannot produce violations. Decoding
//! a persisted document runs these checks so a hand-edited or foreign document
//! fails closed, and the integrity report runs them over an unchecked load.

use crate::experiment::Experiment;
use crate::types::StepIndex;
use serde::Serialize;
use std::fmt;

/// A broken lineage invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The experiment holds no steps at all.
    Empty,
    /// Step 0 names a parent.
    RootHasParent { parent_index: StepIndex },
    /// Step 0 carries a prompt.
    RootHasPrompt,
    /// A non-root step has no parent.
    MissingParent { index: StepIndex },
    /// A step's parent does not strictly precede it.
    ParentNotBefore {
        index: StepIndex,
        parent_index: StepIndex,
    },
    /// A step's recorded index does not match its position.
    IndexGap {
        position: usize,
        index: StepIndex,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Empty => write!(f, "experiment has no steps"),
            Violation::RootHasParent { parent_index } => {
                write!(f, "root step has parent {}", parent_index)
            }
            Violation::RootHasPrompt => write!(f, "root step has a prompt"),
            Violation::MissingParent { index } => {
                write!(f, "step {} has no parent", index)
            }
            Violation::ParentNotBefore {
                index,
                parent_index,
            } => write!(
                f,
                "step {} references parent {} which does not precede it",
                index, parent_index
            ),
            Violation::IndexGap { position, index } => {
                write!(f, "step at position {} records index {}", position, index)
            }
        }
    }
}

/// Check root, parent-precedes-child and index contiguity.
///
/// Returns every violation found; an empty vector means the experiment is sound.
pub fn validate(experiment: &Experiment) -> Vec<Violation> {
    let mut violations = Vec::new();

    let Some(root) = experiment.steps.first() else {
        violations.push(Violation::Empty);
        return violations;
    };

    if let Some(parent_index) = root.parent_index {
        violations.push(Violation::RootHasParent { parent_index });
    }
    if root.prompt.is_some() {
        violations.push(Violation::RootHasPrompt);
    }

    for (position, step) in experiment.steps.iter().enumerate() {
        if step.index != position {
            violations.push(Violation::IndexGap {
                position,
                index: step.index,
            });
        }
        if position == 0 {
            continue;
        }
        match step.parent_index {
            None => violations.push(Violation::MissingParent { index: position }),
            Some(parent_index) if parent_index >= position => {
                violations.push(Violation::ParentNotBefore {
                    index: position,
                    parent_index,
                })
            }
            Some(_) => {}
        }
    }

    violations
}
