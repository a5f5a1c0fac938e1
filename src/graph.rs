//! Node/edge projection of the lineage log for visualization.
//!
//! Pure function of the log: one node per step, one edge per parent link. The
//! projection is recomputed on every read and never persisted.

use crate::experiment::Experiment;
use crate::types::{ExperimentId, StepIndex};
use serde::{Serialize, Serializer};
use std::fmt;

const ROOT_NODE_WEIGHT: u32 = 30;
const STEP_NODE_WEIGHT: u32 = 15;

/// Graph-wide node identity: `(experiment_id, step_index)`.
///
/// Serializes as `"{experiment_id}-{step_index}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub experiment_id: ExperimentId,
    pub step_index: StepIndex,
}

impl NodeKey {
    pub fn new(experiment_id: ExperimentId, step_index: StepIndex) -> Self {
        Self {
            experiment_id,
            step_index,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.experiment_id, self.step_index)
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: NodeKey,
    pub image_ref: String,
    pub label: String,
    /// Size hint for renderers; roots are drawn larger.
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: NodeKey,
    pub target: NodeKey,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineageGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Project experiments into a node/edge graph.
pub fn project_graph<'a, I>(experiments: I) -> LineageGraph
where
    I: IntoIterator<Item = &'a Experiment>,
{
    let mut graph = LineageGraph::default();

    for experiment in experiments {
        for (index, step) in experiment.steps.iter().enumerate() {
            let key = NodeKey::new(experiment.id.clone(), index);
            graph.nodes.push(GraphNode {
                id: key.clone(),
                image_ref: step.image_ref.clone(),
                label: format!("Step {}", index),
                weight: if index == 0 {
                    ROOT_NODE_WEIGHT
                } else {
                    STEP_NODE_WEIGHT
                },
            });

            if let Some(parent) = step.parent_index {
                graph.edges.push(GraphEdge {
                    source: NodeKey::new(experiment.id.clone(), parent),
                    target: key,
                    label: step.prompt.clone(),
                });
            }
        }
    }

    graph
}
