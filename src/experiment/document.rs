//! Persisted lineage document
//!
//! The whole [`LineageLog`] is stored as one JSON array:
//!
//! ```json
//! [ { "id": "...", "experiment_name": "...", "created_at": "2024-05-01T10:00:00Z",
//!     "images": [ { "url": "...", "source": null, "prompt": null }, ... ] } ]
//! ```
//!
//! `images[i]` is step `i`, `source` is its parent index. Decoding fails closed:
//! unknown fields, wrong types, broken lineage invariants and duplicate ids all
//! reject the whole document. [`decode_unchecked`] stops short of the lineage
//! checks for integrity reporting.

use crate::error::ApiError;
use crate::experiment::{validate, Experiment, LineageLog, Step};
use crate::types::{ExperimentId, StepIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentRecord {
    id: String,
    experiment_name: String,
    created_at: DateTime<Utc>,
    images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageRecord {
    url: String,
    source: Option<StepIndex>,
    prompt: Option<String>,
}

impl From<&Experiment> for ExperimentRecord {
    fn from(experiment: &Experiment) -> Self {
        Self {
            id: experiment.id.to_string(),
            experiment_name: experiment.name.clone(),
            created_at: experiment.created_at,
            images: experiment
                .steps
                .iter()
                .map(|step| ImageRecord {
                    url: step.image_ref.clone(),
                    source: step.parent_index,
                    prompt: step.prompt.clone(),
                })
                .collect(),
        }
    }
}

impl From<ExperimentRecord> for Experiment {
    fn from(record: ExperimentRecord) -> Self {
        Experiment {
            id: ExperimentId::new(record.id),
            name: record.experiment_name,
            created_at: record.created_at,
            steps: record
                .images
                .into_iter()
                .enumerate()
                .map(|(index, image)| Step {
                    index,
                    image_ref: image.url,
                    parent_index: image.source,
                    prompt: image.prompt,
                })
                .collect(),
        }
    }
}

/// Serialize the log to its persisted JSON form (2-space indented).
pub fn encode(log: &LineageLog) -> Result<Vec<u8>, ApiError> {
    let records: Vec<ExperimentRecord> = log.experiments.iter().map(Into::into).collect();
    serde_json::to_vec_pretty(&records)
        .map_err(|e| ApiError::CorruptDocument(format!("Failed to serialize lineage log: {}", e)))
}

/// Deserialize and integrity-check a persisted document.
pub fn decode(bytes: &[u8]) -> Result<LineageLog, ApiError> {
    let log = decode_unchecked(bytes)?;
    for experiment in &log.experiments {
        let violations = validate(experiment);
        if !violations.is_empty() {
            let detail: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
            return Err(ApiError::CorruptDocument(format!(
                "Experiment {} violates lineage invariants: {}",
                experiment.id,
                detail.join("; ")
            )));
        }
    }
    Ok(log)
}

/// Deserialize a document checking only its shape and id uniqueness.
///
/// Lineage invariants are left to the caller; this is what integrity
/// reporting reads so that broken experiments can be described rather than
/// rejected wholesale.
pub fn decode_unchecked(bytes: &[u8]) -> Result<LineageLog, ApiError> {
    let records: Vec<ExperimentRecord> = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::CorruptDocument(format!("Invalid lineage document: {}", e)))?;

    let mut seen = HashSet::with_capacity(records.len());
    let mut experiments = Vec::with_capacity(records.len());
    for record in records {
        let experiment = Experiment::from(record);
        if !seen.insert(experiment.id.clone()) {
            return Err(ApiError::CorruptDocument(format!(
                "Duplicate experiment id {}",
                experiment.id
            )));
        }
        experiments.push(experiment);
    }

    Ok(LineageLog::from_experiments(experiments))
}
