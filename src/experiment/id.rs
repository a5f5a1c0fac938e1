//! Experiment id generation
//!
//! Ids are `{unix_millis}-{uuid_v4_simple}`: the millisecond prefix keeps ids
//! roughly time-ordered for humans, the 122 random bits make concurrent
//! creation collision-resistant.

use crate::experiment::LineageLog;
use crate::types::ExperimentId;
use chrono::Utc;
use uuid::Uuid;

/// Generate a fresh experiment id.
pub fn new_experiment_id() -> ExperimentId {
    let millis = Utc::now().timestamp_millis();
    ExperimentId::new(format!("{}-{}", millis, Uuid::new_v4().simple()))
}

/// Generate an id not already present in `log`.
pub fn unique_experiment_id(log: &LineageLog) -> ExperimentId {
    loop {
        let id = new_experiment_id();
        if !log.contains_id(&id) {
            return id;
        }
    }
}

/// Generate a fresh blob key under `prefix`, e.g. `generated/<uuid>.png`.
pub fn new_blob_key(prefix: &str, suffix: &str) -> String {
    format!("{}/{}{}", prefix.trim_end_matches('/'), Uuid::new_v4(), suffix)
}
