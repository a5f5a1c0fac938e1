//! Arbor: Experiment Lineage Store
//!
//! Records image-generation experiments as lineage trees. Each experiment is a
//! root image plus an append-only list of steps, where every step was generated
//! from an earlier step and a prompt. The crate persists the whole collection
//! as one document behind a blob store, projects it into a node/edge graph,
//! picks random branch points, and orchestrates "prompt + parent → new step"
//! against an external image provider.

pub mod api;
pub mod blob;
pub mod branch;
pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod repository;
pub mod types;

pub use api::{IntegrityAudit, IntegrityReport, LineageApi};
pub use error::{ApiError, StorageError};
pub use experiment::{Experiment, ExperimentSummary, LineageLog, Step};
pub use types::{ExperimentId, Revision, StepIndex};
