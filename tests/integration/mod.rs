//! Integration tests for the arbor lineage store

mod cli_commands;
mod orchestrator;
mod storage_backends;
