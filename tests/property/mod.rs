//! Property-based tests for lineage invariants

mod lineage_invariants;
