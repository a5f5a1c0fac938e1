//! Random append sequences never break the lineage invariants

use arbor::branch::pick_random_branch_point;
use arbor::experiment::{document, validate, Experiment, LineageLog};
use arbor::graph::project_graph;
use arbor::types::ExperimentId;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Each entry picks a parent as a fraction of the current step count.
fn append_plan() -> impl Strategy<Value = Vec<(u16, String)>> {
    prop::collection::vec((any::<u16>(), "[a-z ]{0,12}"), 0..40)
}

fn build(id: &str, plan: &[(u16, String)]) -> Experiment {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let mut experiment = Experiment::new(ExperimentId::new(id), id, created_at, "root.png");
    for (i, (pick, prompt)) in plan.iter().enumerate() {
        let parent = *pick as usize % experiment.steps.len();
        experiment
            .append_step(format!("img-{}.png", i), parent, Some(prompt.clone()))
            .unwrap();
    }
    experiment
}

proptest! {
    #[test]
    fn appended_lineages_always_validate(plan in append_plan()) {
        let experiment = build("exp", &plan);
        prop_assert_eq!(experiment.steps.len(), plan.len() + 1);
        prop_assert!(validate(&experiment).is_empty());
        for (index, step) in experiment.steps.iter().enumerate() {
            prop_assert_eq!(step.index, index);
            if let Some(parent) = step.parent_index {
                prop_assert!(parent < index);
            }
        }
    }

    #[test]
    fn out_of_range_parent_never_mutates(plan in append_plan(), extra in 0usize..10) {
        let mut experiment = build("exp", &plan);
        let before = experiment.clone();
        let bad_parent = experiment.steps.len() + extra;
        prop_assert!(experiment.append_step("x", bad_parent, Some("p".into())).is_err());
        prop_assert_eq!(experiment, before);
    }

    #[test]
    fn projection_counts_match_steps(plans in prop::collection::vec(append_plan(), 0..5)) {
        let experiments: Vec<_> = plans
            .iter()
            .enumerate()
            .map(|(i, plan)| build(&format!("e{}", i), plan))
            .collect();
        let graph = project_graph(&experiments);

        let steps: usize = experiments.iter().map(|e| e.steps.len()).sum();
        prop_assert_eq!(graph.nodes.len(), steps);
        prop_assert_eq!(graph.edges.len(), steps - experiments.len());
        prop_assert_eq!(project_graph(&experiments), graph);
    }

    #[test]
    fn document_round_trip_preserves_log(plans in prop::collection::vec(append_plan(), 0..4)) {
        let log = LineageLog::from_experiments(
            plans
                .iter()
                .enumerate()
                .map(|(i, plan)| build(&format!("e{}", i), plan))
                .collect(),
        );
        let bytes = document::encode(&log).unwrap();
        let decoded = document::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, log);
    }

    #[test]
    fn branch_points_are_valid_steps(plan in append_plan(), seed in any::<u64>()) {
        let experiment = build("exp", &plan);
        let mut rng = StdRng::seed_from_u64(seed);
        let point = pick_random_branch_point(&experiment, &mut rng).unwrap();
        prop_assert!(point.index < experiment.steps.len());
        prop_assert_eq!(&point.step, &experiment.steps[point.index]);
    }
}
