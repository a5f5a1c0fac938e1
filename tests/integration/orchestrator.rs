//! Generation saga: success path and failure isolation

use super::test_utils::*;
use arbor::blob::{BlobStore, MemoryBlobStore};
use arbor::error::ApiError;
use arbor::orchestrator::{
    GenerateStepRequest, GenerationConfig, GenerationOrchestrator, StartExperimentRequest,
};
use arbor::provider::ImageGenerator;
use arbor::repository::{LineageRepository, RepositoryConfig};
use arbor::types::ExperimentId;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<MemoryBlobStore>,
    repo: Arc<LineageRepository>,
    orchestrator: GenerationOrchestrator,
}

fn harness(generator: Arc<dyn ImageGenerator>, config: GenerationConfig) -> Harness {
    let (store, repo) = memory_repository();
    let orchestrator = GenerationOrchestrator::new(repo.clone(), generator, store.clone(), config);
    Harness {
        store,
        repo,
        orchestrator,
    }
}

fn request(experiment_id: &ExperimentId, parent_index: usize, prompt: &str) -> GenerateStepRequest {
    GenerateStepRequest {
        experiment_id: experiment_id.clone(),
        parent_index,
        prompt: prompt.to_string(),
    }
}

fn generated_keys(store: &MemoryBlobStore) -> Vec<String> {
    store
        .keys()
        .into_iter()
        .filter(|k| k.starts_with("generated/"))
        .collect()
}

#[tokio::test]
async fn test_generate_step_uploads_then_appends() {
    let generator = Arc::new(StaticGenerator::new());
    let h = harness(generator.clone(), GenerationConfig::default());
    let exp = h.repo.create_experiment("Sky", "memory://uploads/root.png").await.unwrap();

    let step = h
        .orchestrator
        .generate_step(request(&exp.id, 0, "add a moon"))
        .await
        .unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(step.index, 1);
    assert_eq!(step.parent_index, Some(0));
    assert_eq!(step.prompt.as_deref(), Some("add a moon"));

    let keys = generated_keys(&h.store);
    assert_eq!(keys.len(), 1);
    assert!(keys[0].ends_with(".png"));
    assert_eq!(step.image_ref, format!("memory://{}", keys[0]));
    assert_eq!(h.store.get(&keys[0]).await.unwrap().unwrap(), PNG_BYTES);
    assert_eq!(h.store.content_type(&keys[0]).as_deref(), Some("image/png"));

    let stored = h.repo.get(&exp.id).await.unwrap();
    assert_eq!(stored.steps.len(), 2);
    assert_eq!(stored.steps[1], step);
}

#[tokio::test]
async fn test_branching_from_any_step() {
    let h = harness(Arc::new(StaticGenerator::new()), GenerationConfig::default());
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    h.orchestrator.generate_step(request(&exp.id, 0, "a")).await.unwrap();
    h.orchestrator.generate_step(request(&exp.id, 1, "b")).await.unwrap();
    let step = h.orchestrator.generate_step(request(&exp.id, 0, "c")).await.unwrap();

    assert_eq!(step.index, 3);
    assert_eq!(step.parent_index, Some(0));
    let stored = h.repo.get(&exp.id).await.unwrap();
    assert_eq!(stored.children_of(0), vec![1, 3]);
}

#[tokio::test]
async fn test_rejected_generation_appends_nothing_and_stores_nothing() {
    let h = harness(
        Arc::new(RejectingGenerator::new("Your request was rejected by the safety system")),
        GenerationConfig::default(),
    );
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let err = h
        .orchestrator
        .generate_step(request(&exp.id, 0, "something disallowed"))
        .await
        .unwrap_err();
    match err {
        ApiError::GenerationRejected(msg) => {
            assert_eq!(msg, "Your request was rejected by the safety system")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(generated_keys(&h.store).is_empty());
    assert_eq!(h.repo.get(&exp.id).await.unwrap().steps.len(), 1);
}

#[tokio::test]
async fn test_provider_failure_is_reported_as_rejection() {
    let h = harness(Arc::new(BrokenGenerator), GenerationConfig::default());
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let err = h
        .orchestrator
        .generate_step(request(&exp.id, 0, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GenerationRejected(ref msg) if msg.contains("connection refused")));
    assert_eq!(h.repo.get(&exp.id).await.unwrap().steps.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_generation_timeout_is_rejection() {
    let h = harness(
        Arc::new(SlowGenerator::new(Duration::from_secs(600))),
        GenerationConfig {
            generation_timeout_ms: 1_000,
            ..GenerationConfig::default()
        },
    );
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let err = h
        .orchestrator
        .generate_step(request(&exp.id, 0, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GenerationRejected(ref msg) if msg.contains("timed out")));
    assert_eq!(h.repo.get(&exp.id).await.unwrap().steps.len(), 1);
}

#[tokio::test]
async fn test_upload_failure_appends_nothing() {
    let store = Arc::new(FailingPutStore::new("generated/"));
    let repo = repository_over(store.clone(), RepositoryConfig::default());
    let orchestrator = GenerationOrchestrator::new(
        repo.clone(),
        Arc::new(StaticGenerator::new()),
        store.clone(),
        GenerationConfig::default(),
    );
    let exp = repo.create_experiment("Sky", "root").await.unwrap();

    let err = orchestrator
        .generate_step(request(&exp.id, 0, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StorageFailure(_)));
    assert_eq!(repo.get(&exp.id).await.unwrap().steps.len(), 1);
}

#[tokio::test]
async fn test_append_failure_after_upload_leaves_orphan_blob() {
    let store = Arc::new(FrozenDocumentStore::new());
    let repo = repository_over(store.clone(), RepositoryConfig::default());
    let generator = Arc::new(StaticGenerator::new());
    let orchestrator = GenerationOrchestrator::new(
        repo.clone(),
        generator.clone(),
        store.clone(),
        GenerationConfig::default(),
    );
    let exp = repo.create_experiment("Sky", "root").await.unwrap();
    store.freeze();

    let err = orchestrator
        .generate_step(request(&exp.id, 0, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StoreUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(generator.calls(), 1);
    assert_eq!(generated_keys(&store.inner).len(), 1);
    assert_eq!(repo.get(&exp.id).await.unwrap().steps.len(), 1);
}

#[tokio::test]
async fn test_invalid_parent_is_rejected_before_generation() {
    let generator = Arc::new(StaticGenerator::new());
    let h = harness(generator.clone(), GenerationConfig::default());
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let err = h
        .orchestrator
        .generate_step(request(&exp.id, 5, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidParent { parent_index: 5, step_count: 1, .. }));
    assert_eq!(generator.calls(), 0, "no billable call for a bad parent");
    assert!(generated_keys(&h.store).is_empty());
}

#[tokio::test]
async fn test_unknown_experiment_is_rejected_before_generation() {
    let generator = Arc::new(StaticGenerator::new());
    let h = harness(generator.clone(), GenerationConfig::default());

    let err = h
        .orchestrator
        .generate_step(request(&ExperimentId::from("ghost"), 0, "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_blank_prompt_is_invalid_request() {
    let generator = Arc::new(StaticGenerator::new());
    let h = harness(generator.clone(), GenerationConfig::default());
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let err = h
        .orchestrator
        .generate_step(request(&exp.id, 0, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_generation_appends_nothing() {
    let h = Arc::new(harness(
        Arc::new(SlowGenerator::new(Duration::from_secs(30))),
        GenerationConfig::default(),
    ));
    let exp = h.repo.create_experiment("Sky", "root").await.unwrap();

    let task = {
        let h = h.clone();
        let id = exp.id.clone();
        tokio::spawn(async move { h.orchestrator.generate_step(request(&id, 0, "p")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.repo.get(&exp.id).await.unwrap().steps.len(), 1);
    assert!(generated_keys(&h.store).is_empty());
}

#[tokio::test]
async fn test_start_experiment_uploads_root_and_defaults_name() {
    let h = harness(Arc::new(StaticGenerator::new()), GenerationConfig::default());

    let exp = h
        .orchestrator
        .start_experiment(StartExperimentRequest {
            name: None,
            file_name: "../My Photo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        })
        .await
        .unwrap();

    assert!(exp.name.starts_with("Experiment "));
    assert_eq!(exp.steps.len(), 1);
    let uploads: Vec<_> = h
        .store
        .keys()
        .into_iter()
        .filter(|k| k.starts_with("uploads/"))
        .collect();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with("-My_Photo.png"));
    assert_eq!(exp.steps[0].image_ref, format!("memory://{}", uploads[0]));
}

#[tokio::test]
async fn test_start_experiment_keeps_given_name() {
    let h = harness(Arc::new(StaticGenerator::new()), GenerationConfig::default());
    let exp = h
        .orchestrator
        .start_experiment(StartExperimentRequest {
            name: Some("  Lighthouse ".to_string()),
            file_name: "l.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3],
        })
        .await
        .unwrap();
    assert_eq!(exp.name, "Lighthouse");
}

#[tokio::test]
async fn test_start_experiment_upload_failure_creates_nothing() {
    let store = Arc::new(FailingPutStore::new("uploads/"));
    let repo = repository_over(store.clone(), RepositoryConfig::default());
    let orchestrator = GenerationOrchestrator::new(
        repo.clone(),
        Arc::new(StaticGenerator::new()),
        store.clone(),
        GenerationConfig::default(),
    );

    let err = orchestrator
        .start_experiment(StartExperimentRequest {
            name: Some("x".to_string()),
            file_name: "x.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::StorageFailure(_)));
    assert!(repo.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_experiment_rejects_empty_upload() {
    let h = harness(Arc::new(StaticGenerator::new()), GenerationConfig::default());
    let err = h
        .orchestrator
        .start_experiment(StartExperimentRequest {
            name: None,
            file_name: "x.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
    assert!(h.store.is_empty());
}
