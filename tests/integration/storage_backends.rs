//! Repository over the durable backends: fs and sled

use super::test_utils::*;
use arbor::api::LineageApi;
use arbor::blob::{self, BlobBackend, BlobStore, FsBlobStore, SledBlobStore, StorageConfig};
use arbor::config::ArborConfig;
use arbor::error::StorageError;
use arbor::orchestrator::GenerateStepRequest;
use arbor::repository::RepositoryConfig;
use arbor::types::Revision;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_fs_backend_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let exp = {
        let store = Arc::new(FsBlobStore::new(temp.path(), None).unwrap());
        let repo = repository_over(store, RepositoryConfig::default());
        let exp = repo.create_experiment("Disk", "file:///root.png").await.unwrap();
        repo.append_step(&exp.id, "file:///s1.png", 0, Some("p".into()))
            .await
            .unwrap();
        exp
    };

    assert!(temp.path().join(DOCUMENT_KEY).exists());
    let raw = std::fs::read_to_string(temp.path().join(DOCUMENT_KEY)).unwrap();
    assert!(raw.contains("\"experiment_name\": \"Disk\""));

    let store = Arc::new(FsBlobStore::new(temp.path(), None).unwrap());
    let repo = repository_over(store, RepositoryConfig::default());
    let reloaded = repo.get(&exp.id).await.unwrap();
    assert_eq!(reloaded.steps.len(), 2);
    assert_eq!(reloaded.steps[1].prompt.as_deref(), Some("p"));
}

#[tokio::test]
async fn test_fs_backend_detects_foreign_write() {
    let temp = TempDir::new().unwrap();
    let store = FsBlobStore::new(temp.path(), None).unwrap();
    let first = store.put_if_revision("doc.json", b"[]", None).await.unwrap();

    std::fs::write(temp.path().join("doc.json"), b"[ ]").unwrap();

    let err = store
        .put_if_revision("doc.json", b"[1]", Some(first))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RevisionMismatch { .. }));
    let current = store.get("doc.json").await.unwrap().unwrap();
    assert_eq!(Revision::of(&current), Revision::of(b"[ ]"));
}

#[tokio::test]
async fn test_fs_backend_serves_images_under_public_url() {
    let temp = TempDir::new().unwrap();
    let store = FsBlobStore::new(temp.path(), Some("https://img.example.com/".to_string())).unwrap();
    let blob = store
        .put("generated/abc.png", PNG_BYTES, "image/png")
        .await
        .unwrap();
    assert_eq!(blob.url, "https://img.example.com/generated/abc.png");
    assert!(temp.path().join("generated/abc.png").exists());
}

#[tokio::test]
async fn test_sled_backend_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("blobs.sled");
    let exp = {
        let store = Arc::new(SledBlobStore::open(&db_path, None).unwrap());
        let repo = repository_over(store, RepositoryConfig::default());
        let exp = repo.create_experiment("Tree", "sled://blobs/root.png").await.unwrap();
        repo.append_step(&exp.id, "sled://blobs/s1.png", 0, Some("p".into()))
            .await
            .unwrap();
        exp
    };

    let store = Arc::new(SledBlobStore::open(&db_path, None).unwrap());
    let repo = repository_over(store, RepositoryConfig::default());
    assert_eq!(repo.get(&exp.id).await.unwrap().steps.len(), 2);
}

#[tokio::test]
async fn test_sled_conditional_write() {
    let temp = TempDir::new().unwrap();
    let store = SledBlobStore::open(temp.path().join("db"), None).unwrap();
    let r1 = store.put_if_revision("doc", b"a", None).await.unwrap();
    assert!(matches!(
        store.put_if_revision("doc", b"b", None).await,
        Err(StorageError::RevisionMismatch { .. })
    ));
    store.put_if_revision("doc", b"b", Some(r1)).await.unwrap();
    assert_eq!(store.get("doc").await.unwrap().unwrap(), b"b");
}

#[tokio::test]
async fn test_api_from_config_over_fs_storage() {
    let temp = TempDir::new().unwrap();
    let mut config = ArborConfig::default();
    config.storage = StorageConfig {
        backend: BlobBackend::Fs,
        root: temp.path().to_path_buf(),
        document_key: "lineage/log.json".to_string(),
        public_base_url: None,
    };
    config.provider.api_key = None;

    let api = LineageApi::from_config(&config).unwrap();
    let exp = api
        .create_experiment(arbor::orchestrator::StartExperimentRequest {
            name: Some("Configured".to_string()),
            file_name: "root.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        })
        .await
        .unwrap();
    assert!(temp.path().join("lineage/log.json").exists());
    assert!(exp.steps[0].image_ref.starts_with("file://"));

    let err = api
        .generate_step(GenerateStepRequest {
            experiment_id: exp.id.clone(),
            parent_index: 0,
            prompt: "p".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, arbor::error::ApiError::GenerationRejected(_)));
}

#[test]
fn test_open_rejects_unusable_root() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();
    let config = StorageConfig {
        backend: BlobBackend::Fs,
        root: file,
        document_key: DOCUMENT_KEY.to_string(),
        public_base_url: None,
    };
    assert!(blob::open(&config).is_err());
}
