//! CLI route table driven end to end through a workspace config

use arbor::cli::{Cli, Commands, RunContext};
use clap::Parser;
use std::path::Path;
use tempfile::TempDir;

fn workspace_with_config() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("config")).unwrap();
    std::fs::write(
        temp.path().join("config/config.toml"),
        "[storage]\nbackend = \"fs\"\nroot = \"data\"\n\n[provider]\nmodel = \"dall-e-3\"\n",
    )
    .unwrap();
    std::fs::write(temp.path().join("seed.png"), b"\x89PNG seed").unwrap();
    temp
}

fn run(workspace: &Path, args: &[&str]) -> Result<String, arbor::ApiError> {
    let ws = workspace.to_string_lossy().into_owned();
    let mut argv = vec!["arbor", "--workspace", ws.as_str()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())?;
    context.execute(&cli.command)
}

#[test]
fn test_start_then_list_and_graph() {
    let ws = workspace_with_config();

    let started = run(ws.path(), &["start", "--image", "seed.png", "--name", "Seed"]).unwrap();
    assert!(started.contains("Seed"));
    assert!(ws.path().join("data/experiments.json").exists());

    let listing = run(ws.path(), &["list", "--format", "json"]).unwrap();
    let summaries: serde_json::Value = serde_json::from_str(&listing).unwrap();
    assert_eq!(summaries[0]["name"], "Seed");

    let graph = run(ws.path(), &["graph"]).unwrap();
    let graph: serde_json::Value = serde_json::from_str(&graph).unwrap();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 1);
    assert_eq!(graph["nodes"][0]["label"], "Step 0");
    assert!(graph["edges"].as_array().unwrap().is_empty());

    let all = run(ws.path(), &["all"]).unwrap();
    let all: serde_json::Value = serde_json::from_str(&all).unwrap();
    assert_eq!(all[0]["experiment_name"], "Seed");
    assert_eq!(all[0]["images"][0]["source"], serde_json::Value::Null);
}

#[test]
fn test_validate_and_config_commands() {
    let ws = workspace_with_config();
    run(ws.path(), &["start", "--image", "seed.png"]).unwrap();

    let report = run(ws.path(), &["validate"]).unwrap();
    assert!(report.contains("all lineages sound"));

    let config = run(ws.path(), &["config"]).unwrap();
    assert!(config.contains("[storage]"));
    assert!(config.contains("dall-e-3"));
}

#[test]
fn test_validate_lists_hand_edited_violations() {
    let ws = workspace_with_config();
    std::fs::create_dir_all(ws.path().join("data")).unwrap();
    std::fs::write(
        ws.path().join("data/experiments.json"),
        r#"[{"id":"edited","experiment_name":"n","created_at":"2024-05-06T12:53:20Z","images":[
            {"url":"u0","source":null,"prompt":null},
            {"url":"u1","source":3,"prompt":"p"}]}]"#,
    )
    .unwrap();

    let report = run(ws.path(), &["validate"]).unwrap();
    assert!(report.contains("1 of 1"));
    assert!(report.contains("edited"));
    assert!(report.contains("step 1 references parent 3"));
}

#[test]
fn test_show_unknown_experiment_fails() {
    let ws = workspace_with_config();
    let err = run(ws.path(), &["show", "missing"]).unwrap_err();
    assert_eq!(arbor::cli::exit_code(&err), 2);
}

#[test]
fn test_generate_requires_prompt_and_parent() {
    assert!(Cli::try_parse_from(["arbor", "generate", "exp-1", "--prompt", "x"]).is_err());
    let cli = Cli::try_parse_from(["arbor", "generate", "exp-1", "--parent", "2", "--prompt", "x"])
        .unwrap();
    assert!(matches!(cli.command, Commands::Generate { parent: 2, .. }));
}
