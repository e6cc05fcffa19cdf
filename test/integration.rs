// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    eventually, has_git, spawn_server, state_with_sync, state_without_sync, RecordingGit,
    RepoFixture, RepoKind, EDITOR_ORIGIN,
};

use graphkeep::{
    config::SyncSettings,
    store::{GraphDocument, GraphStore, STAGING_PREFIX},
    sync::{SyncOutcome, SyncRunner, SyncTrigger},
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::{
    header::{
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
    },
    Client, Method, StatusCode,
};
use serde_json::{json, Value};
use std::{fs, time::Duration};
use tempfile::TempDir;

const GRAPH: &str = r#"[{"id":"n1","label":"Ünïcødé ✓"},{"source":"n1","target":"n2"}]"#;

#[tokio::test]
async fn save_then_load_returns_same_graph() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;
    let client = Client::new();

    let response = client
        .post(format!("{base}/api/save"))
        .body(GRAPH)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await?, json!({"ok": true}));

    let response = client.get(format!("{base}/api/load")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let expect: Value = serde_json::from_str(GRAPH)?;
    assert_eq!(response.json::<Value>().await?, expect);

    // INVARIANT: Backing file is pretty-printed with non-ASCII kept literal.
    let on_disk = fs::read_to_string(dir.path().join("graph.json"))?;
    assert!(on_disk.contains("\n  {"));
    assert!(on_disk.contains("Ünïcødé ✓"));

    Ok(())
}

#[tokio::test]
async fn save_rejects_non_array_and_keeps_previous_graph() -> Result<()> {
    let dir = TempDir::new()?;
    let git = RecordingGit::clean();
    let base = spawn_server(state_with_sync(dir.path(), &git, Duration::from_millis(50))?).await?;
    let client = Client::new();

    client
        .post(format!("{base}/api/save"))
        .body(r#"[{"id":"n1"}]"#)
        .send()
        .await?;
    assert!(eventually(Duration::from_secs(5), || git.count("status") == 1).await);

    for body in [r#"{"id":"n1"}"#, "\"graph\"", "42", "[{", ""] {
        let response = client
            .post(format!("{base}/api/save"))
            .body(body)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.text().await?, "Bad data");
    }

    let response = client.get(format!("{base}/api/load")).send().await?;
    assert_eq!(response.json::<Value>().await?, json!([{"id": "n1"}]));

    // INVARIANT: Rejected saves never schedule a sync.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(git.count("status"), 1);

    Ok(())
}

#[tokio::test]
async fn load_before_any_save_yields_empty_array() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;

    let response = Client::new().get(format!("{base}/api/load")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(response.text().await?, "[]");

    Ok(())
}

#[tokio::test]
async fn preflight_is_empty_and_decorated() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;
    let client = Client::new();

    for route in ["save", "load", "push", "sync/status"] {
        let response = client
            .request(Method::OPTIONS, format!("{base}/api/{route}"))
            .header(ORIGIN, EDITOR_ORIGIN)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], EDITOR_ORIGIN);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_METHODS],
            "GET,POST,OPTIONS"
        );
        assert_eq!(response.text().await?, "");
    }

    Ok(())
}

#[tokio::test]
async fn save_echoes_unlisted_origin_and_bad_data_is_decorated() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;

    let response = Client::new()
        .post(format!("{base}/api/save"))
        .header(ORIGIN, "http://localhost:5173")
        .body("{}")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );

    Ok(())
}

#[tokio::test]
async fn save_failure_is_opaque_server_error() -> Result<()> {
    let dir = TempDir::new()?;
    let git = RecordingGit::clean();
    let base = spawn_server(state_with_sync(dir.path(), &git, Duration::from_millis(50))?).await?;

    // INVARIANT: Renaming over a directory fails regardless of privileges.
    fs::create_dir(dir.path().join("graph.json"))?;

    let response = Client::new()
        .post(format!("{base}/api/save"))
        .header(ORIGIN, EDITOR_ORIGIN)
        .body(GRAPH)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], EDITOR_ORIGIN);
    let body = response.text().await?;
    assert_eq!(body, "Internal Server Error");
    assert!(!body.contains("graph.json"));

    // INVARIANT: Failed saves never schedule a sync.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(git.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn health_is_not_decorated() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;

    let response = Client::new()
        .get(format!("{base}/api/health"))
        .header(ORIGIN, EDITOR_ORIGIN)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert_eq!(response.json::<Value>().await?, json!({"ok": true}));

    Ok(())
}

#[tokio::test]
async fn push_answers_before_sync_finishes() -> Result<()> {
    let dir = TempDir::new()?;
    let git = RecordingGit::clean().with_delay(Duration::from_secs(1));
    let base = spawn_server(state_with_sync(dir.path(), &git, Duration::from_secs(60))?).await?;

    let started = std::time::Instant::now();
    let response = Client::new()
        .post(format!("{base}/api/push"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await?, json!({"ok": true}));
    assert!(started.elapsed() < Duration::from_millis(500));

    assert!(eventually(Duration::from_secs(5), || git.count("status") == 1).await);

    Ok(())
}

#[tokio::test]
async fn push_without_sync_still_acknowledges() -> Result<()> {
    let dir = TempDir::new()?;
    let base = spawn_server(state_without_sync(dir.path())?).await?;
    let client = Client::new();

    let response = client.post(format!("{base}/api/push")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await?, json!({"ok": true}));

    let status: Value = client
        .get(format!("{base}/api/sync/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["enabled"], json!(false));
    assert_eq!(status["last"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn burst_of_saves_syncs_once() -> Result<()> {
    let dir = TempDir::new()?;
    let git = RecordingGit::dirty();
    let base = spawn_server(state_with_sync(dir.path(), &git, Duration::from_millis(300))?).await?;
    let client = Client::new();

    for index in 0..5 {
        client
            .post(format!("{base}/api/save"))
            .body(format!(r#"[{{"id":"n{index}"}}]"#))
            .send()
            .await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let status: Value = client
        .get(format!("{base}/api/sync/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["enabled"], json!(true));
    assert_eq!(status["pending"], json!(true));
    assert!(git.calls().is_empty());

    assert!(eventually(Duration::from_secs(5), || git.count("push") == 1).await);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(git.count("status"), 1);

    let calls = git.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[1], vec!["add", "--", "graph.json"]);
    assert_eq!(calls[3], vec!["push", "origin", "HEAD"]);

    let status: Value = client
        .get(format!("{base}/api/sync/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["pending"], json!(false));
    assert_eq!(status["fires_in_ms"], Value::Null);
    assert_eq!(status["last"]["trigger"], json!("debounced"));
    assert_eq!(status["last"]["outcome"], json!("published"));

    Ok(())
}

#[test]
fn git_sync_publishes_graph_to_remote() -> Result<()> {
    if !has_git() {
        return Ok(());
    }

    let root = TempDir::new()?;
    let remote_path = root.path().join("remote.git");
    let work_path = root.path().join("work");
    let remote = RepoFixture::new(&remote_path, RepoKind::Bare)?;
    let work = RepoFixture::new(&work_path, RepoKind::Normal)?;
    work.add_remote("origin", &remote_path)?;

    let store = GraphStore::open(&work_path, "graph.json")?;
    store.save(&GraphDocument::from_slice(GRAPH.as_bytes())?)?;

    let runner = SyncRunner::from_settings(&SyncSettings::default(), &work_path, "graph.json");
    let report = runner.run(SyncTrigger::Manual);
    assert_eq!(report.outcome, SyncOutcome::Published);
    assert_eq!(report.steps.len(), 4);

    let message = remote.tip("main")?.message().unwrap_or_default().to_string();
    assert!(message.starts_with("auto: update graph.json ("));
    let published: Value = serde_json::from_str(&remote.read_file("main", "graph.json")?)?;
    let expect: Value = serde_json::from_str(GRAPH)?;
    assert_eq!(published, expect);

    // INVARIANT: Unchanged document never produces an empty commit, even
    // while a save is still staging its next version.
    fs::write(work_path.join(format!("{STAGING_PREFIX}a1b2c3")), "[]")?;
    let report = runner.run(SyncTrigger::Manual);
    assert_eq!(report.outcome, SyncOutcome::Clean);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(remote.commit_count("main")?, 1);

    Ok(())
}

#[test]
fn git_sync_outside_repository_fails_quietly() -> Result<()> {
    if !has_git() {
        return Ok(());
    }

    let root = TempDir::new()?;
    let store = GraphStore::open(root.path(), "graph.json")?;
    store.save(&GraphDocument::default())?;

    let runner = SyncRunner::from_settings(&SyncSettings::default(), root.path(), "graph.json");
    let report = runner.run(SyncTrigger::Manual);
    assert_eq!(report.outcome, SyncOutcome::Failed);
    assert_eq!(report.steps.len(), 1);
    assert!(!report.steps[0].success);

    Ok(())
}
