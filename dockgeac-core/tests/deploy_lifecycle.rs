//! End-to-end stack lifecycle tests against a mock command runner.
//!
//! These drive the real engine, compiler, adapter and lock store; only the
//! external CLI is prerecorded.

mod support;

use dockgeac_core::{
    AppleContainerAdapter, LockStore, RuntimeAdapter, Settings, StackEngine,
};
use std::sync::Arc;
use support::MockRunner;
use tempfile::TempDir;

struct Harness {
    _data: TempDir,
    runner: Arc<MockRunner>,
    locks: Arc<LockStore>,
    engine: StackEngine,
}

fn harness() -> Harness {
    let data = TempDir::new().unwrap();
    let stacks_dir = data.path().join("stacks");
    std::fs::create_dir_all(&stacks_dir).unwrap();

    let runner = Arc::new(MockRunner::new());
    let locks = Arc::new(LockStore::new(data.path().join("locks")));
    let adapter: Arc<dyn RuntimeAdapter> =
        Arc::new(AppleContainerAdapter::new(runner.clone(), locks.clone()));
    let engine = StackEngine::new(stacks_dir, adapter, locks.clone(), Settings::default());

    Harness { _data: data, runner, locks, engine }
}

const WEB_COMPOSE: &str =
    "services:\n  web:\n    image: nginx:latest\n    ports:\n      - \"PORT:80\"\n";

#[tokio::test]
async fn test_deploy_happy_path() {
    let h = harness();

    h.engine.save("e2e-test", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("e2e-test").await.unwrap();

    // The conventional container was created with the port flag intact.
    assert!(h.runner.saw(&["image", "pull", "nginx:latest"]));
    assert!(h.runner.saw(&["run", "-d", "--name", "dockgeac_e2e-test_web_1", "-p", "PORT:80"]));

    // The lock file records ownership and the compose fingerprint.
    let record = h.locks.read("e2e-test").unwrap();
    assert_eq!(record.stack_name, "e2e-test");
    assert_eq!(record.fingerprint, LockStore::fingerprint(WEB_COMPOSE));
    assert_eq!(record.services["web"].container_name, "dockgeac_e2e-test_web_1");
    assert_eq!(record.services["web"].image, "nginx:latest");
}

#[tokio::test]
async fn test_deploy_substitutes_env_before_compiling() {
    let h = harness();

    h.engine
        .save("envy", "services:\n  web:\n    image: nginx\n    ports:\n      - \"${PORT}:80\"\n", "PORT=8080\n", true)
        .await
        .unwrap();
    h.engine.deploy("envy").await.unwrap();

    assert!(h.runner.saw(&["run", "-d", "--name", "dockgeac_envy_web_1", "-p", "8080:80"]));
}

#[tokio::test]
async fn test_blocked_key_rejection() {
    let h = harness();

    let yaml = "services:\n  web:\n    image: nginx:latest\n    deploy:\n      replicas: 3\n";
    h.engine.save("blocked", yaml, "", true).await.unwrap();

    let err = h.engine.deploy("blocked").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("deploy"));
    assert!(msg.contains("services.web.deploy"));

    // Nothing was created: the deploy failed in preflight.
    assert!(!h.runner.saw(&["run"]));
    assert!(h.locks.read("blocked").is_none());
}

#[tokio::test]
async fn test_stack_name_regex_rejection() {
    let h = harness();

    let err = h.engine.save("Bad Name", WEB_COMPOSE, "", true).await.unwrap_err();
    assert_eq!(err.to_string(), "Stack name can only contain [a-z][0-9] _ - only");

    // No directory was created for the rejected name.
    let entries: Vec<_> =
        std::fs::read_dir(h._data.path().join("stacks")).unwrap().flatten().collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_invalid_env_rejection() {
    let h = harness();

    let err = h.engine.save("envbad", WEB_COMPOSE, "JUSTAWORD", true).await.unwrap_err();
    assert!(err.to_string().contains("KEY=VALUE"));
}

#[tokio::test]
async fn test_local_only_image_fails_before_any_run() {
    let h = harness();

    // No local images at all.
    h.runner.on(&["image", "list"], MockRunner::ok("[]"));

    h.engine.save("localy", "services:\n  app:\n    image: app:local\n", "", true).await.unwrap();
    let err = h.engine.deploy("localy").await.unwrap_err();

    assert!(err.to_string().contains("Local image"));
    assert!(!h.runner.saw(&["image", "pull"]));
    assert!(!h.runner.saw(&["run"]));
}

#[tokio::test]
async fn test_pull_failure_falls_back_to_local_copy() {
    let h = harness();

    h.runner.on(&["image", "pull", "nginx:latest"], MockRunner::fail("registry unreachable"));
    h.runner.on(
        &["image", "list"],
        MockRunner::ok(r#"[{"reference":"docker.io/library/nginx:latest"}]"#),
    );

    h.engine.save("offline", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("offline").await.unwrap();

    assert!(h.runner.saw(&["run", "-d", "--name", "dockgeac_offline_web_1"]));
}

#[tokio::test]
async fn test_deploy_aborts_without_rollback_on_failed_service() {
    let h = harness();

    let yaml = "services:\n  db:\n    image: postgres\n  web:\n    image: nginx\n    depends_on:\n      - db\n";
    h.engine.save("partial", yaml, "", true).await.unwrap();

    h.runner.on(&["run", "-d", "--name", "dockgeac_partial_web_1"], MockRunner::fail("boom"));

    let err = h.engine.deploy("partial").await.unwrap_err();
    assert!(err.to_string().contains("web"));
    assert!(err.to_string().contains("boom"));

    // db was created first (dependency order) and is not rolled back.
    assert!(h.runner.saw(&["run", "-d", "--name", "dockgeac_partial_db_1"]));
    assert!(!h.runner.saw(&["delete", "dockgeac_partial_db_1"]));
}

#[tokio::test]
async fn test_start_falls_through_to_deploy() {
    let h = harness();

    h.engine.save("fresh", WEB_COMPOSE, "", true).await.unwrap();
    assert!(h.locks.read("fresh").is_none());

    h.engine.start("fresh").await.unwrap();

    // A full deploy happened: container created and lock written.
    assert!(h.runner.saw(&["run", "-d", "--name", "dockgeac_fresh_web_1"]));
    assert!(h.locks.read("fresh").is_some());
}

#[tokio::test]
async fn test_start_redeploys_when_runtime_lost_the_containers() {
    let h = harness();

    h.engine.save("ghost", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("ghost").await.unwrap();

    // The runtime no longer knows the container.
    h.runner.on(
        &["start", "dockgeac_ghost_web_1"],
        MockRunner::fail("Error: container not found"),
    );

    h.engine.start("ghost").await.unwrap();

    // Redeploy created the container again.
    let runs: Vec<_> = h
        .runner
        .calls()
        .into_iter()
        .filter(|c| c.first().map(String::as_str) == Some("run"))
        .collect();
    assert_eq!(runs.len(), 2);
}

#[tokio::test]
async fn test_down_removes_exactly_the_owned_containers() {
    let h = harness();

    h.engine.save("owned", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("owned").await.unwrap();

    // Another container shares the stack's name prefix but is not in the
    // lock record; ownership discipline says it must be left alone.
    h.runner.on(
        &["list", "--all"],
        MockRunner::ok(
            r#"[{"name":"dockgeac_owned_web_1","state":"running"},
                {"name":"dockgeac_owned_impostor_1","state":"running"}]"#,
        ),
    );

    h.engine.down("owned", false).await.unwrap();

    assert!(h.runner.saw(&["stop", "dockgeac_owned_web_1"]));
    assert!(h.runner.saw(&["delete", "dockgeac_owned_web_1"]));
    assert!(!h.runner.saw(&["delete", "dockgeac_owned_impostor_1"]));
    assert!(h.locks.read("owned").is_none());
}

#[tokio::test]
async fn test_down_with_volumes_deletes_declared_volumes() {
    let h = harness();

    let yaml = "services:\n  db:\n    image: postgres\n    volumes:\n      - data:/var/lib/postgresql\nvolumes:\n  data:\n";
    h.engine.save("vols", yaml, "", true).await.unwrap();
    h.engine.deploy("vols").await.unwrap();

    h.engine.down("vols", true).await.unwrap();
    assert!(h.runner.saw(&["volume", "delete", "data"]));
}

#[tokio::test]
async fn test_delete_removes_stack_directory_even_when_down_fails() {
    let h = harness();

    h.engine.save("gone", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("gone").await.unwrap();

    h.runner.on(&["delete", "dockgeac_gone_web_1"], MockRunner::fail("runtime busy"));

    h.engine.delete("gone").await.unwrap();
    assert!(!h._data.path().join("stacks").join("gone").exists());
}

#[tokio::test]
async fn test_save_requires_matching_add_flag() {
    let h = harness();

    h.engine.save("dup", WEB_COMPOSE, "", true).await.unwrap();
    assert!(h.engine.save("dup", WEB_COMPOSE, "", true).await.is_err());

    assert!(h.engine.save("nonexistent", WEB_COMPOSE, "", false).await.is_err());
    assert!(h.engine.save("dup", WEB_COMPOSE, "", false).await.is_ok());
}

#[tokio::test]
async fn test_update_pulls_but_skips_recreate_when_not_running() {
    let h = harness();

    h.engine.save("sleepy", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("sleepy").await.unwrap();

    // Runtime reports the container as stopped.
    h.runner.on(
        &["list", "--all"],
        MockRunner::ok(r#"[{"name":"dockgeac_sleepy_web_1","state":"stopped"}]"#),
    );

    h.engine.update("sleepy").await.unwrap();

    assert!(h.runner.saw(&["image", "pull", "nginx:latest"]));
    // Not running: no down/recreate cycle.
    assert!(!h.runner.saw(&["delete", "dockgeac_sleepy_web_1"]));
}

#[tokio::test]
async fn test_update_recreates_running_stack() {
    let h = harness();

    h.engine.save("live", WEB_COMPOSE, "", true).await.unwrap();
    h.engine.deploy("live").await.unwrap();

    h.runner.on(
        &["list", "--all"],
        MockRunner::ok(r#"[{"name":"dockgeac_live_web_1","state":"running"}]"#),
    );

    h.engine.update("live").await.unwrap();

    assert!(h.runner.saw(&["delete", "dockgeac_live_web_1"]));
    let runs: Vec<_> = h
        .runner
        .calls()
        .into_iter()
        .filter(|c| c.first().map(String::as_str) == Some("run"))
        .collect();
    assert_eq!(runs.len(), 2);

    let record = h.locks.read("live").unwrap();
    assert_eq!(record.fingerprint, LockStore::fingerprint(WEB_COMPOSE));
}
