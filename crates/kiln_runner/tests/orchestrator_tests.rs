//! Orchestrator scenarios against the mock process runner.

use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use kiln_runner::{
    DeployState, DeployStatus, DeploymentKind, MockProcess, MockProcessRunner, MockResponse,
    Orchestrator, OrchestratorConfig, RunnerError, StateObserver,
};

fn project(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.path().join("projects").join("space-game");
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("index.html"), "<html><div id=\"root\"></div></html>").unwrap();
    fs::write(dir.join("src/App.tsx"), "export default function App() {}").unwrap();
    fs::create_dir_all(dir.join("node_modules/react")).unwrap();
    dir
}

fn config(temp: &TempDir) -> OrchestratorConfig {
    OrchestratorConfig {
        served_root: temp.path().join("www"),
        deploy_log: temp.path().join("logs").join("deployments.log"),
        ready_timeout_secs: 1,
        ..Default::default()
    }
}

fn recorder() -> (StateObserver, Arc<Mutex<Vec<DeployState>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer: StateObserver = Arc::new(move |_, state| sink.lock().push(state));
    (observer, seen)
}

#[tokio::test]
async fn test_failed_build_without_output_serves_project_root() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new()
        .on_run("run build", MockResponse::failure(2, "error TS2304: Cannot find name"));
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone())).unwrap();

    let handle = orchestrator
        .deploy("space-game", &dir, "space-game")
        .await
        .unwrap();

    assert_eq!(handle.kind, DeploymentKind::Proxy);
    assert_eq!(handle.url, "http://space-game.localhost");
    let served = temp.path().join("www").join("space-game");
    assert!(served.join("index.html").exists());
    assert!(served.join("src/App.tsx").exists());
    assert!(!served.join("node_modules").exists());

    assert!(runner.ran("npm install"));
    assert!(runner.ran("npm run build"));
    // proxy disabled: no reload
    assert!(!runner.ran("nginx"));

    let entries = orchestrator.deployment_log().read_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, DeployStatus::Deployed);
}

#[tokio::test]
async fn test_deploy_prefers_dist_and_sanitizes_subdomain() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    fs::create_dir_all(dir.join("dist/assets")).unwrap();
    fs::write(dir.join("dist/index.html"), "<html>built</html>").unwrap();

    let mut cfg = config(&temp);
    cfg.proxy_enabled = true;
    cfg.site_config_dir = Some(temp.path().join("sites"));
    cfg.base_domain = "games.test".to_string();
    let runner = MockProcessRunner::new();
    let orchestrator = Orchestrator::new(cfg, Arc::new(runner.clone())).unwrap();

    let handle = orchestrator
        .launch("chat-1", &dir, Some("My Space_Game!"))
        .await
        .unwrap();

    assert_eq!(handle.url, "http://myspacegame.games.test");
    let served = temp.path().join("www").join("myspacegame");
    assert_eq!(fs::read_to_string(served.join("index.html")).unwrap(), "<html>built</html>");
    assert!(!served.join("src").exists());
    assert!(temp.path().join("sites/myspacegame.conf").exists());
    assert!(runner.ran("nginx -s reload"));
}

#[tokio::test]
async fn test_reload_failure_keeps_copied_files() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let mut cfg = config(&temp);
    cfg.proxy_enabled = true;
    let runner = MockProcessRunner::new()
        .on_run("nginx", MockResponse::failure(1, "nginx: [emerg] invalid config"));
    let (observer, seen) = recorder();
    let orchestrator = Orchestrator::new(cfg, Arc::new(runner))
        .unwrap()
        .with_observer(observer);

    let err = orchestrator.deploy("pong", &dir, "pong").await.unwrap_err();
    assert!(err.is_deployment());
    assert!(temp.path().join("www/pong/index.html").exists());

    let entries = orchestrator.deployment_log().read_entries().unwrap();
    assert!(matches!(&entries[0].status, DeployStatus::Failed(reason) if reason.contains("invalid config")));
    assert_eq!(seen.lock().last(), Some(&DeployState::Failed));
}

#[tokio::test]
async fn test_empty_subdomain_is_rejected() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new();
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone())).unwrap();

    let err = orchestrator.deploy("x", &dir, "!!!").await.unwrap_err();
    assert!(matches!(err, RunnerError::Spec(_)));
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_dev_server_starts_despite_failed_install() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new()
        .on_run("install", MockResponse::failure(1, "ERESOLVE unable to resolve"))
        .add_process(MockProcess::serving([
            "> vite",
            "  VITE v5.0.8  ready in 312 ms",
        ]));
    let (observer, seen) = recorder();
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone()))
        .unwrap()
        .with_observer(observer);

    let handle = orchestrator.start_development("space-game", &dir).await.unwrap();

    assert_eq!(handle.kind, DeploymentKind::Development);
    assert!(handle.ready_confirmed);
    let port = handle.port.unwrap();
    assert!(port >= 5173 && port < 5273);
    assert_eq!(handle.url, format!("http://localhost:{}", port));

    let spawn = &runner.get_method_calls("spawn")[0];
    assert!(spawn.command.contains(&format!("--port {}", port)));
    assert_eq!(spawn.workdir.as_deref(), Some(dir.as_path()));

    assert_eq!(
        *seen.lock(),
        vec![DeployState::Installing, DeployState::Starting, DeployState::Ready]
    );
    assert_eq!(orchestrator.list().len(), 1);

    assert!(orchestrator.stop("space-game").await);
    assert!(orchestrator.get("space-game").is_none());
    assert_eq!(runner.kill_count(), 1);
}

#[tokio::test]
async fn test_missing_marker_resolves_unconfirmed() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new().add_process(MockProcess::serving(["compiling..."]));
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner)).unwrap();

    let handle = orchestrator.start_development("slow", &dir).await.unwrap();
    assert!(!handle.ready_confirmed);
    assert!(handle.port.is_some());

    orchestrator.shutdown_all().await;
    assert!(orchestrator.list().is_empty());
}

#[tokio::test]
async fn test_server_exiting_before_ready_fails() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new().add_process(MockProcess::exiting(
        ["SyntaxError: Unexpected token (3:4)"],
        1,
    ));
    let (observer, seen) = recorder();
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner))
        .unwrap()
        .with_observer(observer);

    let err = orchestrator.start_development("broken", &dir).await.unwrap_err();
    match err {
        RunnerError::StartFailed { exit_code, output } => {
            assert_eq!(exit_code, Some(1));
            assert!(output.contains("Unexpected token"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(seen.lock().last(), Some(&DeployState::Failed));
    assert!(orchestrator.get("broken").is_none());
}

#[tokio::test]
async fn test_port_lost_to_race_is_retried() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new()
        .add_process(MockProcess::exiting(["Error: Port 5173 is already in use"], 1))
        .add_process(MockProcess::serving(["  ➜  Local:   http://localhost:5174/"]));
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone())).unwrap();

    let handle = orchestrator.start_development("race", &dir).await.unwrap();
    let spawns = runner.get_method_calls("spawn");
    assert_eq!(spawns.len(), 2);
    assert!(handle.ready_confirmed);

    let first: u16 = port_arg(&spawns[0].command);
    let second: u16 = port_arg(&spawns[1].command);
    assert!(second > first);
    assert_eq!(handle.port, Some(second));

    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_restart_replaces_running_server() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new().add_process(MockProcess::serving(["Local: ok"]));
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone())).unwrap();

    orchestrator.start_development("again", &dir).await.unwrap();
    orchestrator.start_development("again", &dir).await.unwrap();

    assert_eq!(runner.kill_count(), 1);
    assert_eq!(orchestrator.list().len(), 1);
    orchestrator.shutdown_all().await;
    assert_eq!(runner.kill_count(), 2);
}

#[tokio::test]
async fn test_install_spawn_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let dir = project(&temp);
    let runner = MockProcessRunner::new()
        .on_run("install", MockResponse::spawn_error("No such file or directory"));
    let orchestrator = Orchestrator::new(config(&temp), Arc::new(runner.clone())).unwrap();

    let err = orchestrator.start_development("nonpm", &dir).await.unwrap_err();
    assert!(matches!(err, RunnerError::SpawnFailed { .. }));
    assert!(!runner.was_called("spawn"));
}

fn port_arg(command: &str) -> u16 {
    let mut parts = command.split_whitespace();
    while let Some(part) = parts.next() {
        if part == "--port" {
            return parts.next().unwrap().parse().unwrap();
        }
    }
    panic!("no --port in {command}");
}
