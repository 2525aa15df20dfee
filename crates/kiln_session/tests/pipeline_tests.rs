//! End-to-end pipeline runs with a replayed chain and a mock process runner.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use kiln_runner::{MockProcess, MockProcessRunner, Orchestrator, OrchestratorConfig};
use kiln_session::{
    EventPayload, GenerateRequest, GenerationChain, GenerationStage, Pipeline, PipelineEvent,
    PipelineStep, ProjectAssembler, SessionError, SessionResult, SessionStatus, SessionStore,
    StageInput, StageLogWriter, StaticStage,
};
use kiln_spec::FileSource;

const APP_ONLY: &str = r#"Here is your game!

=== src/App.tsx ===
import React from 'react';
import { useState } from 'react';

export default function App() {
  const [score, setScore] = useState(0);
  return <button onClick={() => setScore(score + 1)}>Score: {score}</button>;
}

Enjoy!
"#;

const WITH_UNKNOWN_PACKAGE: &str = r#"=== src/App.tsx ===
import React from 'react';
import { World } from 'foo-engine';

export default function App() {
  const world = new World();
  return <div>{world.name}</div>;
}
"#;

struct FailingStage;

#[async_trait]
impl GenerationStage for FailingStage {
    fn name(&self) -> String {
        "design".to_string()
    }

    async fn generate(&self, _input: StageInput) -> SessionResult<String> {
        Err(SessionError::Llm("API error 401: invalid key".into()))
    }
}

struct Harness {
    temp: TempDir,
    runner: MockProcessRunner,
    pipeline: Arc<Pipeline>,
}

fn harness(stage: Arc<dyn GenerationStage>, runner: MockProcessRunner) -> Harness {
    let temp = TempDir::new().unwrap();
    let config = OrchestratorConfig {
        served_root: temp.path().join("www"),
        deploy_log: temp.path().join("logs/deployments.log"),
        ready_timeout_secs: 1,
        ..Default::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(config, Arc::new(runner.clone())).unwrap());
    let pipeline = Pipeline::new(
        GenerationChain::new().with_stage(stage),
        ProjectAssembler::default(),
        orchestrator,
        Arc::new(SessionStore::new()),
        StageLogWriter::new(temp.path().join("logs")),
        temp.path().join("projects"),
    )
    .unwrap();

    Harness {
        temp,
        runner,
        pipeline: Arc::new(pipeline),
    }
}

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        prompt: prompt.to_string(),
        subdomain: None,
    }
}

async fn collect(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_app_only_output_becomes_running_project() {
    let h = harness(
        Arc::new(StaticStage::new("code", APP_ONLY)),
        MockProcessRunner::new().add_process(MockProcess::serving(["  ➜  Local:   http://localhost:5173/"])),
    );

    let run = h.pipeline.start(request("A clicker game")).unwrap();
    let chat_id = run.chat_id.clone();
    let events = collect(run.events).await;

    assert!(events.iter().all(|e| e.chat_id == chat_id));
    assert_eq!(events.first().unwrap().name(), "progress");
    let last = events.last().unwrap();
    assert_eq!(last.name(), "complete");

    let EventPayload::Complete(summary) = &last.payload else {
        panic!("last event is not complete");
    };
    assert!(summary.validation.valid);
    assert_eq!(summary.validation.required_missing, 0);
    assert!(summary.ready_confirmed);
    assert!(summary.port.is_some());

    let generated: Vec<(&str, FileSource)> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::FileGenerated { path, source, .. } => Some((path.as_str(), *source)),
            _ => None,
        })
        .collect();
    assert!(generated.contains(&("src/App.tsx", FileSource::LlmGenerated)));
    assert!(generated.contains(&("src/main.tsx", FileSource::Fallback)));
    assert!(generated.iter().any(|(p, _)| *p == "index.html"));
    assert!(generated.iter().any(|(p, _)| *p == "package.json"));

    let project_dir = h.temp.path().join("projects").join(&summary.project_id);
    let app = fs::read_to_string(project_dir.join("src/App.tsx")).unwrap();
    assert!(app.contains("Score: {score}"));
    assert!(!app.contains("==="));

    let steps: Vec<PipelineStep> = events
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::StepComplete { step, .. } => Some(step),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            PipelineStep::Generating,
            PipelineStep::Extracting,
            PipelineStep::Analyzing,
            PipelineStep::Materializing,
            PipelineStep::Validating,
            PipelineStep::Launching,
        ]
    );

    // closed and archived
    assert!(h.pipeline.sessions().get(&chat_id).is_none());
    let archived = h.pipeline.session(&chat_id).unwrap();
    assert_eq!(archived.status, SessionStatus::Complete);
    assert!(h.temp.path().join("logs").join(&chat_id).join("0-code.json").exists());

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_unknown_package_is_pinned_to_latest() {
    let h = harness(
        Arc::new(StaticStage::new("code", WITH_UNKNOWN_PACKAGE)),
        MockProcessRunner::new(),
    );
    let (tx, rx) = mpsc::channel(256);

    let session = h
        .pipeline
        .run(
            GenerateRequest {
                prompt: "physics sandbox".into(),
                subdomain: Some("Physics Box".into()),
            },
            tx,
        )
        .await
        .unwrap();
    drop(collect(rx).await);

    assert_eq!(session.project_id, "physicsbox");
    assert_eq!(session.unresolved_dependencies, vec!["foo-engine".to_string()]);

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(session.project_dir.join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["dependencies"]["foo-engine"], "latest");
    assert!(manifest["dependencies"]["react"].is_string());
    assert!(manifest["devDependencies"]["vite"].is_string());

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_chain_failure_emits_error_event() {
    let h = harness(Arc::new(FailingStage), MockProcessRunner::new());

    let run = h.pipeline.start(request("anything")).unwrap();
    let chat_id = run.chat_id.clone();
    let events = collect(run.events).await;

    let last = events.last().unwrap();
    assert_eq!(last.name(), "error");
    match &last.payload {
        EventPayload::Error { step, message } => {
            assert_eq!(*step, PipelineStep::Generating);
            assert!(message.contains("design"));
            assert!(message.contains("invalid key"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert!(!events.iter().any(|e| e.name() == "complete"));

    let archived = h.pipeline.session(&chat_id).unwrap();
    assert_eq!(archived.status, SessionStatus::Failed);
    assert!(!h.runner.was_called("run"));
}

#[tokio::test]
async fn test_start_failure_reports_launch_step() {
    let h = harness(
        Arc::new(StaticStage::new("code", APP_ONLY)),
        MockProcessRunner::new().add_process(MockProcess::exiting(["Error: Cannot find module 'vite'"], 1)),
    );

    let run = h.pipeline.start(request("broken build")).unwrap();
    let project_id = run.project_id.clone();
    let events = collect(run.events).await;

    match &events.last().unwrap().payload {
        EventPayload::Error { step, message } => {
            assert_eq!(*step, PipelineStep::Launching);
            assert!(message.contains("Cannot find module"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    // files stay for inspection
    assert!(h
        .temp
        .path()
        .join("projects")
        .join(project_id)
        .join("src/App.tsx")
        .exists());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_up_front() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), MockProcessRunner::new());

    let err = h.pipeline.start(request("   ")).err().unwrap();
    assert!(err.is_client_error());

    let err = h
        .pipeline
        .start(GenerateRequest {
            prompt: "pong".into(),
            subdomain: Some("!!!".into()),
        })
        .err()
        .unwrap();
    assert!(err.is_client_error());
    assert!(h.pipeline.sessions().is_empty());
    assert_eq!(h.runner.call_count(), 0);
}

fn serving_runner() -> MockProcessRunner {
    MockProcessRunner::new().add_process(MockProcess::serving(["  ➜  Local:   http://localhost:5173/"]))
}

fn on_subdomain(prompt: &str, subdomain: &str) -> GenerateRequest {
    GenerateRequest {
        prompt: prompt.to_string(),
        subdomain: Some(subdomain.to_string()),
    }
}

#[tokio::test]
async fn test_second_session_on_busy_subdomain_is_refused() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), serving_runner());

    let first = h.pipeline.start(on_subdomain("pong", "pong")).unwrap();
    let err = h.pipeline.start(on_subdomain("other pong", "pong")).err().unwrap();
    match &err {
        SessionError::ProjectBusy { project_id, chat_id } => {
            assert_eq!(project_id, "pong");
            assert_eq!(chat_id, &first.chat_id);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_client_error());

    let events = collect(first.events).await;
    assert_eq!(events.last().unwrap().name(), "complete");
    assert_eq!(h.pipeline.sessions().len(), 0);

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_reused_subdomain_stops_old_server_before_rewrite() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), serving_runner());

    let first = h.pipeline.start(on_subdomain("pong", "pong")).unwrap();
    let events = collect(first.events).await;
    assert_eq!(events.last().unwrap().name(), "complete");
    assert!(h.pipeline.orchestrator().get("pong").is_some());
    assert_eq!(h.runner.kill_count(), 0);

    let second = h.pipeline.start(on_subdomain("pong again", "pong")).unwrap();
    let events = collect(second.events).await;
    assert_eq!(events.last().unwrap().name(), "complete");
    assert_eq!(h.runner.kill_count(), 1);

    let stopped_at = events
        .iter()
        .position(|e| {
            matches!(&e.payload, EventPayload::Progress { message, .. }
                if message == "Stopped the running server of pong")
        })
        .unwrap();
    let first_file = events
        .iter()
        .position(|e| e.name() == "file_generated")
        .unwrap();
    assert!(stopped_at < first_file);

    let project_dir = h.temp.path().join("projects/pong");
    assert!(project_dir.join("src/App.tsx").exists());
    assert!(project_dir.join("package.json").exists());
    assert!(h.pipeline.orchestrator().get("pong").is_some());

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_archived_session_keeps_stage_outputs() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), serving_runner());

    let run = h.pipeline.start(request("A clicker game")).unwrap();
    let chat_id = run.chat_id.clone();
    drop(collect(run.events).await);

    let archived = h.pipeline.session(&chat_id).unwrap();
    assert_eq!(archived.stages.len(), 1);
    assert_eq!(archived.stages[0].index, 0);
    assert_eq!(archived.stages[0].stage, "code");
    assert!(archived.stages[0].output.contains("Score: {score}"));

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_manifest_name_follows_prompt_not_subdomain() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), serving_runner());
    let (tx, rx) = mpsc::channel(256);

    let session = h
        .pipeline
        .run(on_subdomain("Physics Sandbox!", "Physics Box"), tx)
        .await
        .unwrap();
    drop(collect(rx).await);

    assert_eq!(session.project_id, "physicsbox");
    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(session.project_dir.join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["name"], "physics-sandbox");

    h.pipeline.orchestrator().shutdown_all().await;
}

#[tokio::test]
async fn test_malformed_chat_ids_are_not_found() {
    let h = harness(Arc::new(StaticStage::new("code", APP_ONLY)), MockProcessRunner::new());

    for chat_id in ["../../etc", "..%2F..", "", "not-a-uuid"] {
        assert!(matches!(
            h.pipeline.session(chat_id),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            h.pipeline.stages(chat_id),
            Err(SessionError::NotFound(_))
        ));
    }
}
