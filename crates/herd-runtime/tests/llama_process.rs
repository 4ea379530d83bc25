//! The real launcher against shell scripts standing in for llama.cpp.

#![cfg(unix)]

use futures_util::StreamExt;
use herd_core::{
    AggregateTransformer, FinishReason, GenerationRequest, LaunchSpec, ProcessEvent,
    ProcessLauncher, SpawnError,
};
use herd_runtime::{GenerationSupervisor, LlamaLauncher, SupervisorConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Prints the `-p` prompt with a leading space, then a few tokens.
const FAKE_MAIN: &str = r#"#!/bin/sh
prompt=""
while [ $# -gt 0 ]; do
  case "$1" in
    -p) prompt="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf ' %s' "$prompt"
sleep 0.2
for tok in ' world' ' STOP' ' never'; do
  printf '%s' "$tok"
  sleep 0.2
done
"#;

fn model_file(dir: &Path) -> PathBuf {
    let path = dir.join("model.bin");
    std::fs::write(&path, b"not really a model").unwrap();
    path
}

/// Run `body` with `/bin/sh` so the script file itself is never exec'd.
fn sh_spec(dir: &TempDir, body: &str) -> LaunchSpec {
    let script = dir.path().join("script.sh");
    std::fs::write(&script, body).unwrap();
    LaunchSpec {
        executable: PathBuf::from("/bin/sh"),
        model_path: model_file(dir.path()),
        args: vec![script.to_string_lossy().into_owned()],
    }
}

async fn collect_text(events: herd_core::ProcessEventStream) -> (String, Option<ProcessEvent>) {
    let events: Vec<ProcessEvent> = events.collect().await;
    let mut text = String::new();
    let mut terminal = None;
    for event in events {
        match event {
            ProcessEvent::Data(bytes) => text.push_str(&String::from_utf8_lossy(&bytes)),
            other => terminal = Some(other),
        }
    }
    (text, terminal)
}

#[tokio::test]
async fn launcher_streams_stdout_then_closes() {
    let dir = TempDir::new().unwrap();
    let spec = sh_spec(&dir, "printf ' Hello'; printf ' world'\n");

    let process = LlamaLauncher::default().launch(&spec).await.unwrap();
    assert!(process.control.pid().is_some());

    let (text, terminal) = collect_text(process.events).await;
    assert_eq!(text, " Hello world");
    assert_eq!(terminal, Some(ProcessEvent::Closed));
}

#[tokio::test]
async fn nudge_writes_newline_to_stdin() {
    let dir = TempDir::new().unwrap();
    let spec = sh_spec(&dir, "printf ' waiting'; read line; printf ' resumed'\n");

    let process = LlamaLauncher::default().launch(&spec).await.unwrap();
    process.control.nudge().await.unwrap();

    let (text, terminal) = collect_text(process.events).await;
    assert_eq!(text, " waiting resumed");
    assert_eq!(terminal, Some(ProcessEvent::Closed));
}

#[tokio::test]
async fn cancel_interrupts_running_process() {
    let dir = TempDir::new().unwrap();
    let spec = sh_spec(&dir, "printf ' started'; exec sleep 30\n");

    let process = LlamaLauncher::new(Duration::from_millis(500))
        .launch(&spec)
        .await
        .unwrap();
    let mut events = process.events;
    assert!(matches!(events.next().await, Some(ProcessEvent::Data(_))));

    process.control.cancel();
    process.control.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(10), events.next())
        .await
        .unwrap();
    assert_eq!(closed, Some(ProcessEvent::Closed));
}

#[tokio::test]
async fn launcher_rejects_missing_executable() {
    let dir = TempDir::new().unwrap();
    let spec = LaunchSpec {
        executable: dir.path().join("main"),
        model_path: model_file(dir.path()),
        args: Vec::new(),
    };

    let err = LlamaLauncher::default().launch(&spec).await.unwrap_err();
    assert!(matches!(err, SpawnError::ExecutableNotFound(_)));
}

#[tokio::test]
async fn launcher_rejects_missing_model() {
    let dir = TempDir::new().unwrap();
    let spec = LaunchSpec {
        executable: PathBuf::from("/bin/sh"),
        model_path: dir.path().join("missing.bin"),
        args: Vec::new(),
    };

    let err = LlamaLauncher::default().launch(&spec).await.unwrap_err();
    assert!(matches!(err, SpawnError::ModelNotFound(_)));
}

#[tokio::test]
async fn supervisor_runs_fake_llama_end_to_end() {
    let dir = TempDir::new().unwrap();
    let executable = dir.path().join("main");
    std::fs::write(&executable, FAKE_MAIN).unwrap();
    std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = SupervisorConfig::new(&executable);
    let supervisor = GenerationSupervisor::new(
        config,
        Arc::new(LlamaLauncher::new(Duration::from_millis(500))),
    );

    let request = GenerationRequest::new("Hello", model_file(dir.path()))
        .with_stop_sequences(vec!["STOP".into()]);
    let mut stream = supervisor.start(request).await.unwrap();

    let mut transformer = AggregateTransformer::new();
    let mut aggregate = None;
    while let Some(verdict) = stream.recv().await {
        if let Some(done) = transformer.push(verdict.unwrap()) {
            aggregate = Some(done);
        }
    }
    let aggregate = aggregate.unwrap();

    assert!(!aggregate.text.contains("STOP"));
    assert!(!aggregate.text.contains("never"));
    assert_eq!(aggregate.finish_reason, Some(FinishReason::Stop));
    assert!(!supervisor.status().busy);
}
