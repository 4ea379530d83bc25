//! Supervisor scenarios against the scripted launcher.

use herd_core::{
    FinishReason, GenerationError, GenerationRequest, GenerationStream, ProcessLauncher,
    SpawnError, StreamItem, StreamingTransformer, Verdict,
};
use herd_runtime::testing::{ScriptStep, ScriptedLauncher, echo_script};
use herd_runtime::{GenerationSupervisor, StallPolicy, SupervisorConfig};
use std::sync::Arc;
use std::time::Duration;

fn supervisor(launcher: &Arc<ScriptedLauncher>, stall: StallPolicy) -> GenerationSupervisor {
    let config = SupervisorConfig {
        stall,
        ..SupervisorConfig::new("/opt/llama.cpp/main")
    };
    let launcher: Arc<dyn ProcessLauncher> = Arc::clone(launcher) as Arc<dyn ProcessLauncher>;
    GenerationSupervisor::new(config, launcher)
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new(prompt, "/models/7B.bin").streaming(true)
}

/// Drain a generation through the streaming transformer.
async fn render(mut stream: GenerationStream) -> (String, Option<FinishReason>, usize) {
    let mut transformer = StreamingTransformer::new();
    let mut items = Vec::new();
    while let Some(verdict) = stream.recv().await {
        items.extend(transformer.push(verdict.unwrap()));
    }
    assert_eq!(items.last(), Some(&StreamItem::Done));

    let mut text = String::new();
    let mut deltas = 0;
    let mut reason = None;
    for item in items {
        match item {
            StreamItem::Delta(delta) => {
                deltas += 1;
                text.push_str(&delta.content);
            }
            StreamItem::Final { delta, .. } => reason = delta.finish_reason,
            StreamItem::Done => {}
        }
    }
    (text, reason, deltas)
}

#[tokio::test]
async fn stop_sequence_is_never_streamed() {
    let mut script = echo_script("Hello", &[" world", " STOP"]);
    script.push(ScriptStep::Hang);
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let stream = supervisor
        .start(request("Hello").with_stop_sequences(vec!["STOP".into()]))
        .await
        .unwrap();
    let (text, reason, _) = render(stream).await;

    assert_eq!(text, " world");
    assert_eq!(reason, Some(FinishReason::Stop));
    assert!(launcher.processes()[0].is_cancelled());
}

#[tokio::test]
async fn stop_sequences_become_reverse_prompts() {
    let launcher = Arc::new(ScriptedLauncher::new().with_script(echo_script("Hi", &[])));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let stream = supervisor
        .start(request("Hi").with_stop_sequences(vec!["User:".into(), String::new()]))
        .await
        .unwrap();
    render(stream).await;

    let args = &launcher.launches()[0].args;
    let reverse_prompts = args.iter().filter(|a| a.as_str() == "--reverse-prompt");
    assert_eq!(reverse_prompts.count(), 1);
    assert_eq!(&args[args.len() - 2..], ["-p", "Hi"]);
}

#[tokio::test]
async fn max_tokens_cuts_off_and_cancels() {
    let script = echo_script("Count", &["1", "2", "3", "4", "5"]);
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let stream = supervisor
        .start(request("Count").with_max_tokens(Some(2)))
        .await
        .unwrap();
    let (text, reason, deltas) = render(stream).await;

    assert_eq!(deltas, 2);
    assert_eq!(text, "12");
    assert_eq!(reason, Some(FinishReason::Length));
    assert!(launcher.processes()[0].cancel_count() >= 1);
}

#[tokio::test]
async fn missing_echo_forwards_nothing() {
    let script = vec![ScriptStep::chunk(" Goodbye"), ScriptStep::chunk(" world")];
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let stream = supervisor.start(request("Hello")).await.unwrap();
    let (text, reason, deltas) = render(stream).await;

    assert_eq!(deltas, 0);
    assert!(text.is_empty());
    assert_eq!(reason, None);
}

#[tokio::test]
async fn process_error_is_surfaced_and_clears_busy() {
    let mut script = echo_script("Hello", &[" partial"]);
    script.push(ScriptStep::Error("stdout read failed".into()));
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let mut stream = supervisor.start(request("Hello")).await.unwrap();
    let mut saw_error = false;
    while let Some(item) = stream.recv().await {
        if let Err(e) = item {
            assert!(matches!(e, GenerationError::Process(_)));
            saw_error = true;
        }
    }

    assert!(saw_error);
    assert!(!supervisor.status().busy);
}

#[tokio::test]
async fn spawn_error_fails_request_and_clears_busy() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let err = supervisor.start(request("Hello")).await.unwrap_err();

    assert!(matches!(
        err,
        GenerationError::Spawn(SpawnError::ExecutableNotFound(_))
    ));
    assert!(!supervisor.status().busy);
    assert_eq!(supervisor.status().current, None);
}

#[tokio::test]
async fn newer_request_preempts_older() {
    let mut first = echo_script("one", &[" a"]);
    first.push(ScriptStep::Hang);
    let mut second = echo_script("two", &[]);
    second.push(ScriptStep::Hang);
    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_script(first)
            .with_script(second),
    );
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let mut older = supervisor.start(request("one")).await.unwrap();
    assert!(matches!(older.recv().await, Some(Ok(Verdict::Emit(_)))));

    let newer = supervisor.start(request("two")).await.unwrap();
    assert!(newer.id() > older.id());

    let Some(Ok(Verdict::Finish { delta, .. })) = older.recv().await else {
        panic!("preempted generation must still finish");
    };
    assert_eq!(delta.finish_reason, None);
    assert!(older.recv().await.is_none());

    // the superseded driver has finished; its release must not free the slot
    let status = supervisor.status();
    assert!(status.busy);
    assert_eq!(status.current, Some(newer.id()));
    assert!(launcher.processes()[0].is_cancelled());
    assert!(!launcher.processes()[1].is_cancelled());

    supervisor.shutdown().await;
    assert!(!supervisor.status().busy);
}

#[tokio::test]
async fn dropped_client_cancels_generation() {
    let mut script = echo_script("Hello", &[]);
    script.push(ScriptStep::Hang);
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());
    let mut status = supervisor.subscribe();

    let stream = supervisor.start(request("Hello")).await.unwrap();
    assert!(supervisor.status().busy);
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| !s.busy))
        .await
        .unwrap()
        .unwrap();
    assert!(launcher.processes()[0].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn stalled_process_is_nudged_and_resumes() {
    let script = vec![
        ScriptStep::chunk(" Hello"),
        ScriptStep::chunk(" a"),
        ScriptStep::Stall,
        ScriptStep::chunk(" b"),
    ];
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let supervisor = supervisor(&launcher, StallPolicy::default());

    let stream = supervisor.start(request("Hello")).await.unwrap();
    let (text, reason, _) = render(stream).await;

    assert_eq!(text, " a b");
    assert_eq!(reason, None);
    assert_eq!(launcher.processes()[0].nudge_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_process_escalates_after_nudge_cap() {
    let mut script = echo_script("Hello", &[" a"]);
    script.push(ScriptStep::Hang);
    let launcher = Arc::new(ScriptedLauncher::new().with_script(script));
    let stall = StallPolicy {
        timeout: Duration::from_secs(20),
        max_nudges: 2,
    };
    let supervisor = supervisor(&launcher, stall);

    let started = tokio::time::Instant::now();
    let mut stream = supervisor.start(request("Hello")).await.unwrap();
    let mut verdicts = Vec::new();
    while let Some(verdict) = stream.recv().await {
        verdicts.push(verdict.unwrap());
    }

    let Some(Verdict::Finish { delta, usage }) = verdicts.last() else {
        panic!("expected terminal verdict, got {verdicts:?}");
    };
    assert_eq!(delta.finish_reason, None);
    assert_eq!(usage.completion_tokens, 1);
    assert!(started.elapsed() >= Duration::from_secs(60));

    let process = &launcher.processes()[0];
    assert_eq!(process.nudge_count(), 2);
    assert!(process.is_cancelled());
}
