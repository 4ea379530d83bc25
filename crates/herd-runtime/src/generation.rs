//! Per-request generation driver.
//!
//! One task per generation consumes the process event stream and runs each
//! chunk through the echo filter and stop policy, forwarding verdicts to the
//! HTTP layer. The same loop watches for preemption, client disconnect and
//! stalls.

use futures_util::StreamExt;
use herd_core::{
    EchoFilter, EchoMode, GenerationError, GenerationId, GenerationRequest, ProcessControl,
    ProcessEvent, ProcessEventStream, StopPolicy, Verdict,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::watchdog::{StallAction, StallPolicy, StallWatchdog, sleep_until_deadline};

type VerdictSender = mpsc::Sender<Result<Verdict, GenerationError>>;

/// How a drive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriveOutcome {
    /// The process closed and the terminal verdict was sent.
    Finished,
    /// The process reported an error.
    Failed,
    /// A newer request took over the slot.
    Preempted,
    /// The process stopped producing output and nudges did not help.
    Stalled,
    /// The consumer went away.
    Abandoned,
}

pub(crate) struct Drive {
    pub id: GenerationId,
    pub request: GenerationRequest,
    pub echo_mode: EchoMode,
    pub stall: StallPolicy,
    pub control: Arc<dyn ProcessControl>,
    pub events: ProcessEventStream,
    pub preempt: CancellationToken,
    pub tx: VerdictSender,
}

impl Drive {
    pub(crate) async fn run(self) -> DriveOutcome {
        let Self {
            id,
            request,
            echo_mode,
            stall,
            control,
            mut events,
            preempt,
            tx,
        } = self;

        let mut echo = EchoFilter::new(&request.prompt, echo_mode);
        let mut policy = StopPolicy::new(&request);
        let mut watchdog = StallWatchdog::new(stall);

        loop {
            tokio::select! {
                biased;

                () = preempt.cancelled() => {
                    info!(generation = %id, "Generation preempted");
                    control.cancel();
                    send_finish(&tx, &mut policy).await;
                    return DriveOutcome::Preempted;
                }

                () = tx.closed() => {
                    info!(generation = %id, "Client disconnected, cancelling generation");
                    control.cancel();
                    return DriveOutcome::Abandoned;
                }

                event = events.next() => match event {
                    Some(ProcessEvent::Data(bytes)) => {
                        debug!(generation = %id, bytes = bytes.len(), "Process output");
                        let Some(text) = echo.push(&bytes) else {
                            continue;
                        };
                        let Some(verdict) = policy.evaluate(&text) else {
                            continue;
                        };
                        if matches!(verdict, Verdict::Emit(_)) {
                            watchdog.arm();
                        }
                        if tx.send(Ok(verdict)).await.is_err() {
                            control.cancel();
                            return DriveOutcome::Abandoned;
                        }
                        if policy.is_stopped() {
                            info!(
                                generation = %id,
                                reason = ?policy.latched(),
                                completion_tokens = policy.completion_tokens(),
                                "Stop condition reached, cancelling process"
                            );
                            watchdog.disarm();
                            control.cancel();
                        }
                    }
                    Some(ProcessEvent::Closed) | None => {
                        watchdog.disarm();
                        send_finish(&tx, &mut policy).await;
                        info!(
                            generation = %id,
                            completion_tokens = policy.completion_tokens(),
                            echo_seen = echo.echo_complete(),
                            "Generation done"
                        );
                        return DriveOutcome::Finished;
                    }
                    Some(ProcessEvent::Errored(message)) => {
                        warn!(generation = %id, error = %message, "Generation process failed");
                        control.cancel();
                        let _ = tx.send(Err(GenerationError::Process(message))).await;
                        return DriveOutcome::Failed;
                    }
                },

                () = sleep_until_deadline(watchdog.deadline()) => match watchdog.on_expiry() {
                    StallAction::Nudge { attempt } => {
                        warn!(generation = %id, attempt, "Generation stalled, nudging process");
                        if let Err(e) = control.nudge().await {
                            warn!(generation = %id, error = %e, "Failed to nudge process");
                        }
                    }
                    StallAction::Escalate => {
                        warn!(
                            generation = %id,
                            nudges = watchdog.nudges(),
                            "Generation still stalled after nudging, cancelling"
                        );
                        control.cancel();
                        send_finish(&tx, &mut policy).await;
                        return DriveOutcome::Stalled;
                    }
                },
            }
        }
    }
}

async fn send_finish(tx: &VerdictSender, policy: &mut StopPolicy) {
    if let Some(finish) = policy.finish() {
        // receiver may already be gone
        let _ = tx.send(Ok(finish)).await;
    }
}
