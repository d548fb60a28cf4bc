use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::telemetry::events::{
    duration_to_ms, record_question_answered, record_session_finished, SessionFinishedEvent,
};
use crate::walkthrough::config::WalkthroughConfig;
use crate::walkthrough::script::{
    WalkthroughStep, CLARIFICATION_PROMPT, EMPTY_ANSWER_FALLBACK, INFERENCE_FALLBACK,
    LISTENING_PROMPT,
};
use crate::walkthrough::traits::{CaptureDevice, InferenceService, Listener, Narrator};
use crate::walkthrough::types::{
    CaptureArtifact, NoticeLevel, SessionCommand, SessionEvent, SessionNotice, SessionResult,
};

use super::state::{ActiveGuard, SharedState, TranscriptLog};

pub(crate) struct WalkthroughWorker {
    config: WalkthroughConfig,
    capture: Arc<dyn CaptureDevice>,
    narrator: Arc<dyn Narrator>,
    listener: Arc<dyn Listener>,
    inference: Arc<dyn InferenceService>,
    command_rx: mpsc::Receiver<SessionCommand>,
    capture_rx: oneshot::Receiver<Result<CaptureArtifact>>,
    capture_outcome: Option<Result<CaptureArtifact, String>>,
    events_tx: mpsc::Sender<SessionEvent>,
    shared: Arc<SharedState>,
    active: Option<ActiveGuard>,
    transcript: TranscriptLog,
    questions_asked: usize,
}

/// What woke the worker up while it was waiting on a step.
enum WorkerSignal {
    Command(SessionCommand),
    CommandsClosed,
    CaptureFailed(String),
}

enum StepOutcome {
    Advance,
    Cancelled(Option<oneshot::Sender<()>>),
    DeviceFailed(String),
}

enum ExchangeOutcome {
    Resumed,
    Cancelled(Option<oneshot::Sender<()>>),
    DeviceFailed(String),
}

enum SpeakOutcome {
    Done,
    Cancelled(Option<oneshot::Sender<()>>),
    Failed(String),
}

impl WalkthroughWorker {
    pub(crate) fn new(
        config: WalkthroughConfig,
        capture: Arc<dyn CaptureDevice>,
        narrator: Arc<dyn Narrator>,
        listener: Arc<dyn Listener>,
        inference: Arc<dyn InferenceService>,
        command_rx: mpsc::Receiver<SessionCommand>,
        capture_rx: oneshot::Receiver<Result<CaptureArtifact>>,
        events_tx: mpsc::Sender<SessionEvent>,
        shared: Arc<SharedState>,
        active: ActiveGuard,
    ) -> Self {
        Self {
            config,
            capture,
            narrator,
            listener,
            inference,
            command_rx,
            capture_rx,
            capture_outcome: None,
            events_tx,
            shared,
            active: Some(active),
            transcript: TranscriptLog::default(),
            questions_asked: 0,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        let started_at = Instant::now();
        let steps = self.config.script.steps().to_vec();
        let mut cancel_ack: Option<oneshot::Sender<()>> = None;
        let mut cancelled = false;
        let mut steps_completed = 0;

        for (index, step) in steps.iter().enumerate() {
            self.shared.set_narrating(index);
            self.shared.set_last_message(&step.script_text);
            self.transcript.record_assistant(&step.script_text);
            self.emit(SessionEvent::StepStarted {
                index,
                step: step.id,
                message: step.script_text.clone(),
            })
            .await;

            match self.run_step(index, step).await {
                StepOutcome::Advance => {
                    steps_completed = index + 1;
                }
                StepOutcome::Cancelled(ack) => {
                    cancelled = true;
                    cancel_ack = ack;
                    break;
                }
                StepOutcome::DeviceFailed(reason) => {
                    warn!(
                        target: "walkthrough_runtime",
                        %reason,
                        "device failure cancelled the session"
                    );
                    self.emit_notice(NoticeLevel::Error, format!("Scan interrupted: {reason}"))
                        .await;
                    cancelled = true;
                    break;
                }
            }
        }

        if cancelled {
            self.shared.set_cancelled();
        } else {
            self.shared.set_completed();
        }

        // Stop recording; the pending capture future resolves with the
        // artifact. Every stop has now been requested, so cancellation can
        // be acknowledged before the artifact arrives.
        self.capture.stop_recording();
        if let Some(ack) = cancel_ack.take() {
            let _ = ack.send(());
        }

        let video_uri = self.await_capture_artifact().await;

        let result = SessionResult {
            transcript_summary: if cancelled {
                self.transcript.summary()
            } else {
                self.config.analysis.summary.clone()
            },
            suggested_items: if cancelled {
                Vec::new()
            } else {
                self.config.analysis.suggested_items.clone()
            },
            video_uri,
            cancelled,
        };

        record_session_finished(&SessionFinishedEvent {
            steps_completed,
            questions_asked: self.questions_asked,
            cancelled,
            has_video: result.video_uri.is_some(),
            duration_ms: duration_to_ms(started_at.elapsed()),
        });

        // Release the device claim before the result goes out, so a caller
        // reacting to it can immediately start the next session.
        drop(self.active.take());

        self.emit(SessionEvent::Finished(result)).await;
    }

    /// Drives one step: narration completion and the step floor are joined
    /// with a maximum, so speech is never cut off early and a long floor is
    /// honored even when speech finishes first.
    async fn run_step(&mut self, index: usize, step: &WalkthroughStep) -> StepOutcome {
        let narrator = Arc::clone(&self.narrator);
        let text = step.script_text.clone();
        let speak = async move { narrator.speak(&text).await };
        tokio::pin!(speak);
        let floor = sleep(step.duration);
        tokio::pin!(floor);

        self.shared.set_narration_playing(true);
        let mut speech_done = false;
        let mut floor_done = false;

        loop {
            tokio::select! {
                biased;

                signal = self.next_signal() => match signal {
                    WorkerSignal::Command(SessionCommand::Cancel { ack }) => {
                        if !speech_done {
                            self.narrator.stop().await;
                            self.shared.set_narration_playing(false);
                        }
                        return StepOutcome::Cancelled(Some(ack));
                    }
                    WorkerSignal::Command(SessionCommand::AskQuestion) => {
                        if !speech_done {
                            // Interrupt, do not wait: the question channel
                            // always wins over scheduled narration.
                            self.narrator.stop().await;
                            let result = (&mut speak).await;
                            speech_done = true;
                            self.shared.set_narration_playing(false);
                            if let Err(err) = result {
                                return StepOutcome::DeviceFailed(err.to_string());
                            }
                        }
                        match self.run_question_exchange().await {
                            ExchangeOutcome::Resumed => {
                                // Back to the step index held before the
                                // interrupt; a due advance fires only once
                                // the floor check below passes.
                                self.shared.set_narrating(index);
                            }
                            ExchangeOutcome::Cancelled(ack) => {
                                return StepOutcome::Cancelled(ack);
                            }
                            ExchangeOutcome::DeviceFailed(reason) => {
                                return StepOutcome::DeviceFailed(reason);
                            }
                        }
                    }
                    WorkerSignal::Command(SessionCommand::FinishQuestion) => {
                        // No question in flight; nothing to finish.
                    }
                    WorkerSignal::CommandsClosed => {
                        if !speech_done {
                            self.narrator.stop().await;
                            self.shared.set_narration_playing(false);
                        }
                        return StepOutcome::Cancelled(None);
                    }
                    WorkerSignal::CaptureFailed(reason) => {
                        if !speech_done {
                            self.narrator.stop().await;
                            self.shared.set_narration_playing(false);
                        }
                        return StepOutcome::DeviceFailed(reason);
                    }
                },

                result = &mut speak, if !speech_done => {
                    speech_done = true;
                    self.shared.set_narration_playing(false);
                    if let Err(err) = result {
                        return StepOutcome::DeviceFailed(err.to_string());
                    }
                }

                _ = &mut floor, if !floor_done => {
                    floor_done = true;
                }
            }

            if speech_done && floor_done {
                return StepOutcome::Advance;
            }
        }
    }

    /// One question/answer exchange: listen until the mic is released,
    /// transcribe, answer (or fall back), speak the reply, resume.
    async fn run_question_exchange(&mut self) -> ExchangeOutcome {
        self.questions_asked += 1;
        self.shared.set_listening();
        self.shared.set_last_message(LISTENING_PROMPT);
        self.emit(SessionEvent::ListeningStarted).await;

        if let Err(err) = self.listener.start_listening().await {
            self.shared.clear_listening();
            return ExchangeOutcome::DeviceFailed(err.to_string());
        }

        loop {
            match self.next_signal().await {
                WorkerSignal::Command(SessionCommand::FinishQuestion) => break,
                WorkerSignal::Command(SessionCommand::AskQuestion) => {
                    // Already listening; ignore.
                }
                WorkerSignal::Command(SessionCommand::Cancel { ack }) => {
                    let _ = self.listener.stop_listening().await;
                    self.shared.clear_listening();
                    return ExchangeOutcome::Cancelled(Some(ack));
                }
                WorkerSignal::CommandsClosed => {
                    let _ = self.listener.stop_listening().await;
                    self.shared.clear_listening();
                    return ExchangeOutcome::Cancelled(None);
                }
                WorkerSignal::CaptureFailed(reason) => {
                    let _ = self.listener.stop_listening().await;
                    self.shared.clear_listening();
                    return ExchangeOutcome::DeviceFailed(reason);
                }
            }
        }

        let question = self.listener.stop_listening().await;
        self.shared.clear_listening();

        let trimmed = question.trim().to_string();
        if trimmed.is_empty() {
            self.shared.set_last_message(CLARIFICATION_PROMPT);
            self.emit_notice(NoticeLevel::Info, CLARIFICATION_PROMPT.to_string())
                .await;
            return match self.speak_interruptible(CLARIFICATION_PROMPT).await {
                SpeakOutcome::Done => ExchangeOutcome::Resumed,
                SpeakOutcome::Cancelled(ack) => ExchangeOutcome::Cancelled(ack),
                SpeakOutcome::Failed(reason) => ExchangeOutcome::DeviceFailed(reason),
            };
        }

        let asked_at = Instant::now();
        let inference = Arc::clone(&self.inference);
        let context = self.config.question_context.clone();
        let question_for_ask = trimmed.clone();
        let ask = async move { inference.ask(&question_for_ask, &context).await };
        tokio::pin!(ask);

        let reply = loop {
            tokio::select! {
                biased;

                signal = self.next_signal() => match signal {
                    WorkerSignal::Command(SessionCommand::Cancel { ack }) => {
                        return ExchangeOutcome::Cancelled(Some(ack));
                    }
                    WorkerSignal::CommandsClosed => {
                        return ExchangeOutcome::Cancelled(None);
                    }
                    WorkerSignal::CaptureFailed(reason) => {
                        return ExchangeOutcome::DeviceFailed(reason);
                    }
                    WorkerSignal::Command(_) => {
                        // No mic work while the answer is pending.
                    }
                },

                result = &mut ask => break result,
            }
        };

        let (answer, used_fallback) = match reply {
            Ok(text) if !text.trim().is_empty() => (text, false),
            Ok(_) => (EMPTY_ANSWER_FALLBACK.to_string(), true),
            Err(err) => {
                warn!(
                    target: "walkthrough_runtime",
                    %err,
                    "inference unavailable, speaking fallback"
                );
                (INFERENCE_FALLBACK.to_string(), true)
            }
        };
        record_question_answered(asked_at.elapsed(), used_fallback);

        self.transcript.record_exchange(&trimmed, &answer);
        self.shared.set_last_message(&answer);
        self.emit(SessionEvent::QuestionAnswered {
            question: trimmed,
            answer: answer.clone(),
        })
        .await;

        match self.speak_interruptible(&answer).await {
            SpeakOutcome::Done => ExchangeOutcome::Resumed,
            SpeakOutcome::Cancelled(ack) => ExchangeOutcome::Cancelled(ack),
            SpeakOutcome::Failed(reason) => ExchangeOutcome::DeviceFailed(reason),
        }
    }

    async fn speak_interruptible(&mut self, text: &str) -> SpeakOutcome {
        let narrator = Arc::clone(&self.narrator);
        let owned = text.to_string();
        let speak = async move { narrator.speak(&owned).await };
        tokio::pin!(speak);
        self.shared.set_narration_playing(true);

        loop {
            tokio::select! {
                biased;

                signal = self.next_signal() => match signal {
                    WorkerSignal::Command(SessionCommand::Cancel { ack }) => {
                        self.narrator.stop().await;
                        self.shared.set_narration_playing(false);
                        return SpeakOutcome::Cancelled(Some(ack));
                    }
                    WorkerSignal::CommandsClosed => {
                        self.narrator.stop().await;
                        self.shared.set_narration_playing(false);
                        return SpeakOutcome::Cancelled(None);
                    }
                    WorkerSignal::CaptureFailed(reason) => {
                        self.narrator.stop().await;
                        self.shared.set_narration_playing(false);
                        return SpeakOutcome::Failed(reason);
                    }
                    WorkerSignal::Command(_) => {
                        // One exchange at a time; mic taps during the answer
                        // are dropped.
                    }
                },

                result = &mut speak => {
                    self.shared.set_narration_playing(false);
                    return match result {
                        Ok(()) => SpeakOutcome::Done,
                        Err(err) => SpeakOutcome::Failed(err.to_string()),
                    };
                }
            }
        }
    }

    /// Waits for the next command, folding capture completion in along the
    /// way: a finished artifact is held for the final result, a capture
    /// failure surfaces as a signal of its own.
    async fn next_signal(&mut self) -> WorkerSignal {
        loop {
            if self.capture_outcome.is_some() {
                return match self.command_rx.recv().await {
                    Some(command) => WorkerSignal::Command(command),
                    None => WorkerSignal::CommandsClosed,
                };
            }

            tokio::select! {
                biased;

                maybe_command = self.command_rx.recv() => {
                    return match maybe_command {
                        Some(command) => WorkerSignal::Command(command),
                        None => WorkerSignal::CommandsClosed,
                    };
                }

                outcome = &mut self.capture_rx => {
                    match outcome {
                        Ok(Ok(artifact)) => {
                            self.capture_outcome = Some(Ok(artifact));
                        }
                        Ok(Err(err)) => {
                            let reason = err.to_string();
                            self.capture_outcome = Some(Err(reason.clone()));
                            return WorkerSignal::CaptureFailed(reason);
                        }
                        Err(_closed) => {
                            let reason = "capture task dropped".to_string();
                            self.capture_outcome = Some(Err(reason.clone()));
                            return WorkerSignal::CaptureFailed(reason);
                        }
                    }
                }
            }
        }
    }

    /// Joins the terminal script state with the capture artifact. The
    /// session status is already terminal here; only the result is deferred,
    /// bounded by the configured timeout.
    async fn await_capture_artifact(&mut self) -> Option<String> {
        if self.capture_outcome.is_none() {
            match timeout(self.config.capture_result_timeout, &mut self.capture_rx).await {
                Ok(Ok(Ok(artifact))) => {
                    self.capture_outcome = Some(Ok(artifact));
                }
                Ok(Ok(Err(err))) => {
                    self.capture_outcome = Some(Err(err.to_string()));
                }
                Ok(Err(_closed)) => {
                    self.capture_outcome = Some(Err("capture task dropped".to_string()));
                }
                Err(_elapsed) => {
                    self.capture_outcome =
                        Some(Err("capture stop confirmation timed out".to_string()));
                }
            }
        }

        match &self.capture_outcome {
            Some(Ok(artifact)) => Some(artifact.uri.clone()),
            Some(Err(reason)) => {
                warn!(
                    target: "walkthrough_runtime",
                    %reason,
                    "finishing session without video"
                );
                self.emit_notice(
                    NoticeLevel::Warn,
                    "Recording unavailable; continuing without video.".to_string(),
                )
                .await;
                None
            }
            None => None,
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).await.is_err() {
            warn!(
                target: "walkthrough_runtime",
                "failed to deliver session event"
            );
        }
    }

    async fn emit_notice(&self, level: NoticeLevel, message: String) {
        self.emit(SessionEvent::Notice(SessionNotice { level, message }))
            .await;
    }
}
