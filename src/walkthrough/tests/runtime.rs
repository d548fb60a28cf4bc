use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, timeout, Instant};

use crate::walkthrough::config::WalkthroughConfig;
use crate::walkthrough::engine::WalkthroughOrchestrator;
use crate::walkthrough::script::{
    StepId, WalkthroughScript, WalkthroughStep, CLARIFICATION_PROMPT, INFERENCE_FALLBACK,
};
use crate::walkthrough::traits::{CaptureDevice, InferenceService, Listener, Narrator};
use crate::walkthrough::types::{
    CaptureArtifact, ImageEstimate, NoticeLevel, RoomAnalysis, SessionEvent, SessionResult,
    SessionStatus,
};
use crate::walkthrough::SessionError;

struct FakeCapture {
    permission: bool,
    stop: Notify,
    stopped: AtomicBool,
    artifact_delay: Duration,
    fail: bool,
}

impl FakeCapture {
    fn new() -> Self {
        Self {
            permission: true,
            stop: Notify::new(),
            stopped: AtomicBool::new(false),
            artifact_delay: Duration::ZERO,
            fail: false,
        }
    }

    fn denied() -> Self {
        Self {
            permission: false,
            ..Self::new()
        }
    }

    fn slow_artifact(delay: Duration) -> Self {
        Self {
            artifact_delay: delay,
            ..Self::new()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn permission_granted(&self) -> bool {
        self.permission
    }

    async fn start_recording(&self, max_duration: Duration) -> Result<CaptureArtifact> {
        if self.fail {
            sleep(Duration::from_millis(10)).await;
            return Err(anyhow!("encoder crashed"));
        }

        let started = Instant::now();
        tokio::select! {
            _ = sleep(max_duration) => {}
            _ = self.stop.notified() => {}
        }
        if !self.artifact_delay.is_zero() {
            sleep(self.artifact_delay).await;
        }

        Ok(CaptureArtifact {
            uri: "file://scan.mp4".to_string(),
            duration: started.elapsed(),
        })
    }

    fn stop_recording(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop.notify_one();
    }
}

struct FakeNarrator {
    spoken: Mutex<Vec<String>>,
    delay: Duration,
    interrupt: Notify,
    interrupted: AtomicBool,
    stops: AtomicUsize,
}

impl FakeNarrator {
    fn instant() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            delay,
            interrupt: Notify::new(),
            interrupted: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken lock poisoned").clone()
    }

    fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Narrator for FakeNarrator {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken
            .lock()
            .expect("spoken lock poisoned")
            .push(text.to_string());
        self.interrupted.store(false, Ordering::SeqCst);

        if self.delay.is_zero() {
            return Ok(());
        }

        let playback = sleep(self.delay);
        tokio::pin!(playback);
        loop {
            tokio::select! {
                _ = &mut playback => return Ok(()),
                _ = self.interrupt.notified() => {
                    if self.interrupted.swap(false, Ordering::SeqCst) {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        self.interrupt.notify_one();
    }
}

struct FakeListener {
    transcripts: Mutex<VecDeque<&'static str>>,
    active: AtomicBool,
}

impl FakeListener {
    fn silent() -> Self {
        Self::with_transcripts(vec![])
    }

    fn with_transcripts(transcripts: Vec<&'static str>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into_iter().collect()),
            active: AtomicBool::new(false),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listener for FakeListener {
    async fn start_listening(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) -> String {
        self.active.store(false, Ordering::SeqCst);
        self.transcripts
            .lock()
            .expect("transcripts lock poisoned")
            .pop_front()
            .unwrap_or_default()
            .to_string()
    }
}

struct FakeInference {
    replies: Mutex<VecDeque<Result<&'static str, &'static str>>>,
    calls: AtomicUsize,
}

impl FakeInference {
    fn unused() -> Self {
        Self::with_replies(vec![])
    }

    fn with_replies(replies: Vec<Result<&'static str, &'static str>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn ask(&self, _question: &str, _context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .replies
            .lock()
            .expect("replies lock poisoned")
            .pop_front()
        {
            Some(Ok(reply)) => Ok(reply.to_string()),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok("I'm here to help! What would you like to know?".to_string()),
        }
    }

    async fn estimate_from_image(&self, _image_base64: &str) -> Result<ImageEstimate> {
        Err(anyhow!("not exercised by the session runtime"))
    }
}

struct Harness {
    capture: Arc<FakeCapture>,
    narrator: Arc<FakeNarrator>,
    listener: Arc<FakeListener>,
    inference: Arc<FakeInference>,
}

impl Harness {
    fn new(
        capture: FakeCapture,
        narrator: FakeNarrator,
        listener: FakeListener,
        inference: FakeInference,
    ) -> Self {
        Self {
            capture: Arc::new(capture),
            narrator: Arc::new(narrator),
            listener: Arc::new(listener),
            inference: Arc::new(inference),
        }
    }

    fn orchestrator(&self) -> WalkthroughOrchestrator {
        WalkthroughOrchestrator::with_capabilities(
            Arc::clone(&self.capture) as Arc<dyn CaptureDevice>,
            Arc::clone(&self.narrator) as Arc<dyn Narrator>,
            Arc::clone(&self.listener) as Arc<dyn Listener>,
            Arc::clone(&self.inference) as Arc<dyn InferenceService>,
        )
    }
}

fn config_with_steps(steps: Vec<(StepId, u64)>) -> WalkthroughConfig {
    let steps = steps
        .into_iter()
        .map(|(id, floor_ms)| {
            WalkthroughStep::new(
                id,
                format!("scripted prompt for {}", id.as_str()),
                Duration::from_millis(floor_ms),
            )
        })
        .collect();

    WalkthroughConfig {
        script: WalkthroughScript::new(steps),
        capture_result_timeout: Duration::from_secs(1),
        ..WalkthroughConfig::default()
    }
}

async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event should arrive within deadline")
        .expect("event channel should stay open")
}

async fn wait_for_step(events: &mut mpsc::Receiver<SessionEvent>, expected: usize) {
    loop {
        if let SessionEvent::StepStarted { index, .. } = next_event(events).await {
            if index == expected {
                return;
            }
        }
    }
}

async fn wait_for_finished(events: &mut mpsc::Receiver<SessionEvent>) -> SessionResult {
    loop {
        if let SessionEvent::Finished(result) = next_event(events).await {
            return result;
        }
    }
}

#[tokio::test]
async fn zero_duration_steps_run_to_completion() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 0), (StepId::Windows, 0)]))
        .await
        .expect("session starts");

    match next_event(&mut events).await {
        SessionEvent::StepStarted { index, step, .. } => {
            assert_eq!(index, 0);
            assert_eq!(step, StepId::Walls);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut events).await {
        SessionEvent::StepStarted { index, step, .. } => {
            assert_eq!(index, 1);
            assert_eq!(step, StepId::Windows);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled);
    assert_eq!(result.video_uri.as_deref(), Some("file://scan.mp4"));
    assert_eq!(
        result.suggested_items,
        RoomAnalysis::standard_room().suggested_items
    );

    assert_eq!(handle.status(), SessionStatus::Completed);
    assert_eq!(handle.current_step(), 1);
    assert_eq!(harness.narrator.spoken().len(), 2);
    assert!(harness.capture.was_stopped());

    // The result is produced exactly once; the event stream ends after it.
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("channel should close promptly")
            .is_none(),
        "no events may follow the session result"
    );
}

#[tokio::test]
async fn question_interrupt_resumes_the_same_step() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::with_delay(Duration::from_millis(300)),
        FakeListener::with_transcripts(vec!["how much for trim"]),
        FakeInference::with_replies(vec![Ok(
            "Trim work typically runs $2\u{2013}3 per linear foot.",
        )]),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![
            (StepId::Greeting, 0),
            (StepId::Walls, 500),
            (StepId::Windows, 0),
        ]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 1).await;
    handle.ask_question().await.expect("ask accepted");

    match next_event(&mut events).await {
        SessionEvent::ListeningStarted => {}
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(handle.status() == SessionStatus::Listening || harness.listener.is_active());

    handle.finish_question().await.expect("finish accepted");

    match next_event(&mut events).await {
        SessionEvent::QuestionAnswered { question, answer } => {
            assert_eq!(question, "how much for trim");
            assert_eq!(answer, "Trim work typically runs $2\u{2013}3 per linear foot.");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The session resumes at the interrupted step, then advances in order.
    match next_event(&mut events).await {
        SessionEvent::StepStarted { index, .. } => assert_eq!(index, 2),
        other => panic!("unexpected event: {other:?}"),
    }

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled);
    assert_eq!(handle.current_step(), 2);
    assert_eq!(harness.inference.call_count(), 1);
    assert!(harness.narrator.stop_count() >= 1, "narration was interrupted");
    assert!(harness
        .narrator
        .spoken()
        .iter()
        .any(|line| line.contains("Trim work typically runs")));
}

#[tokio::test]
async fn empty_transcript_skips_inference_and_clarifies() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 250)]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 0).await;
    handle.ask_question().await.expect("ask accepted");
    match next_event(&mut events).await {
        SessionEvent::ListeningStarted => {}
        other => panic!("unexpected event: {other:?}"),
    }
    handle.finish_question().await.expect("finish accepted");

    match next_event(&mut events).await {
        SessionEvent::Notice(notice) => {
            assert_eq!(notice.level, NoticeLevel::Info);
            assert_eq!(notice.message, CLARIFICATION_PROMPT);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled);
    assert_eq!(harness.inference.call_count(), 0);
    assert!(harness
        .narrator
        .spoken()
        .iter()
        .any(|line| line == CLARIFICATION_PROMPT));
}

#[tokio::test]
async fn inference_failure_speaks_fallback_and_continues() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::with_transcripts(vec!["do you handle wallpaper"]),
        FakeInference::with_replies(vec![Err("gateway timeout")]),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 250)]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 0).await;
    handle.ask_question().await.expect("ask accepted");
    match next_event(&mut events).await {
        SessionEvent::ListeningStarted => {}
        other => panic!("unexpected event: {other:?}"),
    }
    handle.finish_question().await.expect("finish accepted");

    match next_event(&mut events).await {
        SessionEvent::QuestionAnswered { answer, .. } => {
            assert_eq!(answer, INFERENCE_FALLBACK);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled, "inference failure is never fatal");
}

#[tokio::test]
async fn cancel_is_idempotent_and_tears_down() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::with_delay(Duration::from_secs(5)),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 5_000)]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 0).await;
    handle.cancel().await;

    assert_eq!(handle.status(), SessionStatus::Cancelled);
    assert_eq!(handle.current_step(), -1);
    assert!(harness.capture.was_stopped());
    let stops_after_first = harness.narrator.stop_count();
    assert!(stops_after_first >= 1, "narration stop was requested");

    handle.cancel().await;
    assert_eq!(handle.status(), SessionStatus::Cancelled);
    assert_eq!(harness.narrator.stop_count(), stops_after_first);

    let result = wait_for_finished(&mut events).await;
    assert!(result.cancelled);
    assert!(result.suggested_items.is_empty());
    assert!(result
        .transcript_summary
        .contains("scripted prompt for walls"));
}

#[tokio::test]
async fn cancel_mid_listening_releases_the_microphone() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::with_transcripts(vec!["never delivered"]),
        FakeInference::unused(),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 5_000)]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 0).await;
    handle.ask_question().await.expect("ask accepted");
    match next_event(&mut events).await {
        SessionEvent::ListeningStarted => {}
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(harness.listener.is_active());

    handle.cancel().await;
    assert_eq!(handle.status(), SessionStatus::Cancelled);
    assert!(!harness.listener.is_active(), "microphone must be released");
    assert!(harness.capture.was_stopped());

    let result = wait_for_finished(&mut events).await;
    assert!(result.cancelled);
    assert_eq!(harness.inference.call_count(), 0);
}

#[tokio::test]
async fn repeated_ask_while_listening_is_ignored() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::with_transcripts(vec!["one question"]),
        FakeInference::with_replies(vec![Ok("One answer.")]),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 250)]))
        .await
        .expect("session starts");

    wait_for_step(&mut events, 0).await;
    handle.ask_question().await.expect("ask accepted");
    match next_event(&mut events).await {
        SessionEvent::ListeningStarted => {}
        other => panic!("unexpected event: {other:?}"),
    }

    // A second tap while listening must not open a second exchange.
    handle.ask_question().await.expect("ignored ask still ok");
    handle.finish_question().await.expect("finish accepted");

    match next_event(&mut events).await {
        SessionEvent::QuestionAnswered { answer, .. } => assert_eq!(answer, "One answer."),
        other => panic!("unexpected event: {other:?}"),
    }

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled);
    assert_eq!(harness.inference.call_count(), 1);
}

#[tokio::test]
async fn slow_capture_confirmation_bounds_the_result() {
    let harness = Harness::new(
        FakeCapture::slow_artifact(Duration::from_millis(500)),
        FakeNarrator::instant(),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let mut config = config_with_steps(vec![(StepId::Walls, 0)]);
    config.capture_result_timeout = Duration::from_millis(100);

    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config)
        .await
        .expect("session starts");

    let result = wait_for_finished(&mut events).await;
    assert!(!result.cancelled);
    assert_eq!(result.video_uri, None, "slow artifact is dropped at timeout");
    assert_eq!(handle.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn capture_failure_cancels_the_session() {
    let harness = Harness::new(
        FakeCapture::failing(),
        FakeNarrator::with_delay(Duration::from_millis(50)),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let (handle, mut events) = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 5_000)]))
        .await
        .expect("permission is still granted");

    let mut saw_error_notice = false;
    let result = loop {
        match next_event(&mut events).await {
            SessionEvent::Notice(notice) if notice.level == NoticeLevel::Error => {
                saw_error_notice = true;
            }
            SessionEvent::Finished(result) => break result,
            _ => {}
        }
    };

    assert!(saw_error_notice, "device failure is surfaced as a notice");
    assert!(result.cancelled);
    assert_eq!(result.video_uri, None);
    assert_eq!(handle.status(), SessionStatus::Cancelled);
}

#[tokio::test]
async fn devices_are_exclusive_to_one_session() {
    let harness = Harness::new(
        FakeCapture::new(),
        FakeNarrator::instant(),
        FakeListener::silent(),
        FakeInference::unused(),
    );
    let orchestrator = harness.orchestrator();

    let (first, mut events) = orchestrator
        .start_session(config_with_steps(vec![(StepId::Walls, 5_000)]))
        .await
        .expect("first session starts");
    wait_for_step(&mut events, 0).await;

    let err = orchestrator
        .start_session(config_with_steps(vec![(StepId::Walls, 0)]))
        .await
        .expect_err("devices are held by the first session");
    assert!(matches!(err, SessionError::SessionInProgress));

    first.cancel().await;
    let result = wait_for_finished(&mut events).await;
    assert!(result.cancelled);

    // The claim is released with the result; a fresh session may start.
    let (second, mut second_events) = orchestrator
        .start_session(config_with_steps(vec![(StepId::Walls, 0)]))
        .await
        .expect("second session starts after teardown");
    let result = wait_for_finished(&mut second_events).await;
    assert!(!result.cancelled);
    assert_eq!(second.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn permission_denied_blocks_start() {
    let harness = Harness::new(
        FakeCapture::denied(),
        FakeNarrator::instant(),
        FakeListener::silent(),
        FakeInference::unused(),
    );

    let err = harness
        .orchestrator()
        .start_session(config_with_steps(vec![(StepId::Walls, 0)]))
        .await
        .expect_err("start must fail without camera permission");
    assert!(matches!(err, SessionError::PermissionDenied));
}
