use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, Instant};
use tracing::info;

use crate::estimate::LineItem;
use crate::walkthrough::config::WalkthroughConfig;
use crate::walkthrough::error::SessionError;
use crate::walkthrough::runtime::{self, ActiveGuard, WalkthroughHandle};
use crate::walkthrough::traits::{CaptureDevice, InferenceService, Listener, Narrator};
use crate::walkthrough::types::{CaptureArtifact, ImageEstimate, SessionEvent};

/// Owns one set of capture/narration/listening/inference capabilities and
/// starts guided sessions against them. Capabilities are injected so tests
/// and alternate device backends run against the same runtime.
pub struct WalkthroughOrchestrator {
    capture: Arc<dyn CaptureDevice>,
    narrator: Arc<dyn Narrator>,
    listener: Arc<dyn Listener>,
    inference: Arc<dyn InferenceService>,
    session_active: Arc<AtomicBool>,
}

impl WalkthroughOrchestrator {
    /// Builds an orchestrator over the simulated capabilities; useful for
    /// development and demos without camera or microphone hardware.
    pub fn simulated() -> Self {
        Self::with_capabilities(
            Arc::new(SimulatedCapture::new()),
            Arc::new(SimulatedNarrator::new()),
            Arc::new(SimulatedListener::new()),
            Arc::new(CannedInference::default()),
        )
    }

    pub fn with_capabilities(
        capture: Arc<dyn CaptureDevice>,
        narrator: Arc<dyn Narrator>,
        listener: Arc<dyn Listener>,
        inference: Arc<dyn InferenceService>,
    ) -> Self {
        Self {
            capture,
            narrator,
            listener,
            inference,
            session_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts one guided session. Fails fast with `PermissionDenied` when
    /// the camera is unavailable and with `SessionInProgress` while another
    /// session holds the devices; recording begins before the first narrated
    /// step otherwise.
    pub async fn start_session(
        &self,
        config: WalkthroughConfig,
    ) -> Result<(WalkthroughHandle, mpsc::Receiver<SessionEvent>), SessionError> {
        if !self.capture.permission_granted().await {
            return Err(SessionError::PermissionDenied);
        }
        let active = ActiveGuard::acquire(&self.session_active)
            .ok_or(SessionError::SessionInProgress)?;

        info!(
            target: "walkthrough_runtime",
            steps = config.script.len(),
            "starting guided capture session"
        );

        Ok(runtime::spawn_session(
            config,
            Arc::clone(&self.capture),
            Arc::clone(&self.narrator),
            Arc::clone(&self.listener),
            Arc::clone(&self.inference),
            active,
        ))
    }
}

/// In-memory stand-in for the camera; stops at the duration cap or on
/// request and hands back a synthetic artifact.
pub struct SimulatedCapture {
    permission: bool,
    stop: Notify,
    counter: AtomicUsize,
}

impl SimulatedCapture {
    pub fn new() -> Self {
        Self {
            permission: true,
            stop: Notify::new(),
            counter: AtomicUsize::new(0),
        }
    }

    /// A capture device whose permission prompt was declined.
    pub fn denied() -> Self {
        Self {
            permission: false,
            ..Self::new()
        }
    }
}

impl Default for SimulatedCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SimulatedCapture {
    async fn permission_granted(&self) -> bool {
        self.permission
    }

    async fn start_recording(&self, max_duration: Duration) -> Result<CaptureArtifact> {
        let started = Instant::now();
        let index = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::select! {
            _ = sleep(max_duration) => {}
            _ = self.stop.notified() => {}
        }

        Ok(CaptureArtifact {
            uri: format!("memory://capture-{index}.mp4"),
            duration: started.elapsed(),
        })
    }

    fn stop_recording(&self) {
        self.stop.notify_one();
    }
}

/// Text-to-speech stand-in that paces itself by word count and honors stop
/// requests mid-utterance.
pub struct SimulatedNarrator {
    interrupt: Notify,
    interrupted: AtomicBool,
    pace_per_word: Duration,
}

impl SimulatedNarrator {
    pub fn new() -> Self {
        Self::with_pace(Duration::from_millis(30))
    }

    pub fn with_pace(pace_per_word: Duration) -> Self {
        Self {
            interrupt: Notify::new(),
            interrupted: AtomicBool::new(false),
            pace_per_word,
        }
    }
}

impl Default for SimulatedNarrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Narrator for SimulatedNarrator {
    async fn speak(&self, text: &str) -> Result<()> {
        // A stop that raced a previous utterance must not clip this one.
        self.interrupted.store(false, Ordering::SeqCst);

        let words = text.split_whitespace().count().max(1) as u32;
        let playback = sleep(self.pace_per_word * words);
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
        self.interrupted.store(true, Ordering::SeqCst);
        self.interrupt.notify_one();
    }
}

/// Microphone stand-in that replays queued transcripts; empty once the
/// queue runs dry.
pub struct SimulatedListener {
    transcripts: Mutex<VecDeque<String>>,
    active: AtomicBool,
}

impl SimulatedListener {
    pub fn new() -> Self {
        Self::with_transcripts(Vec::new())
    }

    pub fn with_transcripts(transcripts: Vec<String>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into_iter().collect()),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for SimulatedListener {
    async fn start_listening(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) -> String {
        self.active.store(false, Ordering::SeqCst);
        self.transcripts
            .lock()
            .expect("transcript queue lock poisoned")
            .pop_front()
            .unwrap_or_default()
    }
}

/// Inference stand-in with fixed replies, mirroring the service defaults.
#[derive(Default)]
pub struct CannedInference;

#[async_trait]
impl InferenceService for CannedInference {
    async fn ask(&self, _question: &str, _context: &str) -> Result<String> {
        Ok("I'm here to help! What would you like to know?".to_string())
    }

    async fn estimate_from_image(&self, _image_base64: &str) -> Result<ImageEstimate> {
        Ok(ImageEstimate {
            items: vec![
                LineItem {
                    description: "Patch and sand wall damage".into(),
                    quantity: 1.0,
                    unit_price: 85.0,
                },
                LineItem {
                    description: "Sand and prep trim".into(),
                    quantity: 1.0,
                    unit_price: 60.0,
                },
            ],
            complexity: "Medium".to_string(),
        })
    }
}
