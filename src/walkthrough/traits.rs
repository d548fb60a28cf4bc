use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::walkthrough::types::{CaptureArtifact, ImageEstimate};

/// Exclusive handle on the camera for the lifetime of one session.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Whether camera permission has been granted.
    async fn permission_granted(&self) -> bool;

    /// Begins recording. Resolves with the finished artifact once recording
    /// stops, whether at the duration cap or after [`stop_recording`].
    ///
    /// [`stop_recording`]: CaptureDevice::stop_recording
    async fn start_recording(&self, max_duration: Duration) -> Result<CaptureArtifact>;

    /// Requests the in-flight recording to stop. Safe to call when no
    /// recording is active.
    fn stop_recording(&self);
}

/// Text-to-speech playback.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Speaks `text`. Resolves on natural completion, or early without error
    /// when `stop` interrupts playback.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Interrupts playback; a pending `speak` resolves early.
    async fn stop(&self);
}

/// Push-to-talk speech capture and transcription.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Opens the microphone and starts capturing user speech.
    async fn start_listening(&self) -> Result<()>;

    /// Stops capture and returns the transcript; empty on silence or
    /// failure.
    async fn stop_listening(&self) -> String;
}

/// Remote model access for spoken Q&A and photo-based estimating.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn ask(&self, question: &str, context: &str) -> Result<String>;

    async fn estimate_from_image(&self, image_base64: &str) -> Result<ImageEstimate>;
}
