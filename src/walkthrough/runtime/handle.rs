use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::walkthrough::types::{SessionCommand, SessionStatus};

use super::state::SharedState;

/// Control surface of a running session. Dropping the handle aborts the
/// worker; orderly teardown should call [`cancel`] first.
///
/// [`cancel`]: WalkthroughHandle::cancel
#[derive(Debug)]
pub struct WalkthroughHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    shared: Arc<SharedState>,
    recorder: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WalkthroughHandle {
    pub(super) fn new(
        command_tx: mpsc::Sender<SessionCommand>,
        shared: Arc<SharedState>,
        recorder: JoinHandle<()>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            command_tx,
            shared,
            recorder: Some(recorder),
            worker: Some(worker),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Index of the step currently narrated; -1 when idle or cancelled.
    pub fn current_step(&self) -> i32 {
        self.shared.current_step()
    }

    pub fn last_assistant_message(&self) -> String {
        self.shared.last_message()
    }

    pub fn is_narration_playing(&self) -> bool {
        self.shared.is_narration_playing()
    }

    pub fn is_listening(&self) -> bool {
        self.shared.is_listening()
    }

    /// Opens the question channel. In-flight narration is interrupted
    /// immediately; the session returns to the same step once the exchange
    /// completes.
    pub async fn ask_question(&self) -> Result<()> {
        if self.shared.is_listening() {
            warn!(
                target: "walkthrough_runtime",
                "already listening; ask ignored"
            );
            return Ok(());
        }
        self.command_tx
            .send(SessionCommand::AskQuestion)
            .await
            .map_err(|_| anyhow!("session is no longer running"))
    }

    /// Releases the mic: the captured speech is transcribed and answered.
    pub async fn finish_question(&self) -> Result<()> {
        self.command_tx
            .send(SessionCommand::FinishQuestion)
            .await
            .map_err(|_| anyhow!("session is no longer running"))
    }

    /// Stops narration, listening, and recording, and transitions the
    /// session to cancelled. Idempotent from any state; returns once every
    /// stop has been requested.
    pub async fn cancel(&self) {
        if self.shared.status().is_terminal() {
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SessionCommand::Cancel { ack: ack_tx })
            .await
            .is_err()
        {
            // Worker already gone; nothing left to stop.
            return;
        }
        let _ = ack_rx.await;
    }
}

impl Drop for WalkthroughHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Some(recorder) = self.recorder.take() {
            recorder.abort();
        }
    }
}
