mod handle;
mod state;
mod worker;

pub use handle::WalkthroughHandle;
pub(crate) use state::ActiveGuard;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::walkthrough::config::WalkthroughConfig;
use crate::walkthrough::traits::{CaptureDevice, InferenceService, Listener, Narrator};
use crate::walkthrough::types::SessionEvent;

use self::state::SharedState;
use self::worker::WalkthroughWorker;

pub(crate) fn spawn_session(
    config: WalkthroughConfig,
    capture: Arc<dyn CaptureDevice>,
    narrator: Arc<dyn Narrator>,
    listener: Arc<dyn Listener>,
    inference: Arc<dyn InferenceService>,
    active: ActiveGuard,
) -> (WalkthroughHandle, mpsc::Receiver<SessionEvent>) {
    let (events_tx, events_rx) = mpsc::channel(config.buffer_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.buffer_capacity);
    let (capture_tx, capture_rx) = oneshot::channel();
    let shared = Arc::new(SharedState::new());

    // Recording starts immediately and runs in the background for the whole
    // session; its artifact joins the script's terminal state in the worker.
    let recorder_capture = Arc::clone(&capture);
    let max_duration = config.max_recording_duration;
    let recorder: JoinHandle<()> = tokio::spawn(async move {
        let outcome = recorder_capture.start_recording(max_duration).await;
        let _ = capture_tx.send(outcome);
    });

    let worker = WalkthroughWorker::new(
        config,
        capture,
        narrator,
        listener,
        inference,
        command_rx,
        capture_rx,
        events_tx,
        Arc::clone(&shared),
        active,
    );
    let worker_task = worker.spawn();
    let handle = WalkthroughHandle::new(command_tx, shared, recorder, worker_task);

    (handle, events_rx)
}
