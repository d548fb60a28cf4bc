use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::walkthrough::types::SessionStatus;

/// Exclusive claim on the capture/narration/listening devices. Held by the
/// worker for the session lifetime and released when the worker ends, even
/// if its task is aborted.
pub(crate) struct ActiveGuard {
    flag: Arc<AtomicBool>,
}

impl ActiveGuard {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Shared snapshot of the session state machine. The worker owns every
/// transition; the handle only reads. Narration and listening are mutually
/// exclusive, and the step index only moves forward (or resets to -1 on
/// cancel).
#[derive(Debug)]
pub(crate) struct SharedState {
    status: AtomicU8,
    current_step: AtomicI32,
    narration_playing: AtomicBool,
    listening: AtomicBool,
    last_message: Mutex<String>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(SessionStatus::Idle.as_u8()),
            current_step: AtomicI32::new(-1),
            narration_playing: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            last_message: Mutex::new(String::new()),
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn current_step(&self) -> i32 {
        self.current_step.load(Ordering::SeqCst)
    }

    pub(crate) fn set_narrating(&self, index: usize) {
        self.listening.store(false, Ordering::SeqCst);
        self.current_step.store(index as i32, Ordering::SeqCst);
        self.status
            .store(SessionStatus::Narrating.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_listening(&self) {
        self.narration_playing.store(false, Ordering::SeqCst);
        self.listening.store(true, Ordering::SeqCst);
        self.status
            .store(SessionStatus::Listening.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn clear_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_narration_playing(&self, playing: bool) {
        debug_assert!(
            !(playing && self.listening.load(Ordering::SeqCst)),
            "narration and listening are mutually exclusive"
        );
        self.narration_playing.store(playing, Ordering::SeqCst);
    }

    pub(crate) fn is_narration_playing(&self) -> bool {
        self.narration_playing.load(Ordering::SeqCst)
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub(crate) fn set_completed(&self) {
        self.narration_playing.store(false, Ordering::SeqCst);
        self.listening.store(false, Ordering::SeqCst);
        self.status
            .store(SessionStatus::Completed.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_cancelled(&self) {
        self.narration_playing.store(false, Ordering::SeqCst);
        self.listening.store(false, Ordering::SeqCst);
        self.current_step.store(-1, Ordering::SeqCst);
        self.status
            .store(SessionStatus::Cancelled.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_last_message(&self, text: &str) {
        let mut guard = self.last_message.lock().expect("last message lock poisoned");
        guard.clear();
        guard.push_str(text);
    }

    pub(crate) fn last_message(&self) -> String {
        self.last_message
            .lock()
            .expect("last message lock poisoned")
            .clone()
    }
}

/// Running log of everything the assistant said and was asked, kept for the
/// partial transcript of a cancelled session.
#[derive(Debug, Default)]
pub(crate) struct TranscriptLog {
    lines: Vec<String>,
}

impl TranscriptLog {
    pub(crate) fn record_assistant(&mut self, text: &str) {
        self.lines.push(format!("Assistant: {text}"));
    }

    pub(crate) fn record_exchange(&mut self, question: &str, answer: &str) {
        self.lines.push(format!("Painter: {question}"));
        self.lines.push(format!("Assistant: {answer}"));
    }

    pub(crate) fn summary(&self) -> String {
        self.lines.join("\n")
    }
}
