use std::time::Duration;

use tokio::sync::oneshot;

use crate::estimate::LineItem;
use crate::walkthrough::script::StepId;

/// Externally observable phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Narrating,
    Listening,
    Cancelled,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Narrating => "narrating",
            SessionStatus::Listening => "listening",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Cancelled | SessionStatus::Completed)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            SessionStatus::Idle => 0,
            SessionStatus::Narrating => 1,
            SessionStatus::Listening => 2,
            SessionStatus::Cancelled => 3,
            SessionStatus::Completed => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Narrating,
            2 => SessionStatus::Listening,
            3 => SessionStatus::Cancelled,
            4 => SessionStatus::Completed,
            _ => SessionStatus::Idle,
        }
    }
}

/// A finished recording. Ownership of the file transfers from the capture
/// device into the session result when recording stops.
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    pub uri: String,
    pub duration: Duration,
}

/// Room findings attached to a completed session: a narration-ready summary
/// plus priced line-item suggestions.
#[derive(Debug, Clone)]
pub struct RoomAnalysis {
    pub summary: String,
    pub suggested_items: Vec<LineItem>,
}

/// Structured reply of the photo-analysis inference path.
#[derive(Debug, Clone)]
pub struct ImageEstimate {
    pub items: Vec<LineItem>,
    pub complexity: String,
}

/// Terminal output of a session; produced exactly once.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub transcript_summary: String,
    pub suggested_items: Vec<LineItem>,
    pub video_uri: Option<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct SessionNotice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Events emitted by the session worker, single delivery per event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StepStarted {
        index: usize,
        step: StepId,
        message: String,
    },
    ListeningStarted,
    QuestionAnswered {
        question: String,
        answer: String,
    },
    Notice(SessionNotice),
    Finished(SessionResult),
}

#[derive(Debug)]
pub(crate) enum SessionCommand {
    AskQuestion,
    FinishQuestion,
    Cancel { ack: oneshot::Sender<()> },
}
