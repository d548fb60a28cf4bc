use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::estimator";
pub(crate) const EVENT_SESSION: &str = "capture_session_finished";
pub(crate) const EVENT_QUESTION: &str = "capture_question_answered";
pub(crate) const EVENT_BID_SAVED: &str = "bid_saved";
pub(crate) const EVENT_BID_FAILED: &str = "bid_save_failed";

#[derive(Debug, Serialize)]
pub struct SessionFinishedEvent {
    pub steps_completed: usize,
    pub questions_asked: usize,
    pub cancelled: bool,
    pub has_video: bool,
    pub duration_ms: u64,
}

pub fn record_session_finished(event: &SessionFinishedEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SESSION,
            steps_completed = event.steps_completed,
            questions_asked = event.questions_asked,
            cancelled = event.cancelled,
            has_video = event.has_video,
            duration_ms = event.duration_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SESSION,
            %err,
            "failed to encode session finished event"
        ),
    }
}

pub fn record_question_answered(latency: Duration, used_fallback: bool) {
    info!(
        target: TARGET,
        event = EVENT_QUESTION,
        latency_ms = duration_to_ms(latency),
        used_fallback,
    );
}

pub fn record_bid_saved(bid_id: &str, item_count: usize, estimated_cost: f64) {
    info!(
        target: TARGET,
        event = EVENT_BID_SAVED,
        bid_id,
        item_count,
        estimated_cost,
    );
}

pub fn record_bid_save_failed(status_code: u16, error: &str) {
    warn!(
        target: TARGET,
        event = EVENT_BID_FAILED,
        status_code,
        error,
    );
}

pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
