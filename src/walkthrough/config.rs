use std::time::Duration;

use crate::estimate::LineItem;
use crate::walkthrough::script::WalkthroughScript;
use crate::walkthrough::types::RoomAnalysis;

/// Fixed context string sent with every spoken question.
pub const QUESTION_CONTEXT: &str = "User is scanning a room for a painting estimate";

#[derive(Debug, Clone)]
pub struct WalkthroughConfig {
    pub script: WalkthroughScript,
    /// Upper bound on the recording length; the capture device stops on its
    /// own once this elapses.
    pub max_recording_duration: Duration,
    /// How long a terminal session waits for the capture artifact before
    /// emitting a result without video.
    pub capture_result_timeout: Duration,
    pub question_context: String,
    /// Findings attached to a naturally completed session.
    pub analysis: RoomAnalysis,
    pub buffer_capacity: usize,
}

impl Default for WalkthroughConfig {
    fn default() -> Self {
        Self {
            script: WalkthroughScript::standard(),
            max_recording_duration: Duration::from_secs(60),
            capture_result_timeout: Duration::from_secs(5),
            question_context: QUESTION_CONTEXT.to_string(),
            analysis: RoomAnalysis::standard_room(),
            buffer_capacity: 32,
        }
    }
}

impl RoomAnalysis {
    /// The stock single-room analysis shipped with the guided scan.
    pub fn standard_room() -> Self {
        Self {
            summary: "AI Room Analysis:\n- 4 walls, standard 8ft height\n- 2 windows \
                      with wood trim\n- 1 door frame\n- Ceiling needs minor texture \
                      repair"
                .to_string(),
            suggested_items: vec![
                LineItem {
                    description: "Wall Painting (Standard)".into(),
                    quantity: 320.0,
                    unit_price: 2.50,
                },
                LineItem {
                    description: "Window Trim (x2)".into(),
                    quantity: 2.0,
                    unit_price: 45.0,
                },
                LineItem {
                    description: "Door Frame".into(),
                    quantity: 1.0,
                    unit_price: 35.0,
                },
                LineItem {
                    description: "Ceiling Texture Repair".into(),
                    quantity: 1.0,
                    unit_price: 75.0,
                },
            ],
        }
    }
}
