//! The fixed narrated script for a guided room scan.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    Greeting,
    Walls,
    Windows,
    Ceiling,
    Complete,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Greeting => "greeting",
            StepId::Walls => "walls",
            StepId::Windows => "windows",
            StepId::Ceiling => "ceiling",
            StepId::Complete => "complete",
        }
    }
}

/// One narrated step. `duration` is the minimum time the step stays on
/// screen; narration that runs longer extends the step instead of being cut
/// off.
#[derive(Debug, Clone)]
pub struct WalkthroughStep {
    pub id: StepId,
    pub script_text: String,
    pub duration: Duration,
}

impl WalkthroughStep {
    pub fn new(id: StepId, script_text: impl Into<String>, duration: Duration) -> Self {
        Self {
            id,
            script_text: script_text.into(),
            duration,
        }
    }
}

/// Ordered, immutable step sequence; built once at session configuration.
#[derive(Debug, Clone)]
pub struct WalkthroughScript {
    steps: Vec<WalkthroughStep>,
}

impl WalkthroughScript {
    pub fn new(steps: Vec<WalkthroughStep>) -> Self {
        Self { steps }
    }

    /// The production script: prompts and step floors of the guided scan.
    pub fn standard() -> Self {
        Self::new(vec![
            WalkthroughStep::new(
                StepId::Greeting,
                "Hey there! I'm your AI estimating assistant. Let's get this room \
                 scanned. Start at the entrance and I'll guide you through.",
                Duration::from_millis(8_000),
            ),
            WalkthroughStep::new(
                StepId::Walls,
                "Perfect. Now slowly pan around the room. I'm analyzing the wall \
                 conditions and looking for any damage that needs prep work.",
                Duration::from_millis(12_000),
            ),
            WalkthroughStep::new(
                StepId::Windows,
                "Great work. Now focus on any windows and doors. I need to see the \
                 trim and frames up close.",
                Duration::from_millis(8_000),
            ),
            WalkthroughStep::new(
                StepId::Ceiling,
                "Almost done! Tilt up and show me the ceiling. I'm checking for any \
                 water damage or texture issues.",
                Duration::from_millis(6_000),
            ),
            WalkthroughStep::new(
                StepId::Complete,
                "Excellent scan! I've got everything I need. Give me a moment to \
                 crunch the numbers.",
                Duration::from_millis(4_000),
            ),
        ])
    }

    pub fn steps(&self) -> &[WalkthroughStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Spoken when the user opens the question channel.
pub const LISTENING_PROMPT: &str = "I'm listening. What's your question?";

/// Spoken instead of an inference round trip when transcription is empty.
pub const CLARIFICATION_PROMPT: &str =
    "I didn't catch that. Try holding the mic button and speaking clearly.";

/// Spoken when the inference service fails or times out; never fatal.
pub const INFERENCE_FALLBACK: &str =
    "I'm having trouble connecting. Let's continue with the scan.";

/// Default reply when the inference service answers with empty content.
pub const EMPTY_ANSWER_FALLBACK: &str = "I didn't quite catch that. Could you repeat?";
