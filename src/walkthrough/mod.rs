//! Guided capture session runtime.

mod runtime;

pub mod config;
pub mod engine;
pub mod error;
pub mod remote;
pub mod script;
pub mod traits;
pub mod types;

pub use config::{WalkthroughConfig, QUESTION_CONTEXT};
pub use engine::{
    CannedInference, SimulatedCapture, SimulatedListener, SimulatedNarrator,
    WalkthroughOrchestrator,
};
pub use error::SessionError;
pub use remote::{RemoteInference, RemoteInferenceConfig};
pub use runtime::WalkthroughHandle;
pub use script::{StepId, WalkthroughScript, WalkthroughStep};
pub use traits::{CaptureDevice, InferenceService, Listener, Narrator};
pub use types::{
    CaptureArtifact, ImageEstimate, NoticeLevel, RoomAnalysis, SessionEvent, SessionNotice,
    SessionResult, SessionStatus,
};

#[cfg(test)]
mod tests;
