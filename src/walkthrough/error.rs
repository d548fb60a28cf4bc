use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("a capture session is already active")]
    SessionInProgress,
    #[error("capture device failure: {reason}")]
    DeviceIo { reason: String },
}
