use thiserror::Error;

/// Failure of a single dispatched upstream call.
///
/// The `Display` text is what the caller sees in the envelope `message`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Failed to authenticate or establish a session with NextGen API.")]
    Unauthenticated,
    #[error("API Error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("An unexpected error occurred. Please try again later.")]
    Unexpected(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
