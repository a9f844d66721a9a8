use thiserror::Error;

/// Why a token or login-defaults step failed. Only logged; callers see
/// [`GatewayError::Unauthenticated`](super::GatewayError::Unauthenticated).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0} is not configured")]
    Missing(&'static str),
    #[error("{step} request timed out")]
    Timeout { step: &'static str },
    #[error("{step} request failed: {detail}")]
    Transport { step: &'static str, detail: String },
    #[error("{step} rejected with status {status}: {body}")]
    Rejected {
        step: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Malformed(String),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Missing(_) => "config",
            AuthError::Timeout { .. } => "timeout",
            AuthError::Transport { .. } => "transport",
            AuthError::Rejected { .. } => "rejected",
            AuthError::Malformed(_) => "malformed",
        }
    }
}
