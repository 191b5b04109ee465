use thiserror::Error;

/// Failures of a single session attempt. None of them is retried automatically.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Bootstrap(#[from] reqwest::Error),

    #[error("gateway rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("license key rejected: {0}")]
    LicenseRejected(String),

    #[error("signal lost: {0}")]
    Transport(String),

    #[error("unreadable update frame: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SessionError {
    /// True for failures that happen before a session id exists.
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidUrl(_)
                | SessionError::Bootstrap(_)
                | SessionError::Rejected { .. }
                | SessionError::LicenseRejected(_)
        )
    }
}
