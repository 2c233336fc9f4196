use thiserror::Error;

/// Failure taxonomy for the streaming core.
///
/// `Protocol` covers a single malformed chunk and is never terminal for a
/// session: the chunk is logged and skipped. `Transport` and `Provider`
/// terminate only the current session; the scheduler folds their text into
/// the transcript and keeps going.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed stream chunk: {0}")]
    Protocol(String),

    #[error("provider rejected request: {0}")]
    Provider(String),

    #[error("{0}")]
    Configuration(String),

    #[error("cancelled by user")]
    Cancelled,
}

impl ChatError {
    /// Whether this error may be skipped without ending the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Protocol(_))
    }
}
