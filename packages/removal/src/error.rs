use imaging::ImagingError;

/// Errors from the background-removal call.
#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    /// The provider answered with a non-success status.
    #[error("remove.bg error: {message}")]
    Status { status: u16, message: String },

    #[error("remove.bg request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The input could not be transcoded into something the provider accepts.
    #[error("could not prepare image for remove.bg: {0}")]
    Normalize(#[from] ImagingError),

    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        last: Box<RemovalError>,
    },

    #[error("remove.bg client misconfigured: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl RemovalError {
    /// Whether another attempt could succeed: timeouts and connection failures,
    /// 5xx responses and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            RemovalError::Status { status, .. } => *status >= 500 || *status == 429,
            RemovalError::Network(e) => crate::is_retryable_reqwest_error(e),
            _ => false,
        }
    }

    /// HTTP status of the last provider response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemovalError::Status { status, .. } => Some(*status),
            RemovalError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
