use thiserror::Error;

/// A REST call that did not produce a usable response.
///
/// `Clone` so one failed request can be handed to every caller that was
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Local persistence failed: {0}")]
    Persistence(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Chapter {value} is outside {min}..={max}")]
    InvalidRange { value: i64, min: u32, max: u32 },

    #[error("Failed to save reading progress: {0}")]
    Fetch(#[from] FetchError),
}

impl ProgressError {
    /// Whether the same call may succeed if tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProgressError::Fetch(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cached page does not match the requested type: {0}")]
    Decode(String),
}
