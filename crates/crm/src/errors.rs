use thiserror::Error;

/// Remote-store failure taxonomy. Transient failures (timeouts, rate
/// limits, 5xx) are absorbed by the engine's fallback path; fatal failures
/// (auth, malformed responses) surface to the caller unretried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("fatal store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
