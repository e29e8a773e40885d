//! Control-client error taxonomy (spec.md §4.2/§7): only `NotFound` is
//! retryable, and only in the `answer` path; `TransportError` drives
//! client-side reconnect loops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("channel {0} not found on engine")]
    NotFound(String),

    #[error("transport error talking to engine: {0}")]
    TransportError(#[source] reqwest::Error),

    #[error("engine returned a malformed or unexpected response: {0}")]
    ProtocolError(String),

    #[error("engine rejected credentials")]
    AuthError,
}

impl From<reqwest::Error> for ControlError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(404) {
            ControlError::NotFound(String::new())
        } else if e.status().map(|s| s.as_u16()) == Some(401) {
            ControlError::AuthError
        } else {
            ControlError::TransportError(e)
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
