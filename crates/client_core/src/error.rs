use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Everything a client call can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The action needs an authenticated session and there is none.
    #[error("sign in first")]
    SignInRequired,
    /// The server answered with a structured error body.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The request never produced a usable response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// The server-side error code, when the failure came from the server.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api(err) => Some(err.code),
            _ => None,
        }
    }
}
