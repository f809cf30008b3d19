//! Error types surfaced by the authenticated client

use transport::{ApiResponse, TransportError};

/// Errors returned from `AuthedClient::send`.
///
/// `SessionCancelled`, `NoRefreshToken` and `RefreshExhausted` mean the
/// session has been torn down and the terminator was notified. `Upstream`
/// and `Transport` are unrelated failures passed through untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session cancelled: {0}")]
    SessionCancelled(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token refresh failed after {attempts} attempts: {source}")]
    RefreshExhausted {
        attempts: u32,
        #[source]
        source: session_auth::Error,
    },

    #[error("upstream returned status {}", .0.status)]
    Upstream(Box<ApiResponse>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("credential store error: {0}")]
    Store(#[from] session_auth::Error),

    #[error("invalid credential header: {0}")]
    InvalidCredential(String),
}

impl Error {
    /// Whether the session was ended as part of this failure.
    pub fn is_session_terminal(&self) -> bool {
        matches!(
            self,
            Error::SessionCancelled(_) | Error::NoRefreshToken | Error::RefreshExhausted { .. }
        )
    }

    /// Upstream response for pass-through failures.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Error::Upstream(response) => Some(&**response),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
