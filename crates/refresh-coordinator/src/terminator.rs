//! Session termination callback
//!
//! The terminator is bound when the client is built. The coordinator calls
//! it at most once per session, after the credential store has been
//! cleared; what it does (redirect to login, print a prompt, exit) is up to
//! the host.

use std::fmt;

use tracing::warn;

/// Why a session was ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEndReason {
    /// Server sent an explicit revocation payload
    SessionCancelled(String),
    /// Stale access token and nothing to refresh it with
    NoRefreshToken,
    /// Every refresh attempt for a request failed
    AttemptsExhausted { attempts: u32, last_error: String },
}

impl SessionEndReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SessionEndReason::SessionCancelled(_) => "session_cancelled",
            SessionEndReason::NoRefreshToken => "no_refresh_token",
            SessionEndReason::AttemptsExhausted { .. } => "attempts_exhausted",
        }
    }
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEndReason::SessionCancelled(message) => {
                write!(f, "session cancelled by server: {message}")
            }
            SessionEndReason::NoRefreshToken => write!(f, "no refresh token"),
            SessionEndReason::AttemptsExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "refresh attempts exhausted after {attempts} attempts: {last_error}"
            ),
        }
    }
}

/// Host callback invoked when the session cannot be recovered.
pub trait SessionTerminator: Send + Sync {
    fn on_session_end(&self, reason: &SessionEndReason);
}

impl<F> SessionTerminator for F
where
    F: Fn(&SessionEndReason) + Send + Sync,
{
    fn on_session_end(&self, reason: &SessionEndReason) {
        self(reason)
    }
}

/// Terminator that only logs. Used when the host has nothing to redirect to.
#[derive(Debug, Default)]
pub struct LoggingTerminator;

impl SessionTerminator for LoggingTerminator {
    fn on_session_end(&self, reason: &SessionEndReason) {
        warn!(reason = %reason, "session ended, re-authentication required");
    }
}
