//! Response classification
//!
//! Decides what the dispatch loop does with each upstream response. An
//! explicit session-revoked payload outranks everything, including the
//! status code: it never consumes a retry and goes straight to session
//! termination. Only then is the status checked for an auth failure that
//! the refresh path may still recover.

use transport::{ApiResponse, RequestDescriptor};

use crate::policy::RetryPolicy;

/// Statuses the API uses to reject a stale access token.
pub const UNAUTHORIZED_STATUSES: &[u16] = &[401, 400];

/// Message fragments the API sends when it has revoked the session
/// server-side. Matched case-insensitively against `message` in a
/// `{"success": false, ...}` payload.
pub const DEFAULT_REVOKED_PATTERNS: &[&str] = &[
    "session cancelled",
    "session canceled",
    "session revoked",
    "session has been terminated",
];

/// What the dispatcher should do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// 2xx without a revocation signal: hand back to the caller
    Success,
    /// Server revoked the session: terminate, no refresh
    SessionCancelled(String),
    /// Stale credential on a request still allowed into the refresh path
    Unauthorized,
    /// Anything else: propagate unchanged
    Failed,
}

/// Classifier with a configurable set of revocation patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
    revoked_patterns: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_REVOKED_PATTERNS.iter().copied())
    }
}

impl Classifier {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            revoked_patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The revocation message, if the payload carries one.
    pub fn revoked_message(&self, response: &ApiResponse) -> Option<String> {
        let payload = response.status_payload()?;
        if payload.success != Some(false) {
            return None;
        }
        let message = payload.message?;
        let lower = message.to_lowercase();
        self.revoked_patterns
            .iter()
            .any(|p| lower.contains(p.as_str()))
            .then_some(message)
    }

    pub fn classify(
        &self,
        response: &ApiResponse,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Disposition {
        if let Some(message) = self.revoked_message(response) {
            return Disposition::SessionCancelled(message);
        }
        if response.is_success() {
            return Disposition::Success;
        }
        if UNAUTHORIZED_STATUSES.contains(&response.status)
            && !request.terminal
            && request.retry_count < policy.max_attempts
        {
            return Disposition::Unauthorized;
        }
        Disposition::Failed
    }
}
