//! Authenticated client with single-flight credential refresh
//!
//! Wraps a `Transport` so every request carries the stored bearer token and
//! survives access-token expiry transparently. The pieces:
//!
//! 1. `AuthedClient` attaches the token, sends, and classifies the response
//! 2. `Classifier` separates revoked sessions, stale credentials, and
//!    ordinary failures
//! 3. `RefreshCoordinator` runs the per-request refresh state machine
//!    (`machine::handle_event`), shares one in-flight refresh between all
//!    concurrent callers, and enforces the cooldown window
//! 4. `SessionTerminator` is notified once when the session cannot be
//!    recovered, after the credential store has been cleared
//!
//! Everything a client needs is injected at construction, so independent
//! clients can coexist in one process.

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod machine;
pub mod policy;
pub mod terminator;

#[cfg(test)]
mod testing;

pub use classify::{Classifier, DEFAULT_REVOKED_PATTERNS, Disposition};
pub use client::{AuthedClient, AuthedClientBuilder};
pub use coordinator::RefreshCoordinator;
pub use error::{Error, Result};
pub use machine::{RefreshAction, RefreshEvent, RefreshState};
pub use policy::RetryPolicy;
pub use terminator::{LoggingTerminator, SessionEndReason, SessionTerminator};
