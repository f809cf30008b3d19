//! Session credential handling
//!
//! Owns the access/refresh credential pair: where it is persisted, how it is
//! cleared on logout, and how a refresh credential is exchanged for a new
//! pair. This crate has no knowledge of the retry/cooldown policy; the
//! refresh coordinator drives it.
//!
//! Credential flow:
//! 1. Host logs in and calls `CredentialStore::set()` with the issued pair
//! 2. Dispatcher reads `CredentialStore::snapshot()` before each request
//! 3. Coordinator calls `TokenRefresher::refresh()` on expiry
//! 4. Coordinator persists the new pair via `CredentialStore::set()`
//! 5. On session end, `CredentialStore::clear()` removes every session key

pub mod constants;
pub mod credentials;
pub mod error;
pub mod kv;
pub mod token;

pub use constants::*;
pub use credentials::{ClearPolicy, CredentialPair, CredentialStore};
pub use error::{Error, Result};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use token::{HttpRefresher, RefreshResponse, TokenRefresher, refresh_token};
