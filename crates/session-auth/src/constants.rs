//! Storage keys and endpoint defaults.

/// Store key holding the bearer access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Store key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Additional keys written alongside the credential pair by login flows.
/// Removed on `clear()` so no profile data outlives the session.
pub const DEFAULT_CLEAR_KEYS: &[&str] = &["user"];

/// Key prefixes owned by the session. Anything under these is removed on `clear()`.
pub const DEFAULT_CLEAR_PREFIXES: &[&str] = &["session."];

/// Path of the token refresh endpoint, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh-token";
