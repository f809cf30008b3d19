//! Configuration types and loading
//!
//! Config file precedence: `--config` arg > `CONFIG_PATH` env var >
//! `authed.toml` in the working directory. Only `[api].base_url` is
//! required; every other section falls back to defaults.

use refresh_coordinator::{DEFAULT_REVOKED_PATTERNS, RetryPolicy};
use serde::Deserialize;
use session_auth::{ClearPolicy, DEFAULT_CLEAR_KEYS, DEFAULT_CLEAR_PREFIXES, DEFAULT_REFRESH_PATH};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Upstream API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Extra keys removed on logout / session end
    #[serde(default = "default_clear_keys")]
    pub clear_keys: Vec<String>,
    #[serde(default = "default_clear_prefixes")]
    pub clear_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    /// Message fragments that mark a server-side revocation
    #[serde(default = "default_revoked_patterns")]
    pub revoked_patterns: Vec<String>,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_store_path() -> PathBuf {
    PathBuf::from("authed-session.json")
}

fn default_clear_keys() -> Vec<String> {
    DEFAULT_CLEAR_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_clear_prefixes() -> Vec<String> {
    DEFAULT_CLEAR_PREFIXES.iter().map(|p| p.to_string()).collect()
}

fn default_revoked_patterns() -> Vec<String> {
    DEFAULT_REVOKED_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            clear_keys: default_clear_keys(),
            clear_prefixes: default_clear_prefixes(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            revoked_patterns: default_revoked_patterns(),
        }
    }
}

impl StoreConfig {
    pub fn clear_policy(&self) -> ClearPolicy {
        ClearPolicy {
            keys: self.clear_keys.clone(),
            prefixes: self.clear_prefixes.clone(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Absolute refresh endpoint URL.
    pub fn refresh_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.refresh_path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://") && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        config.retry.validate()?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("authed.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch CONFIG_PATH.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authed.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let (_dir, path) = write_config(
            r#"
[api]
base_url = "https://api.example.com"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.refresh_path, "/auth/refresh-token");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.store.path, PathBuf::from("authed-session.json"));
        assert_eq!(config.store.clear_keys, vec!["user"]);
        assert_eq!(config.store.clear_prefixes, vec!["session."]);
        assert!(
            config
                .classifier
                .revoked_patterns
                .iter()
                .any(|p| p == "session revoked")
        );
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
[api]
base_url = "https://api.example.com/"
refresh_path = "/v2/token/refresh"
timeout_secs = 5

[retry]
max_attempts = 5
cooldown_window_ms = 2000
inter_retry_delay_ms = 250

[store]
path = "/var/lib/authed/session.json"
clear_keys = ["user", "profile"]
clear_prefixes = ["cache."]

[classifier]
revoked_patterns = ["kicked out"]
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.refresh_url(), "https://api.example.com/v2/token/refresh");
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.cooldown_window(), Duration::from_millis(2000));
        assert_eq!(config.retry.inter_retry_delay(), Duration::from_millis(250));
        let clear = config.store.clear_policy();
        assert_eq!(clear.keys, vec!["user", "profile"]);
        assert_eq!(clear.prefixes, vec!["cache."]);
        assert_eq!(config.classifier.revoked_patterns, vec!["kicked out"]);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/authed.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_api_section_rejected() {
        let (_dir, path) = write_config("[retry]\nmax_attempts = 2\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let (_dir, path) = write_config(
            r#"
[api]
base_url = "api.example.com"
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (_dir, path) = write_config(
            r#"
[api]
base_url = "https://api.example.com"
timeout_secs = 0
"#,
        );
        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let (_dir, path) = write_config(
            r#"
[api]
base_url = "https://api.example.com"

[retry]
max_attempts = 0
"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, common::Error::Config(_)));
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("authed.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
