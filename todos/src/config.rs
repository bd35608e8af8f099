//! Configuration management for the todo client.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is read first when present.

use crate::reducer::PendingPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default REST base URL
pub const DEFAULT_API_URL: &str = "https://mate.academy/students-api";

/// Default session file
pub const DEFAULT_SESSION_FILE: &str = ".todosync-session.json";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// REST base URL (`TODOS_API_URL`)
    pub api_url: String,
    /// Per-request timeout; `None` waits forever (`TODOS_REQUEST_TIMEOUT_SECS`, 0 disables)
    pub request_timeout: Option<Duration>,
    /// File holding the durable session slot (`TODOS_SESSION_FILE`)
    pub session_file: PathBuf,
    /// Error banner lifetime (`TODOS_ERROR_DISPLAY_MS`)
    pub error_display: Duration,
    /// Operations on pending ids (`TODOS_PENDING_POLICY`: `concurrent` or `reject`)
    pub pending_policy: PendingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            error_display: Duration::from_millis(3000),
            pending_policy: PendingPolicy::Concurrent,
        }
    }
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            api_url: lookup("TODOS_API_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.api_url),
            request_timeout: lookup("TODOS_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map_or(defaults.request_timeout, |secs| {
                    (secs > 0).then(|| Duration::from_secs(secs))
                }),
            session_file: lookup("TODOS_SESSION_FILE")
                .map_or(defaults.session_file, PathBuf::from),
            error_display: lookup("TODOS_ERROR_DISPLAY_MS")
                .and_then(|s| s.trim().parse().ok())
                .map_or(defaults.error_display, Duration::from_millis),
            pending_policy: lookup("TODOS_PENDING_POLICY")
                .and_then(|s| {
                    s.parse()
                        .map_err(|error| tracing::warn!(%error, "Ignoring TODOS_PENDING_POLICY"))
                        .ok()
                })
                .unwrap_or(defaults.pending_policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), Config::default());
        assert_eq!(Config::default().request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn reads_every_variable() {
        let config = config(&[
            ("TODOS_API_URL", "http://localhost:3000"),
            ("TODOS_REQUEST_TIMEOUT_SECS", "5"),
            ("TODOS_SESSION_FILE", "/tmp/session.json"),
            ("TODOS_ERROR_DISPLAY_MS", "1500"),
            ("TODOS_PENDING_POLICY", "reject"),
        ]);

        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.session_file, PathBuf::from("/tmp/session.json"));
        assert_eq!(config.error_display, Duration::from_millis(1500));
        assert_eq!(config.pending_policy, PendingPolicy::RejectWhilePending);
    }

    #[test]
    fn zero_timeout_disables_it() {
        assert_eq!(config(&[("TODOS_REQUEST_TIMEOUT_SECS", "0")]).request_timeout, None);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config(&[
            ("TODOS_REQUEST_TIMEOUT_SECS", "soon"),
            ("TODOS_ERROR_DISPLAY_MS", "-1"),
            ("TODOS_PENDING_POLICY", "sometimes"),
        ]);
        assert_eq!(config, Config::default());
    }
}
