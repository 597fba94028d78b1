//! Gateway configuration
//!
//! Build it programmatically, or read it from `KUBEGATE_*` environment
//! variables. No config files beyond the kubeconfig itself.
//!
//! # Example
//!
//! ```
//! use kubegate::config::GatewayConfig;
//! use std::time::Duration;
//!
//! let config = GatewayConfig::new()
//!     .kubeconfig("/etc/kubegate/kubeconfig")
//!     .context("staging")
//!     .read_timeout(Duration::from_secs(10))
//!     .log_tail(500);
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_KUBECONFIG: &str = "KUBEGATE_KUBECONFIG";
pub const ENV_CONTEXT: &str = "KUBEGATE_CONTEXT";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "KUBEGATE_REQUEST_TIMEOUT_SECS";
pub const ENV_LOG_TAIL: &str = "KUBEGATE_LOG_TAIL";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Kubeconfig path; `None` uses `KUBECONFIG` or `~/.kube/config`
    pub kubeconfig: Option<PathBuf>,

    /// Initial active context, overriding the kubeconfig's current-context
    pub context: Option<String>,

    /// Read timeout for API requests
    pub read_timeout: Duration,

    /// Wait before the single discovery retry
    pub discovery_backoff: Duration,

    /// Group-versions discovered in parallel
    pub discovery_concurrency: usize,

    /// Default number of log lines for log reads; `None` reads everything
    pub log_tail: Option<i64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            read_timeout: Duration::from_secs(30),
            discovery_backoff: Duration::from_millis(200),
            discovery_concurrency: 8,
            log_tail: None,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `KUBEGATE_*` variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GatewayConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_KUBECONFIG).filter(|v| !v.is_empty()) {
            config.kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(context) = lookup(ENV_CONTEXT).filter(|v| !v.is_empty()) {
            config.context = Some(context);
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = parse(ENV_REQUEST_TIMEOUT_SECS, &value)?;
            if secs == 0 {
                return Err(invalid(ENV_REQUEST_TIMEOUT_SECS, &value));
            }
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(ENV_LOG_TAIL) {
            let tail: i64 = parse(ENV_LOG_TAIL, &value)?;
            if tail < 0 {
                return Err(invalid(ENV_LOG_TAIL, &value));
            }
            config.log_tail = Some(tail);
        }

        Ok(config)
    }

    /// Set kubeconfig path
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Set initial context
    pub fn context(mut self, name: impl Into<String>) -> Self {
        self.context = Some(name.into());
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn discovery_backoff(mut self, backoff: Duration) -> Self {
        self.discovery_backoff = backoff;
        self
    }

    /// Set discovery parallelism (at least 1)
    pub fn discovery_concurrency(mut self, n: usize) -> Self {
        self.discovery_concurrency = n.max(1);
        self
    }

    pub fn log_tail(mut self, lines: i64) -> Self {
        self.log_tail = Some(lines);
        self
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.discovery_backoff, Duration::from_millis(200));
        assert_eq!(config.discovery_concurrency, 8);
        assert!(config.kubeconfig.is_none());
        assert!(config.log_tail.is_none());
    }

    #[test]
    fn test_builder() {
        let config = GatewayConfig::new()
            .kubeconfig("~/.kube/prod")
            .context("prod")
            .discovery_concurrency(0)
            .log_tail(100);

        assert_eq!(config.kubeconfig, Some(PathBuf::from("~/.kube/prod")));
        assert_eq!(config.context.as_deref(), Some("prod"));
        assert_eq!(config.discovery_concurrency, 1);
        assert_eq!(config.log_tail, Some(100));
    }

    #[test]
    fn test_from_lookup() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (ENV_KUBECONFIG, "/tmp/kubeconfig"),
            (ENV_CONTEXT, "staging"),
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
            (ENV_LOG_TAIL, "250"),
        ]))
        .unwrap();

        assert_eq!(config.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(config.context.as_deref(), Some("staging"));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.log_tail, Some(250));
    }

    #[test]
    fn test_empty_lookup_is_default() {
        assert_eq!(
            GatewayConfig::from_lookup(|_| None).unwrap(),
            GatewayConfig::default()
        );
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        for (key, value) in [
            (ENV_REQUEST_TIMEOUT_SECS, "soon"),
            (ENV_REQUEST_TIMEOUT_SECS, "0"),
            (ENV_LOG_TAIL, "-3"),
        ] {
            let err = GatewayConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            );
        }
    }
}
