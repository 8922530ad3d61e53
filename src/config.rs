//! Configuration types for the Tor exit blocker.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Longest accepted refresh interval (one year).
pub const MAX_REFRESH_INTERVAL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// How often to refresh the exit list (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// URL of the exit address document.
    #[serde(default = "default_exit_address_url")]
    pub exit_address_url: String,

    /// HTTP timeout for one fetch, in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Log blocked requests.
    #[serde(default = "default_true")]
    pub log_blocked: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
            exit_address_url: default_exit_address_url(),
            timeout_ms: default_timeout(),
            log_blocked: true,
        }
    }
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_exit_address_url() -> String {
    "https://check.torproject.org/exit-addresses".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval_seconds == 0 {
            anyhow::bail!("refresh_interval_seconds must be greater than 0");
        }

        if self.refresh_interval_seconds > MAX_REFRESH_INTERVAL_SECONDS {
            anyhow::bail!(
                "refresh_interval_seconds ({}) must be <= {}",
                self.refresh_interval_seconds,
                MAX_REFRESH_INTERVAL_SECONDS
            );
        }

        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than 0");
        }

        let url = reqwest::Url::parse(&self.exit_address_url).map_err(|e| {
            anyhow::anyhow!("Invalid exit_address_url '{}': {}", self.exit_address_url, e)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "exit_address_url must use http or https, got '{}'",
                url.scheme()
            );
        }

        Ok(())
    }

    /// Replace unusable values with defaults.
    ///
    /// A zero interval or timeout and an empty URL fall back to the
    /// defaults; an oversized interval is capped at
    /// [`MAX_REFRESH_INTERVAL_SECONDS`].
    pub fn normalized(mut self) -> Self {
        if self.refresh_interval_seconds == 0 {
            warn!("refresh_interval_seconds is 0, using default");
            self.refresh_interval_seconds = default_refresh_interval();
        } else if self.refresh_interval_seconds > MAX_REFRESH_INTERVAL_SECONDS {
            warn!(
                refresh_interval_seconds = self.refresh_interval_seconds,
                "refresh_interval_seconds too large, capping"
            );
            self.refresh_interval_seconds = MAX_REFRESH_INTERVAL_SECONDS;
        }

        if self.timeout_ms == 0 {
            warn!("timeout_ms is 0, using default");
            self.timeout_ms = default_timeout();
        }

        if self.exit_address_url.trim().is_empty() {
            warn!("exit_address_url is empty, using default");
            self.exit_address_url = default_exit_address_url();
        }

        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Tor exit blocker configuration

# How often the exit list is re-fetched (seconds)
refresh_interval_seconds: 3600

# Exit address document (ExitNode / Published / LastStatus / ExitAddress)
exit_address_url: "https://check.torproject.org/exit-addresses"

# Timeout for a single fetch (milliseconds)
timeout_ms: 30000

# Emit an info log line for every blocked request
log_blocked: true
"#
        .to_string()
    }
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> anyhow::Result<String> {
    let mut result = content.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let var_value = std::env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
