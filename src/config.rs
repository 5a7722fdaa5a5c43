//! Configuration types for textbook-dl

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};
use crate::types::Format;

/// Main configuration for a pipeline run
///
/// Every field has a default, so a config file only needs to list the settings
/// it changes. The CLI layers its flags on top of whatever this holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Path to the CSV catalogue (default: "csv/Free+English+textbooks.csv")
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Directory downloaded files are written to (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Format to download for every record (default: pdf)
    #[serde(default)]
    pub format: Format,

    /// Number of concurrent workers (default: 100)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of body chunks buffered between the fetch and persist sides of a transfer (default: 8)
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,

    /// What to do when a landing page has no link for the requested format
    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,

    /// HTTP settings shared by landing page and content requests
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry policies, one per call site
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_dir: default_output_dir(),
            format: Format::default(),
            workers: default_workers(),
            relay_capacity: default_relay_capacity(),
            on_unresolved: UnresolvedPolicy::default(),
            http: HttpConfig::default(),
            retry: RetryPolicies::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers", "workers must be at least 1"));
        }
        if self.relay_capacity == 0 {
            return Err(Error::config(
                "relay_capacity",
                "relay_capacity must be at least 1",
            ));
        }
        if self.http.connect_timeout.is_zero() {
            return Err(Error::config(
                "http.connect_timeout",
                "connect_timeout must be greater than zero",
            ));
        }
        if self.http.read_timeout.is_zero() {
            return Err(Error::config(
                "http.read_timeout",
                "read_timeout must be greater than zero",
            ));
        }
        for (key, policy) in [
            ("retry.landing_page", &self.retry.landing_page),
            ("retry.transfer", &self.retry.transfer),
            ("retry.open_input", &self.retry.open_input),
        ] {
            if policy.backoff_multiplier < 1.0 {
                return Err(Error::config(
                    key,
                    format!(
                        "backoff_multiplier must be >= 1.0, got {}",
                        policy.backoff_multiplier
                    ),
                ));
            }
            if policy.initial_delay > policy.max_delay {
                return Err(Error::config(key, "initial_delay exceeds max_delay"));
            }
        }
        Ok(())
    }

    /// Override `max_attempts` on every retry policy
    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.retry.landing_page.max_attempts = max_attempts;
        self.retry.transfer.max_attempts = max_attempts;
        self.retry.open_input.max_attempts = max_attempts;
    }
}

/// Handling of records whose landing page has no matching download link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Log the record and move on (default)
    #[default]
    Skip,
    /// Cancel the whole run and return an error
    Abort,
}

impl std::str::FromStr for UnresolvedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(UnresolvedPolicy::Skip),
            "abort" => Ok(UnresolvedPolicy::Abort),
            _ => Err(Error::config(
                "on_unresolved",
                format!("'{}' must be skip or abort", s),
            )),
        }
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for establishing a connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum time to wait for the next body chunk (default: 60 seconds)
    ///
    /// This bounds stalls, not total transfer time, so large files are unaffected.
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Build a reqwest client from these settings
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(Error::Network)
    }
}

/// Retry policies for each kind of operation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetryPolicies {
    /// Fetching and scanning a landing page
    #[serde(default)]
    pub landing_page: RetryConfig,

    /// Streaming a content file to disk
    #[serde(default)]
    pub transfer: RetryConfig,

    /// Opening the input catalogue
    #[serde(default = "default_open_input_retry")]
    pub open_input: RetryConfig,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }
}

// Default value functions
fn default_input_path() -> PathBuf {
    PathBuf::from("csv/Free+English+textbooks.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_workers() -> usize {
    100
}

fn default_relay_capacity() -> usize {
    8
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("textbook-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_open_input_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        ..Default::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Retry delays need sub-second precision
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
