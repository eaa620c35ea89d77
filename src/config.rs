//! Configuration for the refresh observer and TTL sampler.

use crate::validation::{parse_interval_secs, parse_switch, validate_interval};
use crate::{RefreshPolicy, Result};
use std::time::Duration;

/// Environment variable holding the sampling interval in seconds.
pub const ENV_TTL_INTERVAL: &str = "CREDWATCH_TTL_INTERVAL_SECS";
/// Environment variable holding the refresh policy name.
pub const ENV_REFRESH_POLICY: &str = "CREDWATCH_REFRESH_POLICY";
/// Environment variable switching the TTL sampler on or off.
pub const ENV_SAMPLER: &str = "CREDWATCH_SAMPLER";

/// Settings for a [`RefreshObservingProvider`](crate::RefreshObservingProvider)
/// and its [`TtlSampler`](crate::TtlSampler).
///
/// Use the builder pattern for ergonomic configuration:
///
/// ```
/// use credwatch::{Config, RefreshPolicy};
/// use std::time::Duration;
///
/// let config = Config::new()
///     .with_ttl_interval(Duration::from_secs(60))
///     .with_refresh_policy(RefreshPolicy::KeyMaterialOrExpiry);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How often the sampler reports remaining lifetime (default: 30 seconds)
    pub ttl_interval: Duration,

    /// What counts as a refresh (default: key material only)
    pub refresh_policy: RefreshPolicy,

    /// Whether [`start_configured_sampler`](crate::RefreshObservingProvider::start_configured_sampler)
    /// starts a sampler at all (default: true)
    pub sampler_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_interval: Duration::from_secs(30),
            refresh_policy: RefreshPolicy::default(),
            sampler_enabled: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl_interval(mut self, interval: Duration) -> Self {
        self.ttl_interval = interval;
        self
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    pub fn with_sampler(mut self, enabled: bool) -> Self {
        self.sampler_enabled = enabled;
        self
    }

    /// Loads configuration from the process environment.
    ///
    /// Unset variables keep their defaults. See [`ENV_TTL_INTERVAL`],
    /// [`ENV_REFRESH_POLICY`] and [`ENV_SAMPLER`].
    ///
    /// # Errors
    ///
    /// Returns [`CredwatchError::InvalidConfig`](crate::CredwatchError::InvalidConfig)
    /// if a variable is set to an unparseable or out-of-range value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TTL_INTERVAL) {
            config.ttl_interval = parse_interval_secs(&value)?;
        }
        if let Some(value) = lookup(ENV_REFRESH_POLICY) {
            config.refresh_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_SAMPLER) {
            config.sampler_enabled = parse_switch(&value)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval(self.ttl_interval)
    }
}
