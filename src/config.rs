//! Reconciler configuration.

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default hosts file on Unix systems.
pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Which node address is written for node hostnames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressType {
    /// The node's cluster-internal address (`InternalIP`).
    #[default]
    Internal,
    /// The node's externally routable address (`ExternalIP`).
    External,
}

impl AddressType {
    /// The Kubernetes `NodeAddress.type` value this variant selects.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "InternalIP",
            Self::External => "ExternalIP",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InternalIP" | "internal" => Ok(Self::Internal),
            "ExternalIP" | "external" => Ok(Self::External),
            other => Err(format!(
                "unknown address type {other:?} (expected InternalIP or ExternalIP)"
            )),
        }
    }
}

/// Settings for a [`Reconciler`](crate::Reconciler) run.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hosts_reconciler::ReconcilerConfig;
///
/// let config = ReconcilerConfig::new("/tmp/hosts")
///     .with_run_forever(true)
///     .with_poll_interval(Duration::from_secs(30));
///
/// assert!(config.run_forever);
/// assert_eq!(config.poll_interval, Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Hosts file to keep in sync.
    pub hosts_file: PathBuf,

    /// Delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,

    /// Keep polling after the first cycle.
    pub run_forever: bool,

    /// Strip all owned lines when a daemon run is stopped.
    pub cleanup_on_exit: bool,
}

impl ReconcilerConfig {
    /// Creates a single-shot config with the default poll interval.
    #[must_use]
    pub fn new(hosts_file: impl Into<PathBuf>) -> Self {
        Self {
            hosts_file: hosts_file.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_forever: false,
            cleanup_on_exit: false,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enables or disables continuous polling.
    #[must_use]
    pub const fn with_run_forever(mut self, run_forever: bool) -> Self {
        self.run_forever = run_forever;
        self
    }

    /// Enables or disables disowning entries on graceful stop.
    #[must_use]
    pub const fn with_cleanup_on_exit(mut self, cleanup: bool) -> Self {
        self.cleanup_on_exit = cleanup;
        self
    }

    /// Checks the settings before any cycle runs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroInterval`] for a zero interval in daemon
    /// mode and [`ConfigError::InvalidHostsPath`] for an empty path or a
    /// directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_forever && self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.hosts_file.as_os_str().is_empty() || self.hosts_file.is_dir() {
            return Err(ConfigError::InvalidHostsPath(self.hosts_file.clone()));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTS_FILE)
    }
}
