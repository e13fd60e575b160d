//! Error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A host entry that cannot be rendered as a hosts file line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// The hostname is empty.
    #[error("host name must not be empty")]
    EmptyName,

    /// The target is empty.
    #[error("target for {name} must not be empty")]
    EmptyTarget {
        /// Name the target belongs to.
        name: String,
    },

    /// A name or target contains whitespace or a line terminator.
    #[error("{value:?} contains whitespace")]
    Whitespace {
        /// The offending value.
        value: String,
    },
}

/// Failures of the stages of a hosts file rewrite.
///
/// `Read` and `Write` leave the original file untouched. `Rename` happens at
/// the commit point and usually means a permission or cross-device problem.
#[derive(Debug, Error)]
pub enum HostsError {
    /// The hosts file could not be opened or read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The hosts file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The staging file could not be created or written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The staging file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The staging file could not be moved over the hosts file.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        /// The staging file.
        from: PathBuf,
        /// The hosts file.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl HostsError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.io_error().kind() == std::io::ErrorKind::PermissionDenied
    }

    /// Returns the I/O error behind this failure.
    #[must_use]
    pub const fn io_error(&self) -> &std::io::Error {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Rename { source, .. } => source,
        }
    }
}

/// Failures of a topology snapshot fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The cluster API could not be reached or rejected the request.
    #[error("cluster API error: {0}")]
    Api(#[from] kube::Error),

    /// The topology source returned data that cannot form a mapping.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] EntryError),
}

/// Invalid or unusable startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The poll interval is zero.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    /// The hosts file path is empty or names a directory.
    #[error("invalid hosts file path: {0}")]
    InvalidHostsPath(PathBuf),

    /// The ownership sentinel is unusable.
    #[error("invalid sentinel {0:?}: must be non-empty and on a single line")]
    InvalidSentinel(String),

    /// The controller IP override is not a valid target.
    #[error("invalid controller IP: {0}")]
    InvalidTarget(#[from] EntryError),

    /// The kubeconfig file could not be loaded.
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// No kubeconfig was given and none could be inferred.
    #[error("failed to infer cluster config: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    /// The cluster client could not be built.
    #[error("failed to create cluster client: {0}")]
    Client(#[from] kube::Error),

    /// The cluster server URL carries no host.
    #[error("cluster URL {0} has no host")]
    MissingHost(String),

    /// The controller host could not be resolved.
    #[error("failed to look up {host}: {source}")]
    Lookup {
        /// Host being resolved.
        host: String,
        /// Underlying resolver error.
        source: std::io::Error,
    },

    /// The controller host resolved to no addresses.
    #[error("{0} resolved to no addresses")]
    NoAddress(String),
}

/// Top-level error for a reconciliation cycle or process run.
#[derive(Debug, Error)]
pub enum Error {
    /// Snapshot fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Hosts file rewrite failed.
    #[error(transparent)]
    Hosts(#[from] HostsError),

    /// Startup configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns `true` if the next poll may succeed where this one failed.
    ///
    /// Fetch failures and the read/write stages of a rewrite are retried;
    /// rename failures and configuration errors are not.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::Hosts(HostsError::Read { .. } | HostsError::Write { .. })
        )
    }
}
