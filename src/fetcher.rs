//! Topology snapshot source.

use crate::error::FetchError;
use crate::mapping::HostMapping;
use async_trait::async_trait;

/// Produces the complete desired mapping for "now".
///
/// Every call returns the whole picture; the reconciler never merges two
/// snapshots. Implementations apply their own timeouts.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetches the current mapping.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the source is unreachable or returns data
    /// that cannot form a mapping.
    async fn fetch(&self) -> Result<HostMapping, FetchError>;
}

/// A fetcher that always returns the same mapping.
///
/// Useful for pinning a fixed set of entries without a cluster.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    mapping: HostMapping,
}

impl StaticFetcher {
    /// Wraps `mapping`.
    #[must_use]
    pub const fn new(mapping: HostMapping) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl SnapshotFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<HostMapping, FetchError> {
        Ok(self.mapping.clone())
    }
}
