//! # hosts-reconciler
//!
//! Keep a hosts file in sync with the ingresses and nodes of a Kubernetes
//! cluster, so a developer machine can resolve cluster names without a DNS
//! integration.
//!
//! Every line this crate writes ends with an ownership sentinel
//! (` # managed-by-reconciler` by default). A rewrite drops the lines
//! carrying the sentinel, keeps every other line byte-for-byte, appends the
//! fresh entries, and renames a staging file over the original, so readers
//! never see a half-written file.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use hosts_reconciler::{HostsFile, Reconciler, ReconcilerConfig, StaticFetcher, HostMapping};
//! use tokio_util::sync::CancellationToken;
//!
//! let mapping = HostMapping::from_pairs([("api.dev.local", "10.0.0.9")])?;
//! let config = ReconcilerConfig::new("/etc/hosts");
//! let hosts = HostsFile::new(&config.hosts_file);
//!
//! // Single-shot: one fetch, one rewrite if anything changed.
//! Reconciler::new(StaticFetcher::new(mapping), hosts, &config)?
//!     .run(CancellationToken::new())
//!     .await?;
//! ```
//!
//! ## Change detection
//!
//! The reconciler remembers the last mapping it wrote. A poll whose snapshot
//! equals that baseline touches nothing on disk. The baseline lives in
//! memory only, so the first poll after a restart always rewrites.
//!
//! ## Permissions
//!
//! Writing `/etc/hosts` requires root. The caller is responsible for
//! privilege elevation.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod fetcher;
pub mod hosts_file;
pub mod kube_fetcher;
pub mod mapping;
pub mod reconciler;
pub mod telemetry;
pub mod util;

pub use config::{AddressType, ReconcilerConfig};
pub use error::{ConfigError, EntryError, Error, FetchError, HostsError, Result};
pub use fetcher::{SnapshotFetcher, StaticFetcher};
pub use hosts_file::{DEFAULT_SENTINEL, HostsFile, HostsWriter};
pub use kube_fetcher::{ControllerEndpoint, KubeFetcher};
pub use mapping::{HostEntry, HostMapping, changed};
pub use reconciler::{CycleOutcome, Reconciler};
