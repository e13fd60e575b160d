//! The poll → diff → rewrite loop.

use crate::config::ReconcilerConfig;
use crate::error::{ConfigError, Result};
use crate::fetcher::SnapshotFetcher;
use crate::hosts_file::HostsWriter;
use crate::mapping::{HostMapping, changed};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a single reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The snapshot matched the baseline; nothing was written.
    Unchanged,
    /// The hosts file was rewritten with this many entries.
    Applied {
        /// Entries written.
        entries: usize,
    },
}

/// Keeps a hosts file in line with a snapshot source.
///
/// The baseline is the last mapping successfully written. It starts empty,
/// so the first non-empty snapshot is always written.
///
/// # Error policy
///
/// Fetch failures and read/write failures of a rewrite are logged and the
/// cycle is retried after the next interval, with the baseline untouched.
/// A failed rename ends the run. In single-shot mode any failure is
/// returned.
pub struct Reconciler<F, W> {
    fetcher: F,
    writer: W,
    poll_interval: Duration,
    run_forever: bool,
    cleanup_on_exit: bool,
    baseline: HostMapping,
}

impl<F: SnapshotFetcher, W: HostsWriter> Reconciler<F, W> {
    /// Creates a reconciler with an empty baseline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn new(
        fetcher: F,
        writer: W,
        config: &ReconcilerConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            writer,
            poll_interval: config.poll_interval,
            run_forever: config.run_forever,
            cleanup_on_exit: config.cleanup_on_exit,
            baseline: HostMapping::new(),
        })
    }

    /// Starts from `baseline` instead of the empty mapping.
    #[must_use]
    pub fn with_baseline(mut self, baseline: HostMapping) -> Self {
        self.baseline = baseline;
        self
    }

    /// The last mapping successfully written.
    #[must_use]
    pub const fn baseline(&self) -> &HostMapping {
        &self.baseline
    }

    /// The writer this reconciler drives.
    #[must_use]
    pub const fn writer(&self) -> &W {
        &self.writer
    }

    /// Runs one fetch/diff/rewrite cycle.
    ///
    /// The baseline is replaced only after a successful rewrite. The rewrite
    /// itself runs inline and blocks the current task until the file is
    /// committed or rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fetch`] or [`crate::Error::Hosts`] for the
    /// failing stage.
    pub async fn reconcile_once(&mut self) -> Result<CycleOutcome> {
        let snapshot = self.fetcher.fetch().await?;

        if !changed(&self.baseline, &snapshot) {
            tracing::debug!(entries = snapshot.len(), "Snapshot unchanged");
            return Ok(CycleOutcome::Unchanged);
        }

        for (name, target) in &snapshot {
            if self.baseline.get(name) != Some(target) {
                tracing::debug!(name = %name, target = %target, "Entry added or changed");
            }
        }

        let entries = self.writer.rewrite(&snapshot)?;
        tracing::info!(
            path = %self.writer.path().display(),
            entries,
            previous = self.baseline.len(),
            "Applied new host mapping"
        );
        self.baseline = snapshot;
        Ok(CycleOutcome::Applied { entries })
    }

    /// Runs cycles until single-shot completion, a fatal error, or
    /// cancellation of `shutdown`.
    ///
    /// Cancellation is observed only between cycles, so a rewrite that has
    /// started always commits or rolls back before this returns. On a
    /// graceful stop of a daemon run with `cleanup_on_exit`, all owned
    /// entries are removed; a single-shot run never disowns.
    ///
    /// # Errors
    ///
    /// Returns the cycle error in single-shot mode, a fatal error in daemon
    /// mode, or the teardown rewrite error.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.reconcile_once().await {
                Ok(_) => {}
                Err(e) if !self.run_forever => return Err(e),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?self.poll_interval,
                        "Reconciliation failed, will retry"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reconciliation failed fatally");
                    return Err(e);
                }
            }

            if !self.run_forever {
                return Ok(());
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Stopping reconciler");
        if self.run_forever && self.cleanup_on_exit {
            self.writer.rewrite(&HostMapping::new())?;
            self.baseline = HostMapping::new();
        }
        Ok(())
    }
}
