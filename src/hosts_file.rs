//! Sentinel-tagged hosts file rewriting.
//!
//! Every line written by this module ends with an ownership sentinel. A
//! rewrite drops all lines carrying the sentinel, keeps every other line
//! byte-for-byte, appends the new entries, and swaps the result into place
//! with a single rename.

use crate::error::{ConfigError, HostsError};
use crate::mapping::{HostEntry, HostMapping};
use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Marker appended to every owned line.
pub const DEFAULT_SENTINEL: &str = " # managed-by-reconciler";

/// Suffix of the staging file created next to the hosts file.
const STAGING_SUFFIX: &str = ".new";

/// Something that can replace the owned entries of a hosts file.
///
/// [`HostsFile`] is the real implementation; the seam exists so the
/// reconciliation loop can run against an in-memory writer.
///
/// Calls are synchronous and may block on disk I/O (`fsync`, `rename`).
/// Hosts files are small, so the reconciler calls this inline on its task.
pub trait HostsWriter {
    /// Replaces all owned entries with `mapping`, returning the number of
    /// entries written.
    ///
    /// # Errors
    ///
    /// Returns [`HostsError`] for the stage of the rewrite that failed.
    fn rewrite(&self, mapping: &HostMapping) -> Result<usize, HostsError>;

    /// The file being managed.
    fn path(&self) -> &Path;
}

/// Line counts of one rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Foreign lines copied through.
    pub kept: usize,
    /// Previously owned lines removed.
    pub dropped: usize,
    /// Owned lines appended.
    pub written: usize,
}

/// Manages the owned region of a hosts file.
///
/// # Lifecycle
///
/// 1. [`rewrite`](Self::rewrite) replaces the owned lines with a mapping.
/// 2. Readers of the file see either the old or the new content, never a
///    mix.
/// 3. [`disown`](Self::disown) strips every owned line on teardown.
///
/// # Permissions
///
/// `/etc/hosts` requires root. The caller must handle elevation.
///
/// # Example
///
/// ```rust,ignore
/// use hosts_reconciler::{HostMapping, HostsFile};
///
/// let hosts = HostsFile::new("/etc/hosts");
/// let mapping = HostMapping::from_pairs([("api.dev.local", "10.0.0.9")])?;
/// hosts.rewrite(&mapping)?;
/// // ...
/// hosts.disown()?;
/// ```
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
    sentinel: String,
}

impl HostsFile {
    /// Manages `path` with the default sentinel.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }

    /// Replaces the ownership sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSentinel`] if the sentinel is empty or
    /// spans more than one line.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Result<Self, ConfigError> {
        let sentinel = sentinel.into();
        if sentinel.trim().is_empty() || sentinel.contains(['\n', '\r']) {
            return Err(ConfigError::InvalidSentinel(sentinel));
        }
        self.sentinel = sentinel;
        Ok(self)
    }

    /// Returns the hosts file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the ownership sentinel.
    #[must_use]
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Replaces every owned line with the entries of `mapping`.
    ///
    /// The new content is staged in `<path>.new` and renamed over the
    /// original. Foreign lines keep their bytes and relative order; a final
    /// foreign line without a terminator gets a `\n` so owned lines start on
    /// a line of their own. Owned lines are appended in name order.
    ///
    /// # Errors
    ///
    /// - [`HostsError::Read`] if the hosts file is missing or unreadable.
    /// - [`HostsError::Write`] if the staging file cannot be written.
    /// - [`HostsError::Rename`] if the staging file cannot replace the
    ///   original. The staging file is left behind in that case.
    ///
    /// The original file is unchanged unless `Ok` is returned.
    pub fn rewrite(&self, mapping: &HostMapping) -> Result<usize, HostsError> {
        let stats = self.rewrite_with_stats(mapping)?;
        tracing::info!(
            path = %self.path.display(),
            entries = stats.written,
            "Updated hosts file"
        );
        Ok(stats.written)
    }

    /// Removes every owned line, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Same as [`rewrite`](Self::rewrite).
    pub fn disown(&self) -> Result<usize, HostsError> {
        let stats = self.rewrite_with_stats(&HostMapping::new())?;
        tracing::info!(
            path = %self.path.display(),
            removed = stats.dropped,
            "Removed managed hosts entries"
        );
        Ok(stats.dropped)
    }

    /// Parses the owned lines currently on disk back into a mapping.
    ///
    /// Owned lines that do not have the `<target> <name>` shape are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`HostsError::Read`] if the file cannot be read.
    pub fn owned_entries(&self) -> Result<HostMapping, HostsError> {
        let content = fs::read(&self.path).map_err(|source| self.read_error(source))?;

        let mut mapping = HostMapping::new();
        for line in content.split(|b| *b == b'\n') {
            let Some(body) = self.owned_body(line) else {
                continue;
            };
            let body = String::from_utf8_lossy(body);
            let mut fields = body.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(target), Some(name), None) => match HostEntry::new(name, target) {
                    Ok(entry) => {
                        mapping.insert(entry);
                    }
                    Err(e) => tracing::warn!(line = %body, error = %e, "Skipping owned line"),
                },
                _ => tracing::warn!(line = %body, "Skipping malformed owned line"),
            }
        }
        Ok(mapping)
    }

    /// Returns `true` if `line` (with or without its terminator) is owned.
    #[must_use]
    pub fn is_owned(&self, line: &[u8]) -> bool {
        self.owned_body(line).is_some()
    }

    /// Performs the full staged rewrite and reports line counts.
    ///
    /// # Errors
    ///
    /// Same as [`rewrite`](Self::rewrite).
    pub fn rewrite_with_stats(&self, mapping: &HostMapping) -> Result<RewriteStats, HostsError> {
        let source = File::open(&self.path).map_err(|source| self.read_error(source))?;
        let permissions = source
            .metadata()
            .map_err(|source| self.read_error(source))?
            .permissions();

        self.commit_from(BufReader::new(source), permissions, mapping)
    }

    /// Stages `source` with `mapping` applied and renames the result over
    /// the hosts file. A failed stage removes the staging file.
    fn commit_from(
        &self,
        source: impl BufRead,
        permissions: Permissions,
        mapping: &HostMapping,
    ) -> Result<RewriteStats, HostsError> {
        let staging = self.staging_path();
        let stats = match self.stage(source, &staging, permissions, mapping) {
            Ok(stats) => stats,
            Err(e) => {
                // The hosts file was never touched; only the staging file
                // needs to go.
                if let Err(cleanup) = fs::remove_file(&staging) {
                    tracing::debug!(
                        path = %staging.display(),
                        error = %cleanup,
                        "Could not remove staging file"
                    );
                }
                return Err(e);
            }
        };

        fs::rename(&staging, &self.path).map_err(|source| HostsError::Rename {
            from: staging.clone(),
            to: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            kept = stats.kept,
            dropped = stats.dropped,
            written = stats.written,
            "Committed hosts file rewrite"
        );
        Ok(stats)
    }

    /// Streams `source` into `staging`, filtering owned lines and appending
    /// the rendered mapping.
    fn stage(
        &self,
        mut source: impl BufRead,
        staging: &Path,
        permissions: Permissions,
        mapping: &HostMapping,
    ) -> Result<RewriteStats, HostsError> {
        let write_error = |source| HostsError::Write {
            path: staging.to_path_buf(),
            source,
        };

        let file = File::create(staging).map_err(write_error)?;
        file.set_permissions(permissions).map_err(write_error)?;
        let mut out = BufWriter::new(file);

        let mut stats = RewriteStats::default();
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = source
                .read_until(b'\n', &mut line)
                .map_err(|source| self.read_error(source))?;
            if n == 0 {
                break;
            }
            if self.is_owned(&line) {
                stats.dropped += 1;
                continue;
            }
            out.write_all(&line).map_err(write_error)?;
            if !line.ends_with(b"\n") {
                out.write_all(b"\n").map_err(write_error)?;
            }
            stats.kept += 1;
        }

        for (name, target) in mapping {
            out.write_all(render_line(target, name, &self.sentinel).as_bytes())
                .map_err(write_error)?;
            stats.written += 1;
        }

        let file = out
            .into_inner()
            .map_err(|e| write_error(e.into_error()))?;
        file.sync_all().map_err(write_error)?;
        Ok(stats)
    }

    /// `<path>.new`, in the same directory so the rename stays on one
    /// filesystem.
    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(STAGING_SUFFIX);
        PathBuf::from(name)
    }

    /// Returns the line content before the sentinel if `line` is owned.
    fn owned_body<'a>(&self, line: &'a [u8]) -> Option<&'a [u8]> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        line.strip_suffix(self.sentinel.as_bytes())
    }

    fn read_error(&self, source: std::io::Error) -> HostsError {
        HostsError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

impl HostsWriter for HostsFile {
    fn rewrite(&self, mapping: &HostMapping) -> Result<usize, HostsError> {
        Self::rewrite(self, mapping)
    }

    fn path(&self) -> &Path {
        Self::path(self)
    }
}

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Renders one owned line.
///
/// ```text
/// 10.0.0.9 api.dev.local # managed-by-reconciler
/// ```
fn render_line(target: &str, name: &str, sentinel: &str) -> String {
    format!("{target} {name}{sentinel}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNED_OLD: &str = "10.0.0.5 old.svc # managed-by-reconciler\n";
    const LOCALHOST: &str = "127.0.0.1 localhost\n";

    fn hosts_with(content: &str) -> (tempfile::TempDir, HostsFile) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, content).unwrap();
        (dir, HostsFile::new(path))
    }

    fn read(hosts: &HostsFile) -> String {
        fs::read_to_string(hosts.path()).unwrap()
    }

    fn mapping(pairs: &[(&str, &str)]) -> HostMapping {
        HostMapping::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn render_line_format() {
        assert_eq!(
            render_line("10.0.0.9", "new.svc", DEFAULT_SENTINEL),
            "10.0.0.9 new.svc # managed-by-reconciler\n"
        );
    }

    #[test]
    fn replaces_owned_and_keeps_foreign() {
        let (_dir, hosts) = hosts_with(&format!("{OWNED_OLD}{LOCALHOST}"));

        let written = hosts.rewrite(&mapping(&[("new.svc", "10.0.0.9")])).unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            read(&hosts),
            "127.0.0.1 localhost\n10.0.0.9 new.svc # managed-by-reconciler\n"
        );
    }

    #[test]
    fn empty_mapping_strips_owned_lines() {
        let (_dir, hosts) = hosts_with(&format!("{OWNED_OLD}{LOCALHOST}"));

        assert_eq!(hosts.rewrite(&HostMapping::new()).unwrap(), 0);
        assert_eq!(read(&hosts), LOCALHOST);
    }

    #[test]
    fn disown_reports_removed_lines() {
        let (_dir, hosts) = hosts_with(&format!("{OWNED_OLD}{LOCALHOST}{OWNED_OLD}"));

        assert_eq!(hosts.disown().unwrap(), 2);
        assert_eq!(read(&hosts), LOCALHOST);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let (_dir, hosts) = hosts_with("# header\n127.0.0.1 localhost\n::1 localhost\n");
        let m = mapping(&[("b.svc", "10.0.0.2"), ("a.svc", "10.0.0.1")]);

        hosts.rewrite(&m).unwrap();
        let first = fs::read(hosts.path()).unwrap();
        hosts.rewrite(&m).unwrap();
        let second = fs::read(hosts.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn interleaved_foreign_lines_keep_order() {
        let content = format!(
            "# top\n{OWNED_OLD}10.1.1.1 db\n10.0.0.6 x.svc # managed-by-reconciler\n\n# bottom\n"
        );
        let (_dir, hosts) = hosts_with(&content);

        hosts
            .rewrite(&mapping(&[("y.svc", "10.0.0.7"), ("z.svc", "10.0.0.8")]))
            .unwrap();

        assert_eq!(
            read(&hosts),
            "# top\n10.1.1.1 db\n\n# bottom\n\
             10.0.0.7 y.svc # managed-by-reconciler\n\
             10.0.0.8 z.svc # managed-by-reconciler\n"
        );
    }

    #[test]
    fn sentinel_must_be_trailing() {
        let content = "10.0.0.5 a.svc # managed-by-reconciler extra\n";
        let (_dir, hosts) = hosts_with(content);

        hosts.rewrite(&HostMapping::new()).unwrap();
        assert_eq!(read(&hosts), content);
    }

    #[test]
    fn final_line_without_newline() {
        let (_dir, hosts) = hosts_with("127.0.0.1 localhost");
        hosts.rewrite(&mapping(&[("a.svc", "10.0.0.1")])).unwrap();
        assert_eq!(
            read(&hosts),
            "127.0.0.1 localhost\n10.0.0.1 a.svc # managed-by-reconciler\n"
        );

        let (_dir, hosts) =
            hosts_with("127.0.0.1 localhost\n10.0.0.5 old.svc # managed-by-reconciler");
        hosts.rewrite(&HostMapping::new()).unwrap();
        assert_eq!(read(&hosts), LOCALHOST);
    }

    #[test]
    fn crlf_lines_are_classified_and_preserved() {
        let (_dir, hosts) =
            hosts_with("127.0.0.1 localhost\r\n10.0.0.5 old.svc # managed-by-reconciler\r\n");
        hosts.rewrite(&HostMapping::new()).unwrap();
        assert_eq!(read(&hosts), "127.0.0.1 localhost\r\n");
    }

    #[test]
    fn non_utf8_foreign_lines_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, b"10.0.0.1 caf\xe9\n").unwrap();
        let hosts = HostsFile::new(&path);

        hosts.rewrite(&mapping(&[("a.svc", "10.0.0.2")])).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"10.0.0.1 caf\xe9\n"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = HostsFile::new(dir.path().join("absent"));

        let err = hosts.rewrite(&HostMapping::new()).unwrap_err();
        assert!(matches!(err, HostsError::Read { .. }));
        assert!(!dir.path().join("absent").exists());
        assert!(!dir.path().join("absent.new").exists());
    }

    #[test]
    fn staging_failure_leaves_original_untouched() {
        let original = format!("{LOCALHOST}{OWNED_OLD}");
        let (dir, hosts) = hosts_with(&original);
        // A directory in the staging slot makes the staging file uncreatable.
        fs::create_dir(dir.path().join("hosts.new")).unwrap();

        let err = hosts.rewrite(&mapping(&[("a.svc", "10.0.0.1")])).unwrap_err();

        assert!(matches!(err, HostsError::Write { .. }));
        assert_eq!(read(&hosts), original);
    }

    /// Yields its bytes, then fails every read.
    struct BrokenAfter(&'static [u8]);

    impl std::io::Read for BrokenAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() {
                return Err(std::io::Error::other("device went away"));
            }
            let n = self.0.len().min(buf.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn interrupted_stream_leaves_original_untouched() {
        let original = format!("{LOCALHOST}{OWNED_OLD}");
        let (dir, hosts) = hosts_with(&original);
        let permissions = fs::metadata(hosts.path()).unwrap().permissions();

        let err = hosts
            .commit_from(
                BufReader::new(BrokenAfter(b"127.0.0.1 localhost
10.1.1.1 db
")),
                permissions,
                &mapping(&[("a.svc", "10.0.0.1")]),
            )
            .unwrap_err();

        assert!(matches!(err, HostsError::Read { .. }));
        assert_eq!(read(&hosts), original);
        assert!(!dir.path().join("hosts.new").exists());
    }

    #[test]
    fn staging_file_is_removed_after_commit() {
        let (dir, hosts) = hosts_with(LOCALHOST);
        hosts.rewrite(&mapping(&[("a.svc", "10.0.0.1")])).unwrap();
        assert!(!dir.path().join("hosts.new").exists());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, hosts) = hosts_with(LOCALHOST);
        fs::set_permissions(hosts.path(), Permissions::from_mode(0o640)).unwrap();

        hosts.rewrite(&mapping(&[("a.svc", "10.0.0.1")])).unwrap();

        let mode = fs::metadata(hosts.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn owned_entries_reads_back_mapping() {
        let (_dir, hosts) = hosts_with(LOCALHOST);
        let m = mapping(&[("a.svc", "10.0.0.1"), ("b.svc", "10.0.0.2")]);

        hosts.rewrite(&m).unwrap();
        assert_eq!(hosts.owned_entries().unwrap(), m);
    }

    #[test]
    fn owned_entries_skips_malformed_lines() {
        let (_dir, hosts) = hosts_with(
            "10.0.0.1 a.svc # managed-by-reconciler\n\
             lonely # managed-by-reconciler\n\
             10.0.0.3 b.svc extra # managed-by-reconciler\n",
        );
        assert_eq!(
            hosts.owned_entries().unwrap(),
            mapping(&[("a.svc", "10.0.0.1")])
        );
    }

    #[test]
    fn custom_sentinel() {
        let (_dir, hosts) = hosts_with(&format!("{OWNED_OLD}{LOCALHOST}"));
        let hosts = hosts.with_sentinel(" # devingressproxy").unwrap();

        hosts.rewrite(&mapping(&[("a.svc", "10.0.0.1")])).unwrap();

        // Lines tagged with another sentinel are foreign to this instance.
        assert_eq!(
            read(&hosts),
            format!("{OWNED_OLD}{LOCALHOST}10.0.0.1 a.svc # devingressproxy\n")
        );
    }

    #[test]
    fn invalid_sentinels_rejected() {
        assert!(HostsFile::new("/tmp/hosts").with_sentinel("").is_err());
        assert!(HostsFile::new("/tmp/hosts").with_sentinel("   ").is_err());
        assert!(HostsFile::new("/tmp/hosts").with_sentinel(" # a\n").is_err());
    }
}
