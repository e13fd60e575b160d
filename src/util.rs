//! Internal utilities.

use std::path::Path;

/// Returns `true` if the process runs with an effective UID of root.
#[cfg(unix)]
#[must_use]
pub fn is_privileged() -> bool {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Non-Unix platforms have no cheap effective-UID check; assume the
/// caller knows what it is doing.
#[cfg(not(unix))]
#[must_use]
pub const fn is_privileged() -> bool {
    true
}

/// Returns `true` if `path` is writable by the current process, judged by
/// its parent directory (the rewrite creates a sibling staging file).
#[must_use]
pub fn can_stage_next_to(path: &Path) -> bool {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::metadata(dir).is_ok_and(|m| !m.permissions().readonly())
        && (is_privileged() || !is_system_path(path))
}

/// Files under `/etc` are root-owned on every Unix we target.
fn is_system_path(path: &Path) -> bool {
    path.starts_with("/etc")
}
