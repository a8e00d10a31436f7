//! Artifact directory retention scanning.
//!
//! One sweep deletes every regular file in the artifact directory whose
//! modification time is strictly older than the given cutoff.
//! Per-file failures are logged and counted, never propagated; a
//! half-broken directory must not take down the sweep or the service.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Outcome of one retention sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    /// Regular files inspected.
    pub scanned: usize,
    /// Files deleted.
    pub deleted: usize,
    /// Total size of deleted files.
    pub bytes_reclaimed: u64,
    /// Files that could not be inspected or deleted.
    pub failed: usize,
}

/// Delete all regular files in `dir` with mtime strictly before `cutoff`.
///
/// Subdirectories are left untouched. A missing or unreadable directory
/// yields empty stats.
pub fn sweep_older_than(dir: &Path, cutoff: SystemTime) -> SweepStats {
    let mut stats = SweepStats::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Retention sweep: cannot read artifact directory");
            return stats;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Retention sweep: unreadable directory entry");
                stats.failed += 1;
                continue;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Retention sweep: cannot stat file");
                stats.failed += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        stats.scanned += 1;

        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Retention sweep: no modification time");
                stats.failed += 1;
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                stats.deleted += 1;
                stats.bytes_reclaimed += metadata.len();
                tracing::debug!(file = %path.display(), size = metadata.len(), "Retention sweep: deleted expired artifact");
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Retention sweep: delete failed");
                stats.failed += 1;
            }
        }
    }

    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
