use crate::security::TMP_MARKER;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Temporary files younger than this may belong to a live upload.
pub(crate) const STALE_AFTER: Duration = Duration::from_secs(300);

/// Outcome of a temporary-file sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

pub(crate) async fn purge_tmp(root: &Path, stale_after: Duration) -> PurgeReport {
    let root: PathBuf = root.to_path_buf();
    let now = SystemTime::now();

    match tokio::task::spawn_blocking(move || sweep(&root, now, stale_after)).await {
        Ok(report) => {
            if report.removed > 0 || report.failed > 0 {
                info!(removed = report.removed, failed = report.failed, "Purged stale upload files");
            }
            report
        },
        Err(e) => {
            error!(error = %e, "Temporary file sweep panicked");
            PurgeReport::default()
        },
    }
}

fn sweep(root: &Path, now: SystemTime, stale_after: Duration) -> PurgeReport {
    let mut report = PurgeReport::default();

    for entry in WalkDir::new(root).min_depth(1).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_tmp = entry.file_name().to_str().is_some_and(|name| name.contains(TMP_MARKER));
        if !is_tmp || !is_stale(entry.path(), now, stale_after) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Could not remove stale upload file");
                report.failed += 1;
            },
        }
    }
    report
}

fn is_stale(path: &Path, now: SystemTime, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age >= stale_after)
}
