use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters reported once traversal ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinderStats {
    pub files: usize,
    pub errors: usize,
}

/// Handle to the running file finder
pub struct FinderHandle {
    task: JoinHandle<FinderStats>,
}

impl FinderHandle {
    /// Wait for traversal to finish. The output channel is already closed
    /// by the time this returns.
    pub async fn wait(self) -> Result<FinderStats, tokio::task::JoinError> {
        self.task.await
    }
}

/// Walk `root` recursively on a blocking task, sending every matching file
/// path into `output`.
///
/// `extensions` filters by file extension (case-insensitive); an empty list
/// accepts every file. Unreadable entries are logged and skipped. The sender
/// is owned by the task, so the channel closes exactly once when the walk
/// ends, whether or not errors occurred.
pub fn spawn_finder(
    root: PathBuf,
    extensions: Vec<String>,
    output: mpsc::Sender<PathBuf>,
) -> FinderHandle {
    let task = tokio::task::spawn_blocking(move || walk(&root, &extensions, output));
    FinderHandle { task }
}

fn walk(root: &Path, extensions: &[String], output: mpsc::Sender<PathBuf>) -> FinderStats {
    let mut stats = FinderStats::default();
    info!(root = %root.display(), "File discovery started");

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    path = ?e.path().map(|p| p.display().to_string()),
                    error = %e,
                    "Skipping unreadable entry"
                );
                stats.errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }

        debug!(filename = %entry.path().display(), "Discovered file");
        if output.blocking_send(entry.into_path()).is_err() {
            warn!("Filename channel closed, stopping discovery");
            break;
        }
        stats.files += 1;
    }

    info!(files = stats.files, errors = stats.errors, "File discovery complete");
    stats
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
