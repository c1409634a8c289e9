//! Periodic scratch-directory housekeeping.
//!
//! Upload handlers leave temp files behind when requests are abandoned
//! mid-flight; the sweeper deletes anything older than the configured age
//! from the listed directories. Other processes create and remove files in
//! the same directories concurrently, so a file vanishing between scan and
//! delete is normal.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Directories to sweep. Never scanned recursively.
    pub scratch_dirs: Vec<PathBuf>,
    /// Files at least this old get removed
    pub max_age: Duration,
    /// Time between sweeps
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepStats {
    pub examined: usize,
    pub removed: usize,
}

/// Run one sweep over every configured scratch directory.
///
/// A missing directory is skipped. Subdirectories are left alone.
pub async fn sweep_once(config: &CleanupConfig) -> io::Result<SweepStats> {
    let mut stats = SweepStats::default();
    let now = SystemTime::now();

    for dir in &config.scratch_dirs {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Scratch dir {} does not exist, skipping", dir.display());
                continue;
            }
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Vanished between scan and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            stats.examined += 1;

            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < config.max_age {
                continue;
            }

            match remove_stale(&entry.path()).await {
                Ok(true) => {
                    stats.removed += 1;
                    info!("Removed stale file: {}", entry.path().display());
                }
                Ok(false) => {} // already gone
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }

    info!(
        "Housekeeping sweep done: {} removed of {} examined",
        stats.removed, stats.examined
    );
    Ok(stats)
}

/// Delete a stale file, treating "already deleted" as success.
async fn remove_stale(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Spawn the periodic sweeper. The first sweep runs immediately, then every
/// `config.interval`.
pub fn spawn_housekeeping(config: CleanupConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.interval);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(&config).await {
                warn!("Housekeeping sweep failed: {e}");
            }
        }
    })
}
