//! Scratch directory for temp artifacts
//!
//! Every download session writes to its own `<16 hex chars>.mp4` file here. Files
//! are transient: they are removed after delivery, on failure, on cancellation, and
//! by the periodic stale sweep if a client never comes back for them.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::core::config;
use crate::core::validation::validate_artifact_name;

/// Number of random bytes in an artifact name (hex-encoded to twice as many chars)
const ARTIFACT_ID_BYTES: usize = 8;

/// Owner of the scratch directory.
#[derive(Debug, Clone)]
pub struct TempStorage {
    dir: PathBuf,
}

impl TempStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage rooted at `TEMP_DOWNLOADS_DIR`.
    pub fn from_config() -> Self {
        Self::new(config::TEMP_DOWNLOADS_DIR.as_str())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the scratch directory if it is missing. Idempotent.
    ///
    /// Callers treat an error as fatal: without the directory no download can succeed.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs_err::create_dir_all(&self.dir)?;
        log::debug!("Temp downloads dir ready: {}", self.dir.display());
        Ok(())
    }

    /// Returns a fresh path `<dir>/<hex id><extension>`.
    ///
    /// The id carries 64 bits of OS-seeded randomness, so concurrent sessions never
    /// collide in practice.
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let id: [u8; ARTIFACT_ID_BYTES] = rand::random();
        self.dir.join(format!("{}{}", hex::encode(id), extension))
    }

    /// Maps a client-supplied artifact name to a path inside the scratch directory.
    ///
    /// Returns `None` for anything that is not an artifact name, which covers
    /// traversal attempts and yt-dlp side files.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        validate_artifact_name(filename).ok()?;
        Some(self.dir.join(filename))
    }

    /// Best-effort removal of `path` and the side files whose names are known up front.
    ///
    /// Never fails: a missing file is the expected case after a successful delivery,
    /// anything else is logged and swallowed. Touches a fixed handful of paths, so it
    /// is fine to call from async code; per-format fragments are left to [`Self::purge`].
    pub fn delete_if_exists(&self, path: &Path) {
        remove_quietly(path);
        for side in known_side_files(path) {
            remove_quietly(&side);
        }
    }

    /// Removes `path` and every intermediate file yt-dlp derived from it.
    ///
    /// Scans the directory, so the work runs on the blocking pool.
    pub async fn purge(&self, path: &Path) {
        let storage = self.clone();
        let path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            storage.delete_if_exists(&path);
            cleanup_partial_download(&path);
        })
        .await;
        if let Err(e) = result {
            log::error!("Temp file cleanup task failed: {}", e);
        }
    }

    /// Removes artifacts (and side files) whose last modification is older than `max_age`.
    ///
    /// Returns the number of files removed.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let entries = match fs_err::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Stale sweep skipped: {}", e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_artifact_or_side_file(name) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if age.is_some_and(|age| age >= max_age) && remove_quietly(&path) {
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!("🧹 Removed {} stale file(s) from {}", removed, self.dir.display());
        }
        removed
    }
}

/// Spawns the periodic stale sweep.
///
/// Runs once immediately, then every `interval`, until the runtime shuts down.
pub fn start_stale_sweep_task(storage: TempStorage, max_age: Duration, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "🧹 Stale file sweep started (max age: {}s, interval: {}s)",
            max_age.as_secs(),
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let storage = storage.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || storage.sweep_stale(max_age)).await {
                log::error!("Stale sweep task failed: {}", e);
            }
        }
    })
}

/// Returns true if a file was actually removed.
fn remove_quietly(path: &Path) -> bool {
    match fs_err::remove_file(path) {
        Ok(()) => {
            log::debug!("Deleted temp file {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            log::error!("Error deleting temp file: {}", e);
            false
        }
    }
}

/// True for `<16 hex>.mp4` and anything yt-dlp derives from it (`.part`, `.ytdl`, `.f137.mp4`, ...).
fn is_artifact_or_side_file(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 2 * ARTIFACT_ID_BYTES
        && bytes[..2 * ARTIFACT_ID_BYTES]
            .iter()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && bytes[2 * ARTIFACT_ID_BYTES] == b'.'
}

/// `<name>.part`, `<name>.ytdl` and `<stem>.temp.<ext>` for an artifact path.
fn known_side_files(path: &Path) -> Vec<PathBuf> {
    let (Some(name), Some(stem)) = (
        path.file_name().and_then(|n| n.to_str()),
        path.file_stem().and_then(|s| s.to_str()),
    ) else {
        return Vec::new();
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    vec![
        path.with_file_name(format!("{}.part", name)),
        path.with_file_name(format!("{}.ytdl", name)),
        path.with_file_name(format!("{}.temp.{}", stem, ext)),
    ]
}

/// Removes the intermediate files yt-dlp creates for `path`.
///
/// yt-dlp writes `<name>.part` while downloading, `<name>.ytdl` for resume state,
/// `<stem>.f<format>.<ext>` (+ `.part`) per stream before merging, and
/// `<stem>.temp.<ext>` while the merger runs.
fn cleanup_partial_download(path: &Path) {
    let (Some(parent), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str())) else {
        return;
    };
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };

    let Ok(entries) = fs_err::read_dir(parent) else {
        return;
    };

    let stem_prefix = format!("{}.", stem);
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name != file_name && name.starts_with(&stem_prefix) {
            remove_quietly(&entry.path());
        }
    }
}
