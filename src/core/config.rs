use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the web front-end.
/// Every value is read once, the first time it is touched, after `.env` has been loaded.
///
/// yt-dlp binary path
/// Read from YTDL_BIN environment variable.
/// Defaults to `yt-dlp` resolved through PATH (`yt-dlp.exe` on Windows).
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| default_ytdl_bin().to_string()));

#[cfg(windows)]
fn default_ytdl_bin() -> &'static str {
    "yt-dlp.exe"
}

#[cfg(not(windows))]
fn default_ytdl_bin() -> &'static str {
    "yt-dlp"
}

/// HTTP port
/// Read from PORT environment variable
/// Default: 3000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
});

/// Address the HTTP listener binds to
/// Read from BIND_ADDR environment variable
/// Default: 0.0.0.0
pub static BIND_ADDR: Lazy<String> = Lazy::new(|| env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Scratch directory for downloads in flight and finished files awaiting retrieval
/// Read from TEMP_DOWNLOADS_DIR environment variable
/// Default: temp_downloads next to the executable
pub static TEMP_DOWNLOADS_DIR: Lazy<String> =
    Lazy::new(|| env::var("TEMP_DOWNLOADS_DIR").unwrap_or_else(|_| default_temp_dir()));

/// `<exe dir>/temp_downloads`, or plain `temp_downloads` if the executable path is unknown
fn default_temp_dir() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("temp_downloads")))
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_else(|| "temp_downloads".to_string())
}

/// Directory with static assets served as a fallback
/// Read from PUBLIC_DIR environment variable
/// Default: public
pub static PUBLIC_DIR: Lazy<String> = Lazy::new(|| env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: vidgrab.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "vidgrab.log".to_string()));

fn env_secs(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Download configuration
pub mod download {
    use super::{env_secs, Duration, Lazy};

    /// Extension of every temp artifact; yt-dlp merges into this container
    pub const ARTIFACT_EXTENSION: &str = ".mp4";

    /// Container passed to `--merge-output-format`
    pub const MERGE_OUTPUT_FORMAT: &str = "mp4";

    /// Title used when yt-dlp succeeds but prints nothing
    pub const PLACEHOLDER_TITLE: &str = "video";

    /// Timeout for `yt-dlp --get-title` (in seconds)
    /// Read from YTDLP_TITLE_TIMEOUT_SECS, default 60
    pub static TITLE_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_secs("YTDLP_TITLE_TIMEOUT_SECS", 60));

    /// Number of trailing stderr lines kept for diagnostics
    pub const STDERR_TAIL_LINES: usize = 20;

    /// Title lookup timeout duration
    pub fn title_timeout() -> Duration {
        Duration::from_secs(*TITLE_TIMEOUT_SECS)
    }
}

/// Temp storage housekeeping
pub mod cleanup {
    use super::{env_secs, Duration, Lazy};

    /// Age after which an unclaimed artifact is considered abandoned (in seconds)
    /// Read from STALE_FILE_MAX_AGE_SECS, default 1 hour
    pub static STALE_FILE_MAX_AGE_SECS: Lazy<u64> = Lazy::new(|| env_secs("STALE_FILE_MAX_AGE_SECS", 3600));

    /// Interval between stale-file sweeps (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600; // 10 minutes

    /// Stale artifact age duration
    pub fn stale_max_age() -> Duration {
        Duration::from_secs(*STALE_FILE_MAX_AGE_SECS)
    }

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}
