//! yt-dlp process wrapper
//!
//! Two call shapes:
//! - [`YtDlp::resolve_title`]: request/response, awaits the process and returns its output
//! - [`YtDlp::start_download`]: long-running, returns a [`DownloadProcess`] handle whose
//!   stdout/stderr the caller drains and which can be cancelled at any time

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::core::config;
use crate::core::utils::sanitize_title;

/// Errors raised at the yt-dlp process boundary
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The binary could not be started at all (missing, not executable, bad path)
    #[error("failed to start '{bin}': {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },

    /// The process ran and exited unsuccessfully
    #[error("yt-dlp exited with {}: {stderr_tail}", describe_code(.code))]
    Exited { code: Option<i32>, stderr_tail: String },

    /// The process did not finish in time and was killed
    #[error("yt-dlp timed out after {0}s")]
    Timeout(u64),

    /// Waiting on or reading from the process failed
    #[error("yt-dlp process failed: {0}")]
    Io(#[from] io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl InvokeError {
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, InvokeError::Spawn { .. })
    }
}

/// Where `start_download` writes the media
#[derive(Debug, Clone)]
pub enum DownloadTarget {
    /// Write to this path (staged delivery)
    File(PathBuf),
    /// Write to stdout (`-o -`) so the caller can pipe bytes into a response
    Stdout,
}

/// Handle to the external download tool.
///
/// The binary is fixed once at startup; nothing is re-resolved per request.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    title_timeout: Duration,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            title_timeout: config::download::title_timeout(),
        }
    }

    /// Binary from `YTDL_BIN` (or the platform default).
    pub fn from_config() -> Self {
        Self::new(config::YTDL_BIN.as_str())
    }

    pub fn with_title_timeout(mut self, timeout: Duration) -> Self {
        self.title_timeout = timeout;
        self
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn(&self, cmd: &mut Command) -> Result<Child, InvokeError> {
        cmd.spawn().map_err(|source| {
            log::error!("Failed to spawn {}: {}", self.bin.display(), source);
            InvokeError::Spawn {
                bin: self.bin.display().to_string(),
                source,
            }
        })
    }

    /// Prints the tool version; used by the `check` subcommand.
    pub async fn version(&self) -> Result<String, InvokeError> {
        let mut cmd = self.command();
        cmd.arg("--version").stdout(Stdio::piped()).stderr(Stdio::piped());
        let child = self.spawn(&mut cmd)?;
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(InvokeError::Exited {
                code: output.status.code(),
                stderr_tail: stderr_tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Resolves the video title with `--get-title`.
    ///
    /// The first non-empty stdout line is trimmed and sanitized for filenames. A
    /// successful run that prints nothing yields the placeholder title.
    pub async fn resolve_title(&self, url: &str) -> Result<String, InvokeError> {
        let mut cmd = self.command();
        cmd.args(["--get-title", "--no-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("yt-dlp command for title: {} --get-title --no-playlist {}", self.bin.display(), url);

        let child = self.spawn(&mut cmd)?;
        // Dropping the future on timeout drops the child, and kill_on_drop terminates it
        let output = match tokio::time::timeout(self.title_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                log::error!("yt-dlp title lookup timed out after {}s", self.title_timeout.as_secs());
                return Err(InvokeError::Timeout(self.title_timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let tail = stderr_tail(&output.stderr);
            log::error!("yt-dlp title process exited with {:?}: {}", output.status.code(), tail);
            return Err(InvokeError::Exited {
                code: output.status.code(),
                stderr_tail: tail,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = stdout
            .lines()
            .map(sanitize_title)
            .find(|line| !line.is_empty())
            .unwrap_or_else(|| config::download::PLACEHOLDER_TITLE.to_string());

        Ok(title)
    }

    /// Starts a download and returns immediately with a live handle.
    ///
    /// Spawn failures are returned here, distinct from a nonzero exit reported later
    /// by [`DownloadProcess::wait`].
    pub fn start_download(&self, url: &str, format: &str, target: &DownloadTarget) -> Result<DownloadProcess, InvokeError> {
        let mut cmd = self.command();
        cmd.args(download_args(url, format, target))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = self.spawn(&mut cmd)?;
        log::info!(
            "Started yt-dlp (pid {:?}) for {} with format '{}'",
            child.id(),
            url,
            format
        );
        Ok(DownloadProcess { child })
    }
}

/// Argument list for a download run.
pub fn download_args(url: &str, format: &str, target: &DownloadTarget) -> Vec<String> {
    match target {
        DownloadTarget::File(path) => vec![
            url.to_string(),
            "--progress".to_string(),
            // One progress report per line makes parsing reliable
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "--merge-output-format".to_string(),
            config::download::MERGE_OUTPUT_FORMAT.to_string(),
            "-f".to_string(),
            format.to_string(),
            "-o".to_string(),
            path.display().to_string(),
        ],
        DownloadTarget::Stdout => vec![
            "-f".to_string(),
            format.to_string(),
            "--no-playlist".to_string(),
            "--output".to_string(),
            "-".to_string(),
            url.to_string(),
        ],
    }
}

/// Last few stderr lines, for logs and error values.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let mut tail: VecDeque<&str> = VecDeque::with_capacity(config::download::STDERR_TAIL_LINES);
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if tail.len() == config::download::STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// A running yt-dlp download.
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct DownloadProcess {
    child: Child,
}

impl DownloadProcess {
    /// Diagnostic stream; carries progress lines when writing to stdout.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Media bytes in [`DownloadTarget::Stdout`] mode, progress lines otherwise.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Waits for the process to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Requests termination without waiting for it. Safe to call after exit.
    pub fn cancel(&mut self) {
        match self.child.start_kill() {
            Ok(()) => log::info!("Sent kill to yt-dlp (pid {:?})", self.child.id()),
            // Already exited and reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => log::warn!("Failed to kill yt-dlp: {}", e),
        }
    }
}

/// Drains a diagnostic stream into the log, line by line.
pub async fn log_lines(stderr: ChildStderr, context: &str) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("yt-dlp {} stderr: {}", context, line);
    }
}
