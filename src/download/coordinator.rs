//! Per-connection download sessions
//!
//! The [`Coordinator`] owns the registry mapping each live connection to its active
//! session. A session goes `ResolvingTitle -> Downloading -> {Completed | Failed |
//! Cancelled}` and is removed from the registry when it reaches a terminal state.
//!
//! Races between a cancel (or disconnect) and the natural end of the process are
//! settled by whoever removes the registry entry first: the loser becomes a no-op
//! apart from deleting the artifact, so a cancelled session never emits a terminal
//! event and never leaves a file behind.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;
use uuid::Uuid;

use crate::core::config;
use crate::core::utils::display_title;
use crate::core::validation::validate_video_url;
use crate::download::events::{messages, DownloadRequest, EventSender, ServerEvent};
use crate::download::progress::{ProgressInfo, ProgressParser};
use crate::download::quality::Quality;
use crate::download::ytdlp::{DownloadProcess, DownloadTarget, YtDlp};
use crate::storage::TempStorage;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Identity of one real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry entry for the active session of a connection
#[derive(Debug)]
struct SessionEntry {
    /// Distinguishes this session from a later one on the same connection
    session_id: u64,
    cancel: CancellationToken,
    /// Set when the download phase starts; `None` while the title is resolving
    output_path: Option<PathBuf>,
}

/// How the download phase ended, before the registry race is settled
enum Outcome {
    Cancelled,
    Exited(io::Result<ExitStatus>),
}

struct Inner {
    sessions: DashMap<ConnectionId, SessionEntry>,
    ytdlp: YtDlp,
    storage: TempStorage,
    next_session_id: AtomicU64,
    tracker: TaskTracker,
}

/// Coordinates one download session per connection.
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(ytdlp: YtDlp, storage: TempStorage) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                ytdlp,
                storage,
                next_session_id: AtomicU64::new(1),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn storage(&self) -> &TempStorage {
        &self.inner.storage
    }

    pub fn ytdlp(&self) -> &YtDlp {
        &self.inner.ytdlp
    }

    /// Number of connections with a session in flight.
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_active(&self, conn: ConnectionId) -> bool {
        self.inner.sessions.contains_key(&conn)
    }

    /// Handles `download-video` from `conn`.
    ///
    /// Returns `false` if the request was rejected (invalid URL, or a session is
    /// already active on this connection); the client has been sent a
    /// `download-error` in that case. Otherwise the session runs in the background and
    /// reports through `events`.
    pub fn request_download(&self, conn: ConnectionId, request: DownloadRequest, events: EventSender) -> bool {
        let url = match validate_video_url(&request.video_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Rejected download request from {}: {}", conn, e);
                send(&events, ServerEvent::error(messages::INVALID_URL));
                return false;
            }
        };
        let quality = Quality::from_input(&request.quality);
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        match self.inner.sessions.entry(conn) {
            Entry::Occupied(_) => {
                log::warn!("Connection {} already has an active download, rejecting {}", conn, url);
                send(&events, ServerEvent::error(messages::ALREADY_DOWNLOADING));
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(SessionEntry {
                    session_id,
                    cancel: cancel.clone(),
                    output_path: None,
                });
            }
        }

        log::info!(
            "Received download request for {} at {}p from {} (session {})",
            url,
            quality,
            conn,
            session_id
        );

        let this = self.clone();
        self.inner.tracker.spawn(async move {
            this.run_session(conn, session_id, cancel, url, quality, events).await;
        });
        true
    }

    /// Handles `cancel-download`. Returns `false` (and does nothing) if the connection is idle.
    pub fn cancel(&self, conn: ConnectionId) -> bool {
        let cancelled = self.abort(conn);
        if cancelled {
            log::info!("Cancelled download for {}", conn);
        } else {
            log::debug!("Cancel from {} with nothing active", conn);
        }
        cancelled
    }

    /// Handles transport-level disconnect: same effect as a cancel.
    pub fn disconnect(&self, conn: ConnectionId) {
        if self.abort(conn) {
            log::info!("User {} disconnected mid-download, cleaned up", conn);
        } else {
            log::debug!("User disconnected: {}", conn);
        }
    }

    /// Cancels every session and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        let connections: Vec<ConnectionId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        for conn in connections {
            self.abort(conn);
        }
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        log::info!("All download sessions stopped");
    }

    /// Optimistic cancel: drop the entry and the artifact now, the session task reaps the process.
    fn abort(&self, conn: ConnectionId) -> bool {
        let Some((_, entry)) = self.inner.sessions.remove(&conn) else {
            return false;
        };
        entry.cancel.cancel();
        if let Some(path) = entry.output_path {
            self.inner.storage.delete_if_exists(&path);
        }
        true
    }

    /// Removes the entry only if it still belongs to `session_id`.
    ///
    /// `true` means this caller won the race and owns the terminal event.
    fn settle(&self, conn: ConnectionId, session_id: u64) -> bool {
        self.inner
            .sessions
            .remove_if(&conn, |_, entry| entry.session_id == session_id)
            .is_some()
    }

    async fn run_session(
        self,
        conn: ConnectionId,
        session_id: u64,
        cancel: CancellationToken,
        url: Url,
        quality: Quality,
        events: EventSender,
    ) {
        // Phase 1: title
        let title = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Session {} cancelled while resolving title", session_id);
                return;
            }
            result = self.inner.ytdlp.resolve_title(url.as_str()) => result,
        };

        let title = match title {
            Ok(title) => title,
            Err(e) => {
                log::error!("Title lookup failed for {}: {}", url, e);
                if self.settle(conn, session_id) {
                    let message = if e.is_spawn_failure() {
                        messages::SPAWN_FAILED
                    } else {
                        messages::TITLE_FAILED
                    };
                    send(&events, ServerEvent::error(message));
                }
                return;
            }
        };

        // Phase 2: download
        let output_path = self.inner.storage.allocate(config::download::ARTIFACT_EXTENSION);
        match self.inner.sessions.get_mut(&conn) {
            Some(mut entry) if entry.session_id == session_id => entry.output_path = Some(output_path.clone()),
            _ => {
                log::info!("Session {} cancelled before download started", session_id);
                return;
            }
        }

        let target = DownloadTarget::File(output_path.clone());
        let mut process = match self
            .inner
            .ytdlp
            .start_download(url.as_str(), quality.format_expression(), &target)
        {
            Ok(process) => process,
            Err(e) => {
                log::error!("yt-dlp spawn error: {}", e);
                if self.settle(conn, session_id) {
                    send(&events, ServerEvent::error(messages::SPAWN_FAILED));
                }
                return;
            }
        };

        let outcome = relay_output(&mut process, &cancel, &events).await;

        match outcome {
            Outcome::Cancelled => {
                process.cancel();
                if let Err(e) = process.wait().await {
                    log::warn!("Failed to reap cancelled yt-dlp: {}", e);
                }
                // The canceller deleted what existed then; the process may have written since
                self.inner.storage.purge(&output_path).await;
            }
            Outcome::Exited(status) => {
                if !self.settle(conn, session_id) {
                    log::debug!("Session {} exited after being cancelled", session_id);
                    self.inner.storage.purge(&output_path).await;
                    return;
                }
                let event = terminal_event(&output_path, &title, quality, status);
                if !matches!(event, ServerEvent::Complete { .. }) {
                    self.inner.storage.purge(&output_path).await;
                }
                send(&events, event);
            }
        }
    }
}

/// Maps the exit of a download to the event the client sees.
fn terminal_event(
    output_path: &Path,
    title: &str,
    quality: Quality,
    status: io::Result<ExitStatus>,
) -> ServerEvent {
    let failure = match status {
        Ok(status) if status.success() => {
            let filename = output_path.file_name().and_then(|n| n.to_str());
            match filename {
                Some(filename) if output_path.is_file() => {
                    log::info!("Download completed successfully: {}", output_path.display());
                    return ServerEvent::Complete {
                        filename: filename.to_string(),
                        title: Some(display_title(title, quality.label())),
                    };
                }
                _ => format!("yt-dlp exited 0 but {} is missing", output_path.display()),
            }
        }
        Ok(status) => format!("yt-dlp process exited with code {:?}", status.code()),
        Err(e) => format!("waiting for yt-dlp failed: {}", e),
    };

    log::error!("{}", failure);
    ServerEvent::error(messages::download_failed(quality.label()))
}

/// Reads stdout and stderr to EOF, relaying progress, then waits for exit.
///
/// Reading both streams to the end before waiting keeps every progress event ahead
/// of the terminal one.
async fn relay_output(process: &mut DownloadProcess, cancel: &CancellationToken, events: &EventSender) -> Outcome {
    let mut stdout = process.take_stdout();
    let mut stderr = process.take_stderr();
    let mut stdout_parser = ProgressParser::new();
    let mut stderr_parser = ProgressParser::new();
    let mut stdout_buf = vec![0u8; READ_BUF_SIZE];
    let mut stderr_buf = vec![0u8; READ_BUF_SIZE];
    let mut last_percent: Option<f64> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Cancelled,
            read = read_chunk(&mut stdout, &mut stdout_buf) => {
                let found = consume(read, &stdout_buf, &mut stdout, &mut stdout_parser);
                emit_progress(found, &mut last_percent, events);
            }
            read = read_chunk(&mut stderr, &mut stderr_buf) => {
                let found = consume(read, &stderr_buf, &mut stderr, &mut stderr_parser);
                emit_progress(found, &mut last_percent, events);
            }
            status = process.wait(), if stdout.is_none() && stderr.is_none() => {
                return Outcome::Exited(status);
            }
        }
    }
}

/// Pending forever once the stream is closed, so the select loop stops polling it.
async fn read_chunk<R: AsyncRead + Unpin>(stream: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
    match stream {
        Some(stream) => stream.read(buf).await,
        None => std::future::pending().await,
    }
}

fn consume<R>(
    read: io::Result<usize>,
    buf: &[u8],
    stream: &mut Option<R>,
    parser: &mut ProgressParser,
) -> Vec<ProgressInfo> {
    match read {
        Ok(0) => {
            *stream = None;
            parser.finish().into_iter().collect()
        }
        Ok(n) => parser.push(&String::from_utf8_lossy(&buf[..n])),
        Err(e) => {
            log::warn!("Reading yt-dlp output failed: {}", e);
            *stream = None;
            parser.finish().into_iter().collect()
        }
    }
}

fn emit_progress(found: Vec<ProgressInfo>, last_percent: &mut Option<f64>, events: &EventSender) {
    for info in found {
        if *last_percent == Some(info.percent) {
            continue;
        }
        *last_percent = Some(info.percent);
        send(events, info.into());
    }
}

fn send(events: &EventSender, event: ServerEvent) {
    let terminal = event.is_terminal();
    if events.send(event).is_err() {
        if terminal {
            log::info!("Connection gone before the outcome could be reported");
        } else {
            log::debug!("Connection gone, dropping event");
        }
    }
}
