//! File delivery
//!
//! - Staged: `GET /download-file/{filename}` sends a finished temp artifact and deletes
//!   it once the transfer ends, whether the client got all of it or not.
//! - Direct: `POST /download` pipes yt-dlp stdout straight into the response body.

use std::io;
use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Form, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{attachment_disposition, display_title, sanitize_title};
use crate::core::validation::validate_video_url;
use crate::download::events::messages;
use crate::download::ytdlp::{log_lines, DownloadTarget};
use crate::download::Quality;
use crate::storage::TempStorage;
use crate::web::pages::error_page;
use crate::web::server::AppState;

const VIDEO_MIME: &str = "video/mp4";

#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    /// Display title to name the saved file after
    pub title: Option<String>,
}

/// Deletes the artifact when the response body is dropped.
///
/// The body is dropped both after the last chunk and when the client goes away
/// mid-transfer, so every retrieval attempt consumes the file.
struct DeleteOnDrop {
    storage: TempStorage,
    path: PathBuf,
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        log::debug!("Transfer of {} ended, deleting", self.path.display());
        self.storage.delete_if_exists(&self.path);
    }
}

/// `GET /download-file/{filename}?title=...`
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<FileQuery>,
) -> AppResult<Response> {
    let storage = state.coordinator.storage().clone();
    let Some(path) = storage.resolve(&filename) else {
        log::warn!("Rejected request for unknown file name {:?}", filename);
        return Err(AppError::NotFound);
    };

    let file = match fs_err::tokio::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => {
            log::error!("Error sending file: {}", e);
            storage.delete_if_exists(&path);
            return Err(e.into());
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let download_name = query
        .title
        .as_deref()
        .map(sanitize_title)
        .filter(|title| !title.is_empty())
        .map(|title| format!("{}{}", title, config::download::ARTIFACT_EXTENSION))
        .unwrap_or_else(|| filename.clone());

    log::info!("Sending {} as {:?}", filename, download_name);

    let guard = DeleteOnDrop { storage, path };
    let body = ReaderStream::new(file).map(move |chunk| {
        let _ = &guard;
        if let Err(e) = &chunk {
            log::error!("Error sending file: {}", e);
        }
        chunk
    });

    let mut headers = attachment_headers(&download_name);
    if let Some(length) = length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok((headers, Body::from_stream(body)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectDownloadForm {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub quality: String,
}

/// `POST /download`
///
/// Failures before the first byte render the landing page with a message. Once bytes
/// flow the status is committed, so a later yt-dlp failure only truncates the body.
pub async fn direct_download(State(state): State<AppState>, Form(form): Form<DirectDownloadForm>) -> Response {
    let url = match validate_video_url(&form.url) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Direct download rejected: {}", e);
            return error_page(StatusCode::BAD_REQUEST, messages::INVALID_URL);
        }
    };
    let quality = Quality::from_input(&form.quality);
    let ytdlp = state.coordinator.ytdlp();

    let title = match ytdlp.resolve_title(url.as_str()).await {
        Ok(title) => title,
        Err(e) if e.is_spawn_failure() => {
            return error_page(StatusCode::INTERNAL_SERVER_ERROR, messages::SPAWN_FAILED_CHECK_PATH);
        }
        Err(e) => {
            log::error!("Direct download title lookup failed for {}: {}", url, e);
            return error_page(StatusCode::INTERNAL_SERVER_ERROR, messages::INFO_FAILED);
        }
    };

    let mut process = match ytdlp.start_download(url.as_str(), quality.format_expression(), &DownloadTarget::Stdout) {
        Ok(process) => process,
        Err(e) => {
            log::error!("Direct download spawn failed: {}", e);
            return error_page(StatusCode::INTERNAL_SERVER_ERROR, messages::SPAWN_FAILED_CHECK_PATH);
        }
    };

    let Some(stdout) = process.take_stdout() else {
        log::error!("yt-dlp stdout was not captured");
        return error_page(StatusCode::INTERNAL_SERVER_ERROR, messages::SPAWN_FAILED);
    };
    if let Some(stderr) = process.take_stderr() {
        tokio::spawn(log_lines(stderr, "stream"));
    }

    let filename = format!(
        "{}{}",
        display_title(&title, quality.label()),
        config::download::ARTIFACT_EXTENSION
    );
    log::info!("Streaming {} at {}p as {:?}", url, quality, filename);
    let headers = attachment_headers(&filename);

    // Runs after stdout hits EOF. If the client disconnects first, the body is dropped
    // with the process still inside and kill_on_drop terminates it.
    let reap = stream::once(async move {
        match process.wait().await {
            Ok(status) if status.success() => log::info!("Direct stream of {} finished", filename),
            Ok(status) => log::error!("yt-dlp (stream) process exited with code {:?}", status.code()),
            Err(e) => log::error!("Waiting for yt-dlp (stream) failed: {}", e),
        }
        None::<io::Result<Bytes>>
    })
    .filter_map(future::ready);

    let body = Body::from_stream(ReaderStream::new(stdout).chain(reap));
    (headers, body).into_response()
}

fn attachment_headers(filename: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(VIDEO_MIME));
    let disposition =
        HeaderValue::from_str(&attachment_disposition(filename)).unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers
}
