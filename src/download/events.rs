//! Real-time protocol between the browser and the coordinator
//!
//! Frames are JSON objects `{"event": <name>, "data": <payload>}`, the same shape in
//! both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::download::progress::ProgressInfo;

/// User-facing messages for every failure path
pub mod messages {
    pub const INVALID_URL: &str = "Please enter a valid URL.";
    pub const INVALID_REQUEST: &str = "Invalid request.";
    pub const ALREADY_DOWNLOADING: &str = "A download is already in progress. Cancel it before starting another.";
    pub const TITLE_FAILED: &str = "Could not get video title. The URL might be invalid.";
    pub const SPAWN_FAILED: &str = "Failed to start the download process.";

    // Direct streaming form
    pub const INFO_FAILED: &str = "Failed to get video information. The URL might be invalid or unsupported.";
    pub const SPAWN_FAILED_CHECK_PATH: &str =
        "Failed to start the download process. Check the configured yt-dlp path.";

    pub fn download_failed(quality_label: &str) -> String {
        format!(
            "Download failed. The video may not be available in {}p or another error occurred.",
            quality_label
        )
    }
}

/// Events sent to one connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        percent: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed_bytes_per_sec: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<u64>,
    },
    Complete {
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    DownloadError {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::DownloadError {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ServerEvent::Progress { .. })
    }
}

impl From<ProgressInfo> for ServerEvent {
    fn from(info: ProgressInfo) -> Self {
        ServerEvent::Progress {
            percent: info.percent,
            total_bytes: info.total_bytes,
            speed_bytes_per_sec: info.speed_bytes_per_sec,
            eta_seconds: info.eta_seconds,
        }
    }
}

/// Outbound half of a connection
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Payload of `download-video`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub video_url: String,
    /// Kept as raw input; unknown tiers fall back to 360p
    #[serde(default, deserialize_with = "quality_input")]
    pub quality: String,
}

/// Browsers send the tier either as `"720"` or as a bare number.
fn quality_input<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Events received from a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    DownloadVideo(DownloadRequest),
    CancelDownload,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Parses one text frame. `cancel-download` ignores any payload.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        match envelope.event.as_str() {
            "download-video" => Ok(ClientEvent::DownloadVideo(serde_json::from_value(envelope.data)?)),
            "cancel-download" => Ok(ClientEvent::CancelDownload),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}
