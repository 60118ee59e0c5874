//! Vidgrab - web front-end for yt-dlp
//!
//! A browser submits a video URL and a quality tier over a WebSocket, watches live
//! progress while yt-dlp downloads into a temp directory, then fetches the finished
//! file over HTTP. A form-based path streams yt-dlp output straight into the response
//! for clients without WebSocket support.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, validation and small helpers
//! - `storage`: the transient scratch directory
//! - `download`: yt-dlp invocation, progress parsing and per-connection sessions
//! - `web`: HTTP routes, the WebSocket channel and file delivery

pub mod cli;
pub mod core;
pub mod download;
pub mod storage;
pub mod web;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use download::{Coordinator, YtDlp};
pub use storage::TempStorage;
pub use web::{create_router, run_server};
