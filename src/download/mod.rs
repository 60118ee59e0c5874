//! Download management: yt-dlp invocation, progress parsing and per-connection sessions

pub mod coordinator;
pub mod events;
pub mod progress;
pub mod quality;
pub mod ytdlp;

// Re-exports for convenience
pub use coordinator::{ConnectionId, Coordinator};
pub use events::{ClientEvent, EventSender, ServerEvent};
pub use quality::Quality;
pub use ytdlp::{DownloadProcess, DownloadTarget, InvokeError, YtDlp};
