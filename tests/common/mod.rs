//! Common test utilities
//!
//! Integration tests drive the real process plumbing against a fake yt-dlp: a small
//! shell script written into a temp dir whose behavior is fixed when it is written.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use vidgrab::download::{Coordinator, ServerEvent, YtDlp};
use vidgrab::storage::TempStorage;

pub const FAKE_TITLE: &str = "My Video";
pub const FAKE_STREAM_BYTES: &str = "FAKEVIDEOBYTES";
pub const FAKE_FILE_BYTES: &str = "fake mp4 payload";

/// How the fake answers `--get-title`
#[derive(Debug, Clone, Copy)]
pub enum TitleBehavior {
    Print(&'static str),
    Fail,
    Hang,
}

/// Behavior baked into one fake yt-dlp script
///
/// File-mode runs leave a `.part` file and a per-format `.f137.mp4` fragment while
/// in flight; only a successful run clears the fragment, like a finished merge.
#[derive(Debug, Clone)]
pub struct FakeYtDlp {
    pub title: TitleBehavior,
    /// Exit code of the download run
    pub exit_code: i32,
    /// Seconds to sleep after the first progress line, or after the streamed bytes
    /// when writing to stdout
    pub pause_secs: u32,
    /// Whether the download run creates the `-o` file
    pub write_output: bool,
}

impl Default for FakeYtDlp {
    fn default() -> Self {
        Self {
            title: TitleBehavior::Print(FAKE_TITLE),
            exit_code: 0,
            pause_secs: 0,
            write_output: true,
        }
    }
}

impl FakeYtDlp {
    /// A download that stays in flight long enough to be cancelled.
    pub fn slow() -> Self {
        Self {
            pause_secs: 5,
            ..Self::default()
        }
    }

    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    fn script(&self) -> String {
        let title = match self.title {
            TitleBehavior::Print(title) => format!("echo '{}'\n    exit 0", title),
            TitleBehavior::Fail => "echo 'ERROR: Unsupported URL' >&2\n    exit 1".to_string(),
            TitleBehavior::Hang => "exec sleep 30".to_string(),
        };
        // `exec` keeps the pid written to stream.pid pointing at the live process
        let stream_end = if self.pause_secs > 0 {
            format!("exec sleep {}", self.pause_secs)
        } else {
            format!("exit {}", self.exit_code)
        };
        let write = if self.write_output {
            format!("printf '{}' > \"$out\"", FAKE_FILE_BYTES)
        } else {
            String::new()
        };

        format!(
            r#"#!/bin/sh
case " $* " in
  *" --get-title "*)
    {title}
    ;;
esac
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ] || [ "$prev" = "--output" ]; then out="$arg"; fi
  prev="$arg"
done
if [ "$out" = "-" ]; then
  echo $$ > "$(dirname "$0")/stream.pid"
  echo "[download]  50.0% of 1.00MiB" >&2
  printf '{stream}'
  {stream_end}
fi
echo "[download] Destination: $out"
echo "[download]  10.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
printf 'partial' > "$out.part"
printf 'video-only' > "${{out%.mp4}}.f137.mp4"
sleep {pause}
echo "[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download] 100% of 1.00MiB"
rm -f "$out.part"
if [ {exit} -eq 0 ]; then rm -f "${{out%.mp4}}.f137.mp4"; fi
{write}
exit {exit}
"#,
            title = title,
            stream = FAKE_STREAM_BYTES,
            stream_end = stream_end,
            exit = self.exit_code,
            pause = self.pause_secs,
            write = write,
        )
    }

    /// Writes the script into `dir` and returns its path.
    pub fn install(&self, dir: &Path) -> PathBuf {
        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, self.script()).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

/// Temp dirs and a coordinator wired to a fake yt-dlp
pub struct TestEnv {
    pub root: tempfile::TempDir,
    pub storage: TempStorage,
    pub coordinator: Coordinator,
}

impl TestEnv {
    pub fn new(fake: FakeYtDlp) -> Self {
        let root = tempfile::tempdir().unwrap();
        let bin = fake.install(root.path());
        Self::with_bin(root, bin)
    }

    pub fn with_bin(root: tempfile::TempDir, bin: impl Into<PathBuf>) -> Self {
        let storage = TempStorage::new(root.path().join("temp_downloads"));
        storage.ensure_dir().unwrap();
        let ytdlp = YtDlp::new(bin).with_title_timeout(Duration::from_secs(10));
        let coordinator = Coordinator::new(ytdlp, storage.clone());
        Self {
            root,
            storage,
            coordinator,
        }
    }

    /// Pid of the last stdout-mode run, as recorded by the fake.
    pub fn stream_pid(&self) -> u32 {
        std::fs::read_to_string(self.root.path().join("stream.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    /// Every file left in the scratch directory.
    pub fn leftover_files(&self) -> Vec<String> {
        std::fs::read_dir(self.storage.dir())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Next event, or `None` once the channel closes. Panics if nothing arrives in time.
pub async fn next_event(rx: &mut UnboundedReceiver<ServerEvent>) -> Option<ServerEvent> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an event")
}

/// Drains the channel until every sender is gone.
pub async fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(rx).await {
        events.push(event);
    }
    events
}
