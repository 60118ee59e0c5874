//! Server-rendered landing page.
//!
//! The page carries both flows: the WebSocket client for staged downloads with live
//! progress, and a plain form posting to `/download` for direct streaming.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 640px; margin: 3rem auto; padding: 0 1rem; color: #222; }
h1 { font-size: 1.6rem; }
form { display: flex; flex-wrap: wrap; gap: .5rem; margin-bottom: 1rem; }
input[type=url] { flex: 1 1 320px; padding: .5rem; }
select, button { padding: .5rem .8rem; }
.error { background: #fdecea; color: #a61b1b; padding: .6rem .8rem; border-radius: 4px; }
#progress { width: 100%; height: 1.2rem; }
#status { min-height: 1.4rem; }
.hidden { display: none; }
details { margin-top: 2rem; }
"#;

const CLIENT_SCRIPT: &str = r#"
(() => {
  const form = document.getElementById('staged-form');
  const urlInput = document.getElementById('video-url');
  const qualityInput = document.getElementById('quality');
  const startBtn = document.getElementById('start');
  const cancelBtn = document.getElementById('cancel');
  const bar = document.getElementById('progress');
  const status = document.getElementById('status');
  let ws = null;
  let busy = false;

  function setBusy(value) {
    busy = value;
    startBtn.disabled = value;
    cancelBtn.classList.toggle('hidden', !value);
    bar.classList.toggle('hidden', !value);
  }

  function connect() {
    const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
    ws = new WebSocket(proto + '//' + location.host + '/ws');
    ws.onmessage = (msg) => {
      let frame;
      try { frame = JSON.parse(msg.data); } catch (_) { return; }
      const data = frame.data || {};
      if (frame.event === 'progress') {
        bar.value = data.percent;
        status.textContent = 'Downloading... ' + data.percent.toFixed(1) + '%';
      } else if (frame.event === 'complete') {
        setBusy(false);
        status.textContent = 'Done: ' + (data.title || data.filename);
        const query = data.title ? '?title=' + encodeURIComponent(data.title) : '';
        window.location.href = '/download-file/' + encodeURIComponent(data.filename) + query;
      } else if (frame.event === 'download-error') {
        setBusy(false);
        status.textContent = data.message;
      }
    };
    ws.onclose = () => {
      if (busy) { setBusy(false); status.textContent = 'Connection lost.'; }
      setTimeout(connect, 2000);
    };
  }

  form.addEventListener('submit', (e) => {
    e.preventDefault();
    if (!ws || ws.readyState !== WebSocket.OPEN) { status.textContent = 'Not connected yet, try again.'; return; }
    setBusy(true);
    bar.value = 0;
    status.textContent = 'Fetching video info...';
    ws.send(JSON.stringify({ event: 'download-video', data: { videoUrl: urlInput.value, quality: qualityInput.value } }));
  });

  cancelBtn.addEventListener('click', () => {
    if (ws) ws.send(JSON.stringify({ event: 'cancel-download' }));
    setBusy(false);
    status.textContent = 'Cancelled.';
  });

  connect();
})();
"#;

/// `GET /`
pub async fn index() -> Html<String> {
    Html(render_index(None))
}

/// Landing page with an error banner, for the direct streaming form.
pub fn error_page(status: StatusCode, message: &str) -> Response {
    (status, Html(render_index(Some(message)))).into_response()
}

pub fn render_index(error: Option<&str>) -> String {
    let banner = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, html_escape(message)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>vidgrab</title>
<style>{style}</style>
</head>
<body>
<h1>Video downloader</h1>
{banner}
<form id="staged-form">
  <input type="url" id="video-url" placeholder="https://..." required>
  <select id="quality">{options}</select>
  <button type="submit" id="start">Download</button>
  <button type="button" id="cancel" class="hidden">Cancel</button>
</form>
<progress id="progress" class="hidden" max="100" value="0"></progress>
<p id="status"></p>
<details>
  <summary>No progress bar? Stream directly</summary>
  <form method="post" action="/download">
    <input type="url" name="url" placeholder="https://..." required>
    <select name="quality">{options}</select>
    <button type="submit">Stream</button>
  </form>
</details>
<script>{script}</script>
</body>
</html>"#,
        style = STYLE,
        banner = banner,
        options = QUALITY_OPTIONS,
        script = CLIENT_SCRIPT,
    )
}

const QUALITY_OPTIONS: &str =
    r#"<option value="1080">1080p</option><option value="720" selected>720p</option><option value="360">360p</option>"#;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
