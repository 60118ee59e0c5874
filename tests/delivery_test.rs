//! HTTP delivery: staged file retrieval and direct streaming
//!
//! Run with: cargo test --test delivery_test

#![cfg(unix)]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use common::{drain, FakeYtDlp, TestEnv, TitleBehavior, FAKE_FILE_BYTES, FAKE_STREAM_BYTES};
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tower::ServiceExt;

use vidgrab::download::events::{messages, DownloadRequest};
use vidgrab::download::{ConnectionId, ServerEvent};
use vidgrab::web::create_router;

fn router(env: &TestEnv) -> Router {
    create_router(env.coordinator.clone(), env.root.path())
}

async fn get(env: &TestEnv, uri: &str) -> Response<Body> {
    router(env)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(env: &TestEnv, form: &str) -> Response<Body> {
    router(env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/download")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn disposition(response: &Response<Body>) -> String {
    response.headers()[CONTENT_DISPOSITION].to_str().unwrap().to_string()
}

/// Places a finished artifact in the scratch dir and returns its name.
fn stage_artifact(env: &TestEnv) -> String {
    let path = env.storage.allocate(".mp4");
    std::fs::write(&path, FAKE_FILE_BYTES).unwrap();
    path.file_name().unwrap().to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_staged_file_is_sent_once_then_deleted() {
    let env = TestEnv::new(FakeYtDlp::default());
    let name = stage_artifact(&env);

    let response = get(&env, &format!("/download-file/{}?title=My%20Video%20%5B720p%5D", name)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(disposition(&response), "attachment; filename=\"My Video [720p].mp4\"");
    assert_eq!(body_text(response).await, FAKE_FILE_BYTES);

    assert!(env.leftover_files().is_empty());

    let again = get(&env, &format!("/download-file/{}", name)).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(again).await, "File not found.");
}

#[tokio::test]
async fn test_staged_file_without_title_uses_artifact_name() {
    let env = TestEnv::new(FakeYtDlp::default());
    let name = stage_artifact(&env);

    let response = get(&env, &format!("/download-file/{}", name)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(disposition(&response), format!("attachment; filename=\"{}\"", name));
}

#[tokio::test]
async fn test_staged_title_is_resanitized() {
    let env = TestEnv::new(FakeYtDlp::default());
    let name = stage_artifact(&env);

    let response = get(&env, &format!("/download-file/{}?title=a%2F..%2Fb%22c", name)).await;
    assert_eq!(disposition(&response), "attachment; filename=\"a-..-b-c.mp4\"");
}

#[tokio::test]
async fn test_abandoned_transfer_still_deletes() {
    let env = TestEnv::new(FakeYtDlp::default());
    let name = stage_artifact(&env);

    let response = get(&env, &format!("/download-file/{}", name)).await;
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);

    assert!(env.leftover_files().is_empty());
}

#[tokio::test]
async fn test_unknown_and_foreign_names_are_not_found() {
    let env = TestEnv::new(FakeYtDlp::default());
    stage_artifact(&env);
    std::fs::write(env.root.path().join("secret.txt"), "secret").unwrap();

    for uri in [
        "/download-file/0123456789abcdef.mp4",
        "/download-file/..%2Fsecret.txt",
        "/download-file/fake-yt-dlp",
    ] {
        let response = get(&env, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body_text(response).await, "File not found.");
    }
    // The staged artifact was not touched
    assert_eq!(env.leftover_files().len(), 1);
}

#[tokio::test]
async fn test_staged_flow_end_to_end() {
    let env = TestEnv::new(FakeYtDlp::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    env.coordinator.request_download(
        ConnectionId::new(),
        DownloadRequest {
            video_url: "https://example.com/watch?v=abc".to_string(),
            quality: "1080".to_string(),
        },
        tx,
    );
    let Some(ServerEvent::Complete { filename, title }) = drain(&mut rx).await.pop() else {
        panic!("download did not complete");
    };

    let title = title.unwrap();
    let response = get(
        &env,
        &format!("/download-file/{}?title={}", filename, urlencoding::encode(&title)),
    )
    .await;
    assert_eq!(disposition(&response), "attachment; filename=\"My Video [1080p].mp4\"");
    assert_eq!(body_text(response).await, FAKE_FILE_BYTES);
    assert!(env.leftover_files().is_empty());
}

#[tokio::test]
async fn test_direct_stream() {
    let env = TestEnv::new(FakeYtDlp::default());

    let response = post_form(&env, "url=https%3A%2F%2Fexample.com%2Fwatch%3Fv%3Dabc&quality=720").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(disposition(&response), "attachment; filename=\"My Video [720p].mp4\"");
    assert_eq!(body_text(response).await, FAKE_STREAM_BYTES);

    // Nothing is staged on disk in this mode
    assert!(env.leftover_files().is_empty());
}

#[tokio::test]
async fn test_direct_stream_failure_truncates() {
    let env = TestEnv::new(FakeYtDlp::failing(1));

    // Status and headers are committed before yt-dlp exits, so the failure only ends the body
    let response = post_form(&env, "url=https%3A%2F%2Fexample.com%2Fwatch%3Fv%3Dabc&quality=720").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(disposition(&response), "attachment; filename=\"My Video [720p].mp4\"");
    assert_eq!(body_text(response).await, FAKE_STREAM_BYTES);
    assert!(env.leftover_files().is_empty());
}

/// True once the pid is gone or only a zombie is left.
#[cfg(target_os = "linux")]
fn process_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_direct_stream_client_abort_kills_process() {
    let env = TestEnv::new(FakeYtDlp::slow());

    let response = post_form(&env, "url=https%3A%2F%2Fexample.com%2Fwatch%3Fv%3Dabc&quality=720").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(&first[..], FAKE_STREAM_BYTES.as_bytes());

    let pid = env.stream_pid();
    assert!(!process_exited(pid), "yt-dlp should still be running mid-stream");

    // Client goes away mid-transfer
    drop(body);

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !process_exited(pid) {
        assert!(tokio::time::Instant::now() < deadline, "yt-dlp (pid {}) outlived the client", pid);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_direct_stream_rejects_invalid_url() {
    let env = TestEnv::new(FakeYtDlp::default());

    let response = post_form(&env, "url=not+a+url&quality=720").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains(messages::INVALID_URL));

    let response = post_form(&env, "quality=720").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_stream_title_failure() {
    let env = TestEnv::new(FakeYtDlp {
        title: TitleBehavior::Fail,
        ..FakeYtDlp::default()
    });

    let response = post_form(&env, "url=https%3A%2F%2Fexample.com%2Fv&quality=360").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains(messages::INFO_FAILED));
}

#[tokio::test]
async fn test_direct_stream_missing_binary() {
    let root = tempfile::tempdir().unwrap();
    let env = TestEnv::with_bin(root, "/nonexistent/yt-dlp");

    let response = post_form(&env, "url=https%3A%2F%2Fexample.com%2Fv&quality=360").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains(messages::SPAWN_FAILED_CHECK_PATH));
}
