//! `WebhookSink` against a one-shot local HTTP responder.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use chainwatch_core::{DeliveryOutcome, SinkAdapter};
use chainwatch_providers::{WebhookSink, MAX_RETRY_AFTER};

/// Accept one request, answer with `status` / `headers` / `body`, and return
/// the request body.
async fn respond_once(status: &'static str, headers: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/hook", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let request_body = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(split) = text.find("\r\n\r\n") else { continue };
            let length = text[..split]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            let body = &text[split + 4..];
            if body.len() >= length {
                break body.to_string();
            }
        };

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n{headers}\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request_body
    });

    (url, task)
}

#[tokio::test]
async fn success_posts_content_field() {
    let (url, server) = respond_once("204 No Content", "", "").await;
    let sink = WebhookSink::new("discord", url).unwrap();

    assert!(sink.deliver("📄 New Ca: **M**").await.is_delivered());

    let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(sent["content"], "📄 New Ca: **M**");
    assert_eq!(sink.name(), "discord");
}

#[tokio::test]
async fn too_many_requests_reports_retry_after() {
    let (url, _server) = respond_once(
        "429 Too Many Requests",
        "retry-after: 3\r\ncontent-type: application/json\r\n",
        r#"{"message":"You are being rate limited.","retry_after":9.0}"#,
    )
    .await;
    let sink = WebhookSink::new("discord", url).unwrap();

    assert_eq!(
        sink.deliver("hello").await,
        DeliveryOutcome::RateLimited { retry_after: Duration::from_secs(3) }
    );
}

#[tokio::test]
async fn absurd_retry_after_is_clamped() {
    let (url, _server) = respond_once(
        "429 Too Many Requests",
        "retry-after: 1e20\r\ncontent-type: application/json\r\n",
        r#"{"retry_after":1e20}"#,
    )
    .await;
    let sink = WebhookSink::new("discord", url).unwrap();

    let outcome = sink.deliver("hello").await;
    assert!(!outcome.is_delivered());
    assert_eq!(outcome, DeliveryOutcome::RateLimited { retry_after: MAX_RETRY_AFTER });
}

#[tokio::test]
async fn server_error_is_a_failure_with_status() {
    let (url, _server) = respond_once("500 Internal Server Error", "", "boom").await;
    let sink = WebhookSink::new("discord", url).unwrap();

    match sink.deliver("hello").await {
        DeliveryOutcome::Failed { reason } => {
            assert!(reason.contains("500"), "{reason}");
            assert!(reason.contains("boom"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
