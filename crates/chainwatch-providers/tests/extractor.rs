//! `SolanaTxExtractor` retry behaviour against a local JSON-RPC responder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use chainwatch_core::config::ExtractorConfig;
use chainwatch_core::{EntityExtractor, ExtractError};
use chainwatch_providers::SolanaTxExtractor;

/// Answer every request with `body` and count the requests served.
async fn rpc_node(body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let served = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&served);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                serve_one(socket, body, &counter).await;
            });
        }
    });

    (url, served)
}

/// Read one request, count it if it is a `getTransaction` call, then reply.
async fn serve_one(mut socket: TcpStream, reply: &str, served: &AtomicUsize) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let request_body = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
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

    let method = serde_json::from_str::<Value>(&request_body)
        .ok()
        .and_then(|v| v["method"].as_str().map(str::to_owned));
    if method.as_deref() == Some("getTransaction") {
        served.fetch_add(1, Ordering::SeqCst);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
        reply.len()
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
}

fn config(max_attempts: u32) -> ExtractorConfig {
    ExtractorConfig {
        max_attempts,
        retry_base_ms: 1,
        retry_cap_ms: 5,
        request_timeout_ms: 2_000,
        ..ExtractorConfig::default()
    }
}

#[tokio::test]
async fn null_result_is_retried_then_not_found() {
    let (url, served) = rpc_node(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).await;
    let extractor = SolanaTxExtractor::new(url, &config(3)).unwrap();

    assert_eq!(extractor.resolve("sig").await, Err(ExtractError::NotFound));
    assert_eq!(served.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn invalid_params_is_not_retried() {
    let (url, served) = rpc_node(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param: WrongSize"}}"#,
    )
    .await;
    let extractor = SolanaTxExtractor::new(url, &config(5)).unwrap();

    match extractor.resolve("bad").await {
        Err(ExtractError::Transient(reason)) => assert!(reason.contains("WrongSize"), "{reason}"),
        other => panic!("expected transient error, got {other:?}"),
    }
    assert_eq!(served.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolved_transaction_yields_mints() {
    let (url, served) = rpc_node(
        r#"{"jsonrpc":"2.0","id":1,"result":{"meta":{
            "preTokenBalances":[{"accountIndex":1,"mint":"So11111111111111111111111111111111111111112"}],
            "postTokenBalances":[{"accountIndex":2,"mint":"NewMint111"}]
        }}}"#,
    )
    .await;
    let extractor = SolanaTxExtractor::new(url, &config(3)).unwrap();

    assert_eq!(
        extractor.resolve("sig").await.unwrap(),
        vec!["So11111111111111111111111111111111111111112", "NewMint111"]
    );
    assert_eq!(served.load(Ordering::SeqCst), 1);
}
