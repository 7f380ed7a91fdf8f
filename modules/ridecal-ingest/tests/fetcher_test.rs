//! Fetcher behaviour against a scripted local HTTP server.

use std::sync::atomic::AtomicBool;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ridecal_common::{Config, IngestError};
use ridecal_ingest::fetcher::{FetchRequest, Fetcher};

/// Serve each scripted raw HTTP response to one connection, in order.
async fn scripted_server(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            // Drain the request head before answering.
            let mut buf = [0u8; 4096];
            let mut seen = Vec::new();
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        seen.extend_from_slice(&buf[..n]);
                        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => return,
                }
            }
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}/")
}

fn response(status_line: &str, headers: &[&str], body: &str) -> String {
    let mut raw = format!("HTTP/1.1 {status_line}\r\n");
    for header in headers {
        raw.push_str(header);
        raw.push_str("\r\n");
    }
    raw.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    raw
}

fn fast_config() -> Config {
    Config {
        max_retries: 3,
        retry_delay: 0,
        request_timeout: 5,
        ..Config::default()
    }
}

#[tokio::test]
async fn rate_limit_then_ok_honours_retry_after() {
    let url = scripted_server(vec![
        response("429 Too Many Requests", &["Retry-After: 1"], "slow down"),
        response("200 OK", &[], "calendar body"),
    ])
    .await;

    let mut fetcher = Fetcher::new(&fast_config()).unwrap();
    let cancelled = AtomicBool::new(false);

    let started = std::time::Instant::now();
    let body = fetcher
        .fetch(&FetchRequest::get(&url), &cancelled)
        .await
        .unwrap();

    assert_eq!(body, "calendar body");
    assert_eq!(fetcher.counters.retries, 1);
    assert_eq!(fetcher.counters.errors, 0);
    assert_eq!(fetcher.counters.requests, 2);
    assert!(
        started.elapsed() >= std::time::Duration::from_secs(1),
        "should have waited the Retry-After interval"
    );
}

#[tokio::test]
async fn server_error_then_ok_retries() {
    let url = scripted_server(vec![
        response("500 Internal Server Error", &[], "oops"),
        response("200 OK", &[], "recovered"),
    ])
    .await;

    let mut fetcher = Fetcher::new(&fast_config()).unwrap();
    let body = fetcher
        .fetch(&FetchRequest::get(&url), &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(body, "recovered");
    assert_eq!(fetcher.counters.retries, 1);
    assert_eq!(fetcher.counters.errors, 0);
}

#[tokio::test]
async fn client_error_fails_without_retry() {
    let url = scripted_server(vec![response("404 Not Found", &[], "missing")]).await;

    let mut fetcher = Fetcher::new(&fast_config()).unwrap();
    let err = fetcher
        .fetch(&FetchRequest::get(&url), &AtomicBool::new(false))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Network(_)));
    assert_eq!(fetcher.counters.requests, 1);
    assert_eq!(fetcher.counters.retries, 0);
    assert_eq!(fetcher.counters.errors, 1);
}

#[tokio::test]
async fn retry_budget_exhaustion_is_a_network_error() {
    let busy = response("503 Service Unavailable", &[], "busy");
    let url = scripted_server(vec![busy.clone(), busy.clone(), busy]).await;

    let config = Config {
        max_retries: 2,
        retry_delay: 0,
        request_timeout: 5,
        ..Config::default()
    };
    let mut fetcher = Fetcher::new(&config).unwrap();
    let err = fetcher
        .fetch(&FetchRequest::get(&url), &AtomicBool::new(false))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Network(_)));
    assert_eq!(fetcher.counters.retries, 2);
    assert_eq!(fetcher.counters.requests, 3);
    assert_eq!(fetcher.counters.errors, 1);
}

#[tokio::test]
async fn cancellation_short_circuits() {
    let url = scripted_server(vec![response("200 OK", &[], "never read")]).await;

    let mut fetcher = Fetcher::new(&fast_config()).unwrap();
    let cancelled = AtomicBool::new(true);
    let err = fetcher
        .fetch(&FetchRequest::get(&url), &cancelled)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(fetcher.counters.requests, 0);
}
