//! Tests for the health reporter and HTTP endpoints

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{serve, Metrics, Reporter, Status};

fn new_reporter(status: Status) -> Reporter {
    Reporter::new(status, Arc::new(Metrics::new().unwrap()))
}

#[test]
fn test_status_machine() {
    let reporter = new_reporter(Status::Starting);
    assert_eq!(reporter.status(), Status::Starting);

    reporter.set_status(Status::Ready);
    assert_eq!(reporter.status(), Status::Ready);

    reporter.set_status(Status::Error);
    assert_eq!(reporter.status(), Status::Error);
}

#[test]
fn test_counters_render_in_text_format() {
    let reporter = new_reporter(Status::Ready);

    reporter.record_enriched();
    reporter.record_enriched();
    reporter.record_discarded("loki_batch_dropped");
    reporter
        .metrics()
        .nf_count
        .with_label_values(&["10.0.0.5", "9"])
        .inc();

    let text = reporter.metrics().gather_text().unwrap();
    assert!(text.contains("reader_record_enriched 2"));
    assert!(text.contains("reader_record_discarded{error=\"loki_batch_dropped\"} 1"));
    assert!(text.contains("flow_process_nf_count{router=\"10.0.0.5\",version=\"9\"} 1"));
}

#[test]
fn test_fresh_registries_are_independent() {
    let a = new_reporter(Status::Ready);
    let b = new_reporter(Status::Ready);

    a.record_enriched();

    assert!(a.metrics().gather_text().unwrap().contains("reader_record_enriched 1"));
    assert!(b.metrics().gather_text().unwrap().contains("reader_record_enriched 0"));
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("[::]:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn get(port: u16, path: &str) -> (u16, String) {
    let resp = reqwest::get(format!("http://localhost:{port}{path}"))
        .await
        .unwrap();
    let code = resp.status().as_u16();
    (code, resp.text().await.unwrap())
}

#[tokio::test]
async fn test_http_endpoints() {
    let reporter = Arc::new(new_reporter(Status::Starting));
    let cancel = CancellationToken::new();
    let port = free_port();

    let server = tokio::spawn(serve(port, Arc::clone(&reporter), cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // starting: live but not ready
    let (code, body) = get(port, "/health/live").await;
    assert_eq!(code, 200);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["status"], "UP");
    assert_eq!(report["checks"][0]["name"], "flows");
    assert!(report["checks"][0]["data"]["host"].is_string());

    let (code, body) = get(port, "/health/ready").await;
    assert_eq!(code, 503);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["status"], "DOWN");

    // `/health` is an alias for readiness
    let (code, _) = get(port, "/health").await;
    assert_eq!(code, 503);

    // ready: both up
    reporter.set_status(Status::Ready);
    let (code, _) = get(port, "/health/ready").await;
    assert_eq!(code, 200);

    // error: neither
    reporter.set_status(Status::Error);
    let (code, _) = get(port, "/health/live").await;
    assert_eq!(code, 503);
    let (code, _) = get(port, "/health/ready").await;
    assert_eq!(code, 503);

    // metrics endpoint serves the text format
    reporter.record_enriched();
    let (code, body) = get(port, "/metrics").await;
    assert_eq!(code, 200);
    assert!(body.contains("reader_record_enriched 1"));

    cancel.cancel();
    let _ = server.await;
}
