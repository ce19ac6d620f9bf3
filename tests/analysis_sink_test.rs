//! Integration tests for the analysis sink using wiremock
//!
//! Only timeouts are retried; every other failure ends the delivery.

use nodewatch::notifications::{AnalysisConfig, AnalysisSink, NotificationSink, SinkError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink_for(server: &MockServer) -> AnalysisSink {
    let config = AnalysisConfig::new(server.uri())
        .with_timeout(1)
        .with_retry_delay_ms(10);
    AnalysisSink::new(config).unwrap()
}

#[tokio::test]
async fn test_delivers_payload_to_analyze_endpoint() {
    let server = MockServer::start().await;
    let payload = json!({
        "metric": { "instance": "10.0.2.131:9100" },
        "metric_name": "disk_write_bytes",
        "severity": "WARNING",
        "anomaly_detected": true
    });

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(header("content-type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;

    let status = sink_for(&server).deliver(&payload).await.unwrap();
    assert_eq!(status.channel, "analysis");
    assert_eq!(status.attempts, 1);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(500).set_body_string("analysis backend down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = sink_for(&server).deliver(&json!({})).await.unwrap_err();
    match err {
        SinkError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "analysis backend down");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;

    let err = sink_for(&server).deliver(&json!({})).await.unwrap_err();
    assert_eq!(err.reason(), "status");
}

#[tokio::test]
async fn test_timeout_is_retried_twice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(3)
        .mount(&server)
        .await;

    let err = sink_for(&server).deliver(&json!({})).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn test_timeout_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let status = sink_for(&server).deliver(&json!({})).await.unwrap();
    assert_eq!(status.attempts, 2);
}

#[tokio::test]
async fn test_connection_refused_fails_fast() {
    let config = AnalysisConfig::new("http://127.0.0.1:1")
        .with_timeout(5)
        .with_retry_delay_ms(10);
    let sink = AnalysisSink::new(config).unwrap();

    let err = sink.deliver(&json!({})).await.unwrap_err();
    assert!(matches!(err, SinkError::Connect(_)), "got {err:?}");
    assert_eq!(err.reason(), "connect");
}
