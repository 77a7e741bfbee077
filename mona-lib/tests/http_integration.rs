//! Integration tests for the HTTP gateway and event transport.
//!
//! ```bash
//! cargo test -p mona-lib --test http_integration
//! ```

#![cfg(feature = "http")]

use futures::StreamExt;
use mona_lib::gateway::{GatewayError, Headers, HttpPaymentGateway, PaymentGateway};
use mona_lib::stream::{EventTransport, HttpEventTransport, SseFrame};
use mona_lib::MonaError;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================================
// HttpPaymentGateway
// ============================================================================

#[tokio::test]
async fn test_gateway_posts_json_with_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/demo/checkout"))
        .and(header("X-Mona-Key-Id", "kid_1"))
        .and(header("Authorization", "Bearer at_1"))
        .and(body_json(json!({"method": "card", "transactionId": "T1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "transactionRef": "T1",
            "friendlyID": "F1"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = HttpPaymentGateway::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    gateway.set_default_header("Authorization", "Bearer at_1");

    let mut headers = Headers::new();
    headers.insert("X-Mona-Key-Id".into(), "kid_1".into());

    let response = gateway
        .post(
            "/demo/checkout",
            &headers,
            &json!({"method": "card", "transactionId": "T1"}),
        )
        .await
        .unwrap();

    assert_eq!(response["friendlyID"], "F1");
}

#[tokio::test]
async fn test_gateway_returns_task_carried_by_4xx() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/demo/checkout"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "task": {"taskType": "sign"}
        })))
        .mount(&mock_server)
        .await;

    let gateway = HttpPaymentGateway::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let response = gateway
        .post("/demo/checkout", &Headers::new(), &json!({}))
        .await
        .unwrap();

    assert_eq!(response["task"]["taskType"], "sign");
}

#[tokio::test]
async fn test_gateway_rejection_carries_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/demo/checkout"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Insufficient funds"})),
        )
        .mount(&mock_server)
        .await;

    let gateway = HttpPaymentGateway::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let err = gateway
        .post("/demo/checkout", &Headers::new(), &json!({}))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 400,
            message: "Insufficient funds".into()
        }
    );
    assert_eq!(err.user_message(), "Insufficient funds");
}

#[tokio::test]
async fn test_gateway_server_error_is_unexpected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&mock_server)
        .await;

    let gateway = HttpPaymentGateway::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let err = gateway
        .post("/login", &Headers::new(), &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Unexpected { status: 502, .. }));
    assert!(!err.is_rejected());
}

#[tokio::test]
async fn test_gateway_unreachable_is_transport() {
    let gateway = HttpPaymentGateway::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = gateway
        .post("/demo/checkout", &Headers::new(), &json!({}))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(MonaError::from(err).is_retryable());
}

// ============================================================================
// HttpEventTransport
// ============================================================================

#[tokio::test]
async fn test_transport_parses_event_stream() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":{\"event\":\"transaction_initiated\"}}\n",
        "\n",
        "event: keep-alive\n",
        "data: null\n",
        "\n",
        ": comment\n",
        "data: {\"event\":\"transaction_completed\"}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .and(path("/public/paymentUpdate/T1.json"))
        .and(header("Accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let transport = HttpEventTransport::new(Duration::from_secs(5)).unwrap();
    let url = format!("{}/public/paymentUpdate/T1.json", mock_server.uri());
    let frames: Vec<SseFrame> = transport
        .open(&url)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].event.as_deref(), Some("put"));
    assert!(frames[1].is_keep_alive());
    assert_eq!(frames[2].data, "{\"event\":\"transaction_completed\"}");
}

#[tokio::test]
async fn test_transport_rejects_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/public/close_tab.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let transport = HttpEventTransport::new(Duration::from_secs(5)).unwrap();
    let url = format!("{}/public/close_tab.json", mock_server.uri());
    let err = match transport.open(&url).await {
        Ok(_) => panic!("expected open to fail"),
        Err(e) => e,
    };

    assert!(matches!(err, MonaError::ConnectionFailed { .. }));
    assert!(err.to_string().contains("401"));
}
