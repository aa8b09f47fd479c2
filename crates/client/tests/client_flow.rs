//! End-to-end client behavior against a mock server

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tillgrid_client::{
    ApiError, AuthEvent, Client, ClientConfig, MemoryTokenStore, ResponseEnvelope,
    ResponseInterceptor, TokenProvider, UploadPart, UploadRequest,
};
use tillgrid_common::RetryStrategy;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn envelope(data: Value) -> Value {
    json!({
        "status": "success",
        "data": data,
        "timestamp": "2026-08-06T12:00:00Z"
    })
}

fn fast_retry() -> RetryStrategy {
    RetryStrategy::new()
        .with_max_retries(2)
        .with_base_delay(Duration::from_millis(5))
        .unwrap()
}

fn client_for(server: &MockServer, tokens: Arc<MemoryTokenStore>) -> Client {
    let config =
        ClientConfig { base_url: server.uri(), retry: fast_retry(), ..Default::default() };
    Client::new(config, tokens).unwrap()
}

#[tokio::test]
async fn get_returns_envelope_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([{"id": 1}]))))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::with_token("test-token")));
    let result: Value = client.get("/products", &[]).await.unwrap();
    assert_eq!(result, json!([{"id": 1}]));
}

#[tokio::test]
async fn envelope_error_maps_to_request_failed_with_field_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "validation failed",
            "errors": [{"field": "price", "message": "must be positive"}],
            "timestamp": "2026-08-06T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, ApiError> = client.post("/products", &json!({"price": -1})).await;

    match result.unwrap_err() {
        ApiError::RequestFailed { message, errors } => {
            assert_eq!(message, "validation failed");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "price");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_evicts_token_and_notifies_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/protected"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::with_token("stale-token"));
    let client = client_for(&server, tokens.clone());
    let mut events = client.subscribe_auth_events();

    // two requests race into the same 401
    let (first, second) = tokio::join!(
        client.get::<Value>("/protected", &[]),
        client.get::<Value>("/protected", &[]),
    );
    assert!(matches!(first.unwrap_err(), ApiError::Unauthorized(_)));
    assert!(matches!(second.unwrap_err(), ApiError::Unauthorized(_)));

    // credential is gone and exactly one notification was emitted
    assert_eq!(tokens.token(), None);
    assert_eq!(events.recv().await.unwrap(), AuthEvent::Unauthorized);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn rate_limited_fails_without_retrying() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, ApiError> = client.get("/limited", &[]).await;

    assert!(matches!(result.unwrap_err(), ApiError::RateLimited(_)));
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn http_errors_are_terminal_and_never_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, ApiError> = client.get("/broken", &[]).await;

    match result.unwrap_err() {
        ApiError::RequestFailed { message, .. } => assert!(message.contains("HTTP 500")),
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ResponseInterceptor for Recorder {
    async fn intercept(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope, ApiError> {
        self.log.lock().push(self.name);
        Ok(envelope)
    }
}

#[tokio::test]
async fn response_interceptors_run_in_order_and_preserve_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": 1}))))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    client.add_response_interceptor(Arc::new(Recorder { name: "first", log: log.clone() }));
    client.add_response_interceptor(Arc::new(Recorder { name: "second", log: log.clone() }));

    let result: Value = client.get("/orders/1", &[]).await.unwrap();
    assert_eq!(result, json!({"id": 1}));
    assert_eq!(*log.lock(), vec!["first", "second"]);
}

#[tokio::test]
async fn non_envelope_body_is_a_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drifted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, ApiError> = client.get("/drifted", &[]).await;
    assert!(matches!(result.unwrap_err(), ApiError::MalformedEnvelope(_)));
}

#[tokio::test]
async fn non_json_success_body_is_a_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plaintext"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<Value, ApiError> = client.get("/plaintext", &[]).await;
    assert!(matches!(result.unwrap_err(), ApiError::MalformedEnvelope(_)));
}

#[tokio::test]
async fn delete_with_absent_data_deserializes_unit() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/products/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "deleted",
            "timestamp": "2026-08-06T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Result<(), ApiError> = client.delete("/products/9").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn warning_envelope_still_yields_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "warning",
            "message": "stock counts may be stale",
            "data": {"count": 12},
            "timestamp": "2026-08-06T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let result: Value = client.get("/inventory", &[]).await.unwrap();
    assert_eq!(result, json!({"count": 12}));
}

#[tokio::test]
async fn network_failure_surfaces_after_retries() {
    // bind then drop so connections are refused
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig {
        base_url: format!("http://{addr}"),
        retry: RetryStrategy::new()
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(5))
            .unwrap(),
        ..Default::default()
    };
    let client = Client::new(config, Arc::new(MemoryTokenStore::new())).unwrap();

    let result: Result<Value, ApiError> = client.get("/anything", &[]).await;
    assert!(matches!(result.unwrap_err(), ApiError::Network(_)));
}

#[tokio::test]
async fn upload_sends_multipart_with_credential_and_classifies_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/receipts/upload"))
        .and(header("Authorization", "Bearer upload-token"))
        .and(body_string_contains("front-of-house"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(json!({"url": "/assets/logo.png"}))),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::with_token("upload-token")));
    let upload = UploadRequest::new()
        .field("label", "front-of-house")
        .part(UploadPart::new("image", "logo.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]));

    let result: Value = client.upload("/receipts/upload", upload).await.unwrap();
    assert_eq!(result, json!({"url": "/assets/logo.png"}));
}

#[tokio::test]
async fn upload_failure_uses_the_same_error_taxonomy() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/receipts/upload"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));
    let upload = UploadRequest::new().field("label", "x");
    let result: Result<Value, ApiError> = client.upload("/receipts/upload", upload).await;

    assert!(matches!(result.unwrap_err(), ApiError::RateLimited(_)));
}
