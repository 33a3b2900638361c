//! Test utilities for spendwise-core
//!
//! A mock watsonx server implementing the identity token, text generation,
//! chat and speech recognize endpoints with scripted replies. Every request
//! is recorded so tests can assert on what was sent.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// API key the mock identity endpoint accepts
pub const MOCK_API_KEY: &str = "mock-api-key";

/// Bearer token the mock identity endpoint issues
pub const MOCK_ACCESS_TOKEN: &str = "mock-access-token";

/// Receipt payload returned by default from the inference endpoints
pub const MOCK_RECEIPT_JSON: &str = r#"{"items": [{"description": "Milk", "amount": 3.50, "category": "Groceries"}, {"description": "Bread", "amount": 2.50, "category": "Groceries"}], "discounts": [{"description": "Coupon", "amount": -1.00}], "tax": 0.50, "total": 5.50}"#;

/// Scripted reply for one endpoint
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful response carrying this model/transcript text
    Text(String),
    /// Error response with this status code and body
    Status(u16, String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn status(code: u16, body: impl Into<String>) -> Self {
        MockReply::Status(code, body.into())
    }
}

/// A request the mock server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

struct MockState {
    generation: Mutex<MockReply>,
    chat: Mutex<MockReply>,
    speech: Mutex<MockReply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock watsonx server for testing and development
pub struct MockWatsonxServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockWatsonxServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            generation: Mutex::new(MockReply::text(MOCK_RECEIPT_JSON)),
            chat: Mutex::new(MockReply::text(MOCK_RECEIPT_JSON)),
            speech: Mutex::new(MockReply::text("twelve dollars for lunch at the cafe")),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/identity/token", post(handle_token))
            .route("/ml/v1/text/generation", post(handle_generation))
            .route("/ml/v1/text/chat", post(handle_chat))
            .route("/v1/recognize", post(handle_recognize))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL for inference and speech endpoints
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Identity token endpoint URL
    pub fn iam_url(&self) -> String {
        format!("{}/identity/token", self.url())
    }

    pub fn set_generation(&self, reply: MockReply) {
        *self.state.generation.lock().unwrap() = reply;
    }

    pub fn set_chat(&self, reply: MockReply) {
        *self.state.chat.lock().unwrap() = reply;
    }

    pub fn set_speech(&self, reply: MockReply) {
        *self.state.speech.lock().unwrap() = reply;
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockWatsonxServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record(state: &MockState, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body: String::from_utf8_lossy(body).into_owned(),
    });
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", MOCK_ACCESS_TOKEN))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"errors": [{"code": "authentication_token_not_valid"}]})),
    )
        .into_response()
}

fn scripted(reply: MockReply, success: impl FnOnce(String) -> Value) -> Response {
    match reply {
        MockReply::Text(text) => Json(success(text)).into_response(),
        MockReply::Status(code, body) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
    }
}

/// Identity token exchange
async fn handle_token(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);

    let form = String::from_utf8_lossy(&body);
    let expected = format!("apikey={}", MOCK_API_KEY);
    if !form.split('&').any(|pair| pair == expected) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "errorCode": "BXNIM0415E",
                "errorMessage": "Provided API key could not be found."
            })),
        )
            .into_response();
    }

    Json(json!({
        "access_token": MOCK_ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

/// Text generation endpoint
async fn handle_generation(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    if !is_authorized(&headers) {
        return unauthorized();
    }

    let model = model_id(&body);
    let reply = state.generation.lock().unwrap().clone();
    scripted(reply, |text| {
        json!({
            "model_id": model,
            "results": [{"generated_text": text, "stop_reason": "eos_token"}]
        })
    })
}

/// Chat endpoint
async fn handle_chat(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    if !is_authorized(&headers) {
        return unauthorized();
    }

    let model = model_id(&body);
    let reply = state.chat.lock().unwrap().clone();
    scripted(reply, |text| {
        json!({
            "model_id": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        })
    })
}

/// Speech recognize endpoint; an empty transcript means silence
async fn handle_recognize(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &uri, &headers, &body);
    if !is_authorized(&headers) {
        return unauthorized();
    }

    let reply = state.speech.lock().unwrap().clone();
    scripted(reply, |text| {
        if text.is_empty() {
            json!({"results": [], "result_index": 0})
        } else {
            json!({
                "results": [{"alternatives": [{"transcript": text, "confidence": 0.93}], "final": true}],
                "result_index": 0
            })
        }
    })
}

fn model_id(body: &Bytes) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("model_id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}
