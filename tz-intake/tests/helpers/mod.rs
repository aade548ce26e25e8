//! Test Helper Utilities
//!
//! In-process fake of the TicketZen intake API built on axum. Replies are
//! queued per endpoint; an empty queue falls back to a success reply
//! (`{"ok": true}`, or `{"state": "analyzing"}` for status).

#![allow(dead_code)]

use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tz_intake::models::SessionToken;
use tz_intake::IntakeClient;

pub const TOKEN: &str = "042917";

const OK_ACK: &str = r#"{"ok": true}"#;
const ANALYZING: &str = r#"{"ok": true, "state": "analyzing"}"#;

pub const NETTO_DONE: &str = r#"{
    "ok": true,
    "state": "done",
    "progress": 100,
    "result": {
        "merchant": "Netto",
        "date": "2024-05-01",
        "total": 9.42,
        "category": "supermarché",
        "lignes": [{"label": "Baguette", "prix": 1.1}]
    }
}"#;

pub fn processing() -> (StatusCode, String) {
    json_reply(r#"{"ok": true, "state": "processing", "progress": 50}"#)
}

pub fn json_reply(body: &str) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

/// Upload received by the fake server
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub token: String,
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct FakeIntakeServer {
    upload_replies: Mutex<VecDeque<(StatusCode, String)>>,
    analyze_replies: Mutex<VecDeque<(StatusCode, String)>>,
    status_replies: Mutex<VecDeque<(StatusCode, String)>>,
    rotate_replies: Mutex<VecDeque<(StatusCode, String)>>,
    uploads: Mutex<Vec<ReceivedUpload>>,
    rotations: Mutex<Vec<Value>>,
    status_tokens: Mutex<Vec<String>>,
    analyze_calls: AtomicUsize,
}

impl FakeIntakeServer {
    pub fn queue_upload(&self, status: StatusCode, body: &str) {
        self.upload_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn queue_analyze(&self, status: StatusCode, body: &str) {
        self.analyze_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn queue_status(&self, status: StatusCode, body: &str) {
        self.status_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn queue_statuses(&self, replies: Vec<(StatusCode, String)>) {
        self.status_replies.lock().unwrap().extend(replies);
    }

    pub fn queue_rotate(&self, status: StatusCode, body: &str) {
        self.rotate_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn rotations(&self) -> Vec<Value> {
        self.rotations.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_tokens.lock().unwrap().len()
    }

    pub fn status_tokens(&self) -> Vec<String> {
        self.status_tokens.lock().unwrap().clone()
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }
}

/// Running fake server
pub struct TestServer {
    pub base_url: String,
    pub state: Arc<FakeIntakeServer>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(FakeIntakeServer::default());
        let app = Router::new()
            .route("/api/intake/rotate", post(rotate))
            .route("/api/intake/:token/upload", post(upload))
            .route("/api/intake/:token/analyze", post(analyze))
            .route("/api/intake/:token/status", get(status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self) -> IntakeClient {
        self.client_for(TOKEN)
    }

    pub fn client_for(&self, token: &str) -> IntakeClient {
        IntakeClient::new(
            &self.base_url,
            SessionToken::new(token).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap()
    }
}

/// Base URL nothing listens on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn next_reply(queue: &Mutex<VecDeque<(StatusCode, String)>>, fallback: &str) -> Response {
    let (status, body) = queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| (StatusCode::OK, fallback.to_string()));
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn upload(
    State(state): State<Arc<FakeIntakeServer>>,
    Path(token): Path<String>,
    mut multipart: Multipart,
) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap_or_default().to_vec();
        state.uploads.lock().unwrap().push(ReceivedUpload {
            token: token.clone(),
            field: name,
            file_name,
            bytes,
        });
    }
    next_reply(&state.upload_replies, OK_ACK)
}

async fn analyze(State(state): State<Arc<FakeIntakeServer>>, Path(_token): Path<String>) -> Response {
    state.analyze_calls.fetch_add(1, Ordering::SeqCst);
    next_reply(&state.analyze_replies, OK_ACK)
}

async fn status(State(state): State<Arc<FakeIntakeServer>>, Path(token): Path<String>) -> Response {
    state.status_tokens.lock().unwrap().push(token);
    next_reply(&state.status_replies, ANALYZING)
}

async fn rotate(State(state): State<Arc<FakeIntakeServer>>, Json(body): Json<Value>) -> Response {
    state.rotations.lock().unwrap().push(body);
    next_reply(&state.rotate_replies, OK_ACK)
}
