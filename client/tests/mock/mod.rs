//! In-process mock of the backend, identity provider and geocoder.
//!
//! Responses are canned per `METHOD path`; every request is recorded so
//! tests can assert on exactly what went over the wire.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Json;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use moodwalk_client::api::ApiClient;
use moodwalk_client::auth::AuthSession;
use moodwalk_client::firebase::{FirebaseEndpoints, FirebaseIdentity};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, (u16, Value)>,
    /// One-shot answers that wait for their gate before responding.
    held: HashMap<String, (Arc<Notify>, u16, Value)>,
    requests: Vec<Recorded>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `status` and a JSON `body`.
    pub fn on(&self, method: &str, path: &str, status: u16, body: Value) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .routes
            .insert(format!("{method} {path}"), (status, body));
        self
    }

    /// The next `method path` request waits until the returned gate is
    /// notified, then answers with `status` and `body`.  Later requests get
    /// the regular route.
    pub fn hold_next(&self, method: &str, path: &str, status: u16, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .lock()
            .unwrap()
            .held
            .insert(format!("{method} {path}"), (gate.clone(), status, body));
        gate
    }

    /// Wait until `count` requests to `method path` have arrived.
    pub async fn wait_for_requests(&self, method: &str, path: &str, count: usize) {
        while self.requests_to(method, path).len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Bind to an ephemeral port and return the base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new().fallback(handle).with_state(self.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Identity-provider routes answering for `uid-1`.
    pub fn with_identity(&self) -> &Self {
        let session = json!({
            "localId": "uid-1",
            "email": "walker@example.com",
            "displayName": "",
            "idToken": "signin-token",
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        });
        self.on("POST", "/v1/accounts:signInWithPassword", 200, session.clone());
        self.on("POST", "/v1/accounts:signUp", 200, session);
        self.on(
            "POST",
            "/v1/token",
            200,
            json!({
                "id_token": "fresh-token",
                "refresh_token": "refresh-2",
                "expires_in": "3600",
                "user_id": "uid-1"
            }),
        )
    }

    pub fn with_geocoder(&self) -> &Self {
        self.on(
            "GET",
            "/v2/local/geo/coord2address.json",
            200,
            json!({
                "meta": {"total_count": 1},
                "documents": [{
                    "road_address": {
                        "address_name": "서울 성북구 삼선교로 16",
                        "region_1depth_name": "서울특별시",
                        "region_2depth_name": "성북구",
                        "region_3depth_name": "삼선동",
                        "building_name": "한성대학교"
                    },
                    "address": {
                        "address_name": "서울 성북구 삼선동2가 389",
                        "region_1depth_name": "서울",
                        "region_2depth_name": "성북구",
                        "region_3depth_name": "삼선동2가"
                    }
                }]
            }),
        )
    }
}

async fn handle(
    State(mock): State<MockBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    let recorded = Recorded {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };

    let key = format!("{method} {path}");
    let (held, answer) = {
        let mut state = mock.inner.lock().unwrap();
        state.requests.push(recorded);
        match state.held.remove(&key) {
            Some((gate, status, body)) => (Some(gate), Some((status, body))),
            None => (None, state.routes.get(&key).cloned()),
        }
    };
    if let Some(gate) = held {
        gate.notified().await;
    }
    match answer {
        Some((status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))),
    }
}

pub fn api(base: &str) -> ApiClient {
    ApiClient::with_base_url(base, Duration::from_secs(5), Duration::from_secs(5)).unwrap()
}

pub fn identity(base: &str) -> Arc<FirebaseIdentity> {
    let endpoints = FirebaseEndpoints {
        identity_toolkit: base.to_string(),
        secure_token: base.to_string(),
    };
    Arc::new(FirebaseIdentity::with_endpoints("test-key", endpoints).unwrap())
}

/// A session signed in as `uid-1` through the mock identity routes.
pub async fn signed_in_session(base: &str) -> Arc<AuthSession> {
    let session = AuthSession::start(
        identity(base),
        Duration::from_secs(3600),
        Duration::from_millis(10),
    );
    session.login("walker@example.com", "secret1").await.unwrap();
    session
}

pub fn analysis_body() -> Value {
    json!({
        "analysis": {
            "emotion": "기쁨",
            "emotions": ["기쁨", "설렘"],
            "keywords": ["산책", "햇살"],
            "comfort_message": "좋은 하루네요!",
            "recommendations": [
                {"title": "봄날", "artist": "BTS", "reason": "밝은 분위기"}
            ]
        },
        "trail": {
            "trails": [{
                "name": "장이소공원",
                "address": "서울 성북구",
                "score": 9.1,
                "route": {"type": "LineString", "coordinates": [[127.0, 37.5], [127.01, 37.51]]}
            }],
            "more": [],
            "positive_emotions_used": ["기쁨"]
        }
    })
}
