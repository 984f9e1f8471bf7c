//! In-process fake of the media-relay control API.

#![allow(dead_code)]

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// "admin:secret"
pub const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

#[derive(Default)]
pub struct FakeRelayState {
    /// Runtime path details by name, in listing order
    pub paths: Mutex<BTreeMap<String, Value>>,
    pub configs: Mutex<HashMap<String, Value>>,
    pub requests: Mutex<Vec<String>>,
    pub require_auth: bool,
}

impl FakeRelayState {
    pub fn set_path(&self, name: &str, detail: Value) {
        self.paths.lock().unwrap().insert(name.to_string(), detail);
    }

    pub fn remove_runtime_path(&self, name: &str) {
        self.paths.lock().unwrap().remove(name);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// A ready path with one publisher
pub fn ready_path(name: &str, ready_time: &str) -> Value {
    json!({
        "name": name,
        "ready": true,
        "readyTime": ready_time,
        "source": { "type": "rtmpConn", "id": "conn-1" },
        "readers": [{ "type": "hlsMuxer" }],
    })
}

pub fn idle_path(name: &str) -> Value {
    json!({ "name": name, "ready": false, "source": null, "readers": [] })
}

pub struct FakeRelay {
    pub base_url: String,
    pub state: Arc<FakeRelayState>,
}

pub async fn spawn(require_auth: bool) -> FakeRelay {
    let state = Arc::new(FakeRelayState {
        require_auth,
        ..FakeRelayState::default()
    });

    let app = Router::new()
        .route("/v3/paths/list", get(list_paths))
        .route("/v3/paths/get/:name", get(get_path))
        .route("/v3/paths/delete/:name", delete(delete_path))
        .route("/v3/config/paths/list", get(list_configs))
        .route("/v3/config/paths/get/:name", get(get_config))
        .route("/v3/config/paths/add/:name", post(add_config))
        .route("/v3/config/paths/patch/:name", patch(patch_config))
        .route("/v3/config/paths/delete/:name", delete(delete_config))
        .layer(middleware::from_fn_with_state(state.clone(), record_and_authorize))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeRelay {
        base_url: format!("http://{addr}/v3"),
        state,
    }
}

async fn record_and_authorize(
    State(state): State<Arc<FakeRelayState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("{} {}", request.method(), request.uri().path()));

    if state.require_auth {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == BASIC_AUTH);
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(request).await
}

async fn list_paths(State(state): State<Arc<FakeRelayState>>) -> Json<Value> {
    let paths = state.paths.lock().unwrap();
    let items: Vec<Value> = paths
        .iter()
        .map(|(name, detail)| {
            json!({
                "name": name,
                "source": detail.get("source").cloned().unwrap_or(Value::Null),
                "readers": detail.get("readers").cloned().unwrap_or(json!([])),
            })
        })
        .collect();
    Json(json!({ "itemCount": items.len(), "items": items }))
}

async fn get_path(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .paths
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_path(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
) -> StatusCode {
    match state.paths.lock().unwrap().remove(&name) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn list_configs(State(state): State<Arc<FakeRelayState>>) -> Json<Value> {
    let configs = state.configs.lock().unwrap();
    let items: Vec<Value> = configs.values().cloned().collect();
    Json(json!({ "itemCount": items.len(), "items": items }))
}

async fn get_config(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .configs
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn add_config(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut configs = state.configs.lock().unwrap();
    if configs.contains_key(&name) {
        return StatusCode::BAD_REQUEST;
    }
    configs.insert(name, body);
    StatusCode::OK
}

async fn patch_config(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    match state.configs.lock().unwrap().get_mut(&name) {
        Some(existing) => {
            *existing = body;
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_config(
    State(state): State<Arc<FakeRelayState>>,
    Path(name): Path<String>,
) -> StatusCode {
    match state.configs.lock().unwrap().remove(&name) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}
