//! In-process fake of the Discord REST API used by the unit tests.
//!
//! Every request is recorded. Command endpoints keep real state (ids start at
//! 77), interaction endpoints answer like Discord does, and scripted
//! responses can be queued to simulate 429s or errors.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::http::DiscordHttp;
use crate::interaction::HttpInteractionApi;
use crate::registry::{HttpCommandRegistry, RegisteredCommand};

pub const MOCK_APP_ID: u64 = 436835675304755200;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

enum Scripted {
    Json(StatusCode, Value),
    HeaderRateLimit(String),
}

#[derive(Clone)]
struct StoredCommand {
    guild_id: Option<u64>,
    id: u64,
    name: String,
    description: String,
}

struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    scripted: Mutex<VecDeque<(Option<Method>, Scripted)>>,
    commands: Mutex<Vec<StoredCommand>>,
    next_command_id: AtomicU64,
    next_message_id: AtomicU64,
}

pub struct MockDiscord {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockDiscord {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            requests: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            next_command_id: AtomicU64::new(77),
            next_message_id: AtomicU64::new(900),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
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

    pub fn http(&self) -> DiscordHttp {
        DiscordHttp::new("test-token", &self.base_url, Duration::from_secs(5)).unwrap()
    }

    pub fn registry(&self) -> HttpCommandRegistry {
        HttpCommandRegistry::new(self.http(), MOCK_APP_ID)
    }

    pub fn interactions(&self) -> HttpInteractionApi {
        HttpInteractionApi::new(self.http(), MOCK_APP_ID)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .count()
    }

    /// Next request (optionally only of `method`) gets this answer instead of the default.
    pub fn push_response_for(&self, method: Method, status: StatusCode, body: Value) {
        self.state
            .scripted
            .lock()
            .unwrap()
            .push_back((Some(method), Scripted::Json(status, body)));
    }

    pub fn push_response(&self, status: StatusCode, body: Value) {
        self.state
            .scripted
            .lock()
            .unwrap()
            .push_back((None, Scripted::Json(status, body)));
    }

    pub fn push_rate_limit(&self, method: Option<Method>, retry_after: f64) {
        let body = json!({
            "message": "You are being rate limited.",
            "retry_after": retry_after,
            "global": false,
        });
        self.state
            .scripted
            .lock()
            .unwrap()
            .push_back((method, Scripted::Json(StatusCode::TOO_MANY_REQUESTS, body)));
    }

    /// 429 with only a `Retry-After` header and an empty body.
    pub fn push_raw_rate_limit(&self, retry_after: &str) {
        self.state
            .scripted
            .lock()
            .unwrap()
            .push_back((None, Scripted::HeaderRateLimit(retry_after.to_string())));
    }

    pub fn seed_command(&self, guild_id: Option<u64>, id: u64, name: &str) {
        self.state.commands.lock().unwrap().push(StoredCommand {
            guild_id,
            id,
            name: name.to_string(),
            description: "seeded".to_string(),
        });
    }

    pub fn commands(&self, guild_id: Option<u64>) -> Vec<RegisteredCommand> {
        self.state
            .commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.guild_id == guild_id)
            .map(|c| RegisteredCommand {
                id: c.id,
                name: c.name.clone(),
                guild_id: c.guild_id,
                description: c.description.clone(),
            })
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        body: String::from_utf8_lossy(&body).to_string(),
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
    });

    let scripted = {
        let mut queue = state.scripted.lock().unwrap();
        let position = queue
            .iter()
            .position(|(m, _)| m.as_ref().map_or(true, |m| *m == method));
        position.and_then(|i| queue.remove(i))
    };
    if let Some((_, scripted)) = scripted {
        return match scripted {
            Scripted::Json(status, body) => (status, Json(body)).into_response(),
            Scripted::HeaderRateLimit(secs) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs)],
                "",
            )
                .into_response(),
        };
    }

    route(&state, &method, uri.path(), &body)
}

fn route(state: &MockState, method: &Method, path: &str, body: &[u8]) -> Response {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        ["applications", _, "commands"] => commands_collection(state, method, None, body),
        ["applications", _, "guilds", guild, "commands"] => {
            commands_collection(state, method, guild.parse().ok(), body)
        }
        ["applications", _, "commands", id] => command_item(state, method, None, id),
        ["applications", _, "guilds", guild, "commands", id] => {
            command_item(state, method, guild.parse().ok(), id)
        }
        ["interactions", _, _, "callback"] if method == Method::POST => {
            StatusCode::NO_CONTENT.into_response()
        }
        ["webhooks", _, _] if method == Method::POST => {
            let id = state.next_message_id.fetch_add(1, Ordering::SeqCst);
            (StatusCode::OK, Json(json!({"id": id.to_string()}))).into_response()
        }
        ["webhooks", _, _, "messages", message] if method == Method::PATCH => {
            let id = if *message == "@original" { "800" } else { *message };
            (StatusCode::OK, Json(json!({"id": id}))).into_response()
        }
        ["webhooks", _, _, "messages", _] if method == Method::DELETE => {
            StatusCode::NO_CONTENT.into_response()
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "404: Not Found"}))).into_response(),
    }
}

fn command_json(c: &StoredCommand) -> Value {
    let mut value = json!({
        "id": c.id.to_string(),
        "application_id": MOCK_APP_ID.to_string(),
        "name": c.name,
        "description": c.description,
    });
    if let Some(guild_id) = c.guild_id {
        value["guild_id"] = json!(guild_id.to_string());
    }
    value
}

fn parse_definition(state: &MockState, guild_id: Option<u64>, value: &Value) -> StoredCommand {
    StoredCommand {
        guild_id,
        id: state.next_command_id.fetch_add(1, Ordering::SeqCst),
        name: value["name"].as_str().unwrap_or_default().to_string(),
        description: value["description"].as_str().unwrap_or_default().to_string(),
    }
}

fn commands_collection(
    state: &MockState,
    method: &Method,
    guild_id: Option<u64>,
    body: &[u8],
) -> Response {
    let mut commands = state.commands.lock().unwrap();
    match *method {
        Method::GET => {
            let list: Vec<Value> = commands
                .iter()
                .filter(|c| c.guild_id == guild_id)
                .map(command_json)
                .collect();
            (StatusCode::OK, Json(Value::Array(list))).into_response()
        }
        Method::POST => {
            let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
            let command = parse_definition(state, guild_id, &value);
            let json = command_json(&command);
            commands.push(command);
            (StatusCode::CREATED, Json(json)).into_response()
        }
        Method::PUT => {
            let values: Vec<Value> = serde_json::from_slice(body).unwrap_or_default();
            commands.retain(|c| c.guild_id != guild_id);
            let created: Vec<StoredCommand> = values
                .iter()
                .map(|v| parse_definition(state, guild_id, v))
                .collect();
            let json: Vec<Value> = created.iter().map(command_json).collect();
            commands.extend(created);
            (StatusCode::OK, Json(Value::Array(json))).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn command_item(state: &MockState, method: &Method, guild_id: Option<u64>, id: &str) -> Response {
    let id: u64 = id.parse().unwrap_or_default();
    let mut commands = state.commands.lock().unwrap();
    let position = commands
        .iter()
        .position(|c| c.id == id && c.guild_id == guild_id);
    match (method, position) {
        (&Method::DELETE, Some(i)) => {
            commands.remove(i);
            StatusCode::NO_CONTENT.into_response()
        }
        (&Method::GET, Some(i)) => (StatusCode::OK, Json(command_json(&commands[i]))).into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"code": 10063, "message": "Unknown application command"})),
        )
            .into_response(),
    }
}
