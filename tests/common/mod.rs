#![allow(dead_code)]

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::Router;
use nextgen_mcp::app::App;
use nextgen_mcp::services::config::Config;
use nextgen_mcp::services::credentials::CredentialField;
use nextgen_mcp::services::session::ConversationContext;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TOKEN_PATH: &str = "/oauth/token";
pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            delay: Duration::ZERO,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct MockState {
    routes: StdMutex<HashMap<String, Vec<MockReply>>>,
    requests: StdMutex<Vec<RecordedRequest>>,
    token_ttl: AtomicI64,
    token_status: AtomicUsize,
    session_header: StdMutex<Option<String>>,
    issued_tokens: AtomicUsize,
    issued_sessions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path)
}

fn api_path(endpoint: &str) -> String {
    format!("{}/{}", API_PREFIX, endpoint.trim_start_matches('/'))
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.as_str().to_string(),
        path: path.clone(),
        query,
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body,
    });

    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);
    let reply = reply_for(&state, method.as_str(), &path);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let mut builder = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(reply.body)).unwrap()
}

fn reply_for(state: &MockState, method: &str, path: &str) -> MockReply {
    if method == "POST" && path == TOKEN_PATH {
        let status = state.token_status.load(Ordering::SeqCst) as u16;
        if status != 200 {
            return MockReply::json(status, serde_json::json!({"error": "invalid_client"}));
        }
        let n = state.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
        return MockReply::json(
            200,
            serde_json::json!({
                "access_token": format!("tok-{}", n),
                "expires_in": state.token_ttl.load(Ordering::SeqCst),
            }),
        );
    }
    if method == "PUT" && path == api_path("users/me/login-defaults") {
        let n = state.issued_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let header = state
            .session_header
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("sid-{}", n));
        return MockReply::empty(200).with_header("x-ng-sessionid", &header);
    }

    let mut routes = state.routes.lock().unwrap();
    match routes.get_mut(&route_key(method, path)) {
        Some(queue) if queue.len() > 1 => queue.remove(0),
        Some(queue) if queue.len() == 1 => queue[0].clone(),
        _ => MockReply::json(404, serde_json::json!({"message": "no mock route"})),
    }
}

/// In-process stand-in for the NextGen API: token endpoint, login-defaults and
/// whatever routes a test registers under `/api`.
pub struct MockUpstream {
    pub base_url: String,
    pub auth_url: String,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        state.token_ttl.store(3600, Ordering::SeqCst);
        state.token_status.store(200, Ordering::SeqCst);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock address");
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock upstream");
        });

        Self {
            base_url: format!("http://{}{}", addr, API_PREFIX),
            auth_url: format!("http://{}{}", addr, TOKEN_PATH),
            state,
        }
    }

    /// Replies served in order for `method endpoint`; the last one repeats.
    pub fn replies(&self, method: &str, endpoint: &str, replies: Vec<MockReply>) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(route_key(method, &api_path(endpoint)), replies);
    }

    pub fn reply(&self, method: &str, endpoint: &str, reply: MockReply) {
        self.replies(method, endpoint, vec![reply]);
    }

    pub fn set_token_ttl(&self, seconds: i64) {
        self.state.token_ttl.store(seconds, Ordering::SeqCst);
    }

    pub fn fail_token_requests(&self, status: u16) {
        self.state.token_status.store(status as usize, Ordering::SeqCst);
    }

    pub fn set_session_header(&self, value: &str) {
        *self.state.session_header.lock().unwrap() = Some(value.to_string());
    }

    pub fn requests(&self, method: &str, endpoint: &str) -> Vec<RecordedRequest> {
        let path = api_path(endpoint);
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn hits(&self, method: &str, endpoint: &str) -> usize {
        self.requests(method, endpoint).len()
    }

    pub fn token_requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == "POST" && r.path == TOKEN_PATH)
            .cloned()
            .collect()
    }

    pub fn token_hits(&self) -> usize {
        self.token_requests().len()
    }

    pub fn session_hits(&self) -> usize {
        self.hits("PUT", "users/me/login-defaults")
    }

    /// Requests other than token and login-defaults.
    pub fn api_hits(&self) -> usize {
        let login = api_path("users/me/login-defaults");
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path != TOKEN_PATH && r.path != login)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Config {
        Config::default()
            .with_default(CredentialField::BaseUrl, self.base_url.as_str())
            .with_default(CredentialField::AuthUrl, self.auth_url.as_str())
            .with_default(CredentialField::ClientId, "client-1")
            .with_default(CredentialField::ClientSecret, "secret-1")
            .with_default(CredentialField::SiteId, "site-1")
            .with_default(CredentialField::EnterpriseId, "ent-1")
            .with_default(CredentialField::PracticeId, "practice-1")
            .with_default(CredentialField::LocationId, "loc-1")
    }

    pub fn app(&self) -> App {
        App::from_config(self.config()).expect("app wiring")
    }
}

pub fn context(app: &App, conversation: &str) -> ConversationContext {
    app.sessions.context(Some(conversation), HashMap::new())
}

pub async fn call(app: &App, ctx: &ConversationContext, tool: &str, args: Value) -> Value {
    app.tool_executor
        .execute(tool, ctx, args)
        .await
        .expect("tool call must reach the domain")
}
