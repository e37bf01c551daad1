//! HTTP front door: login/logout/whoami, session cookies, static files
//! and the WebSocket upgrade.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{
    Json, Router,
    extract::{Form, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use banter_hub::ConnId;
use banter_proto::{UserDirectory, UserEntry, UserRegistry};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use crate::{
    ChatService,
    config::{ServerConfig, StaticRoute},
    session::{Session, SessionRegistry},
};

struct StateInner {
    service: Arc<ChatService>,
    sessions: SessionRegistry,
    users: UserDirectory,
    cookie_name: String,
    cookie_ttl_secs: u64,
    static_routes: Vec<StaticRoute>,
    /// Source of hub-unique connection ids; never reused while running.
    last_conn_id: AtomicU64,
}

/// Shared server state behind every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

impl AppState {
    /// Assemble the state from its collaborators.
    pub fn new(
        config: &ServerConfig,
        service: Arc<ChatService>,
        sessions: SessionRegistry,
        users: UserDirectory,
    ) -> Self {
        Self {
            inner: Arc::new(StateInner {
                service,
                sessions,
                users,
                cookie_name: config.session.name.clone(),
                cookie_ttl_secs: config.session.ttl_secs,
                static_routes: config.static_routes.clone(),
                last_conn_id: AtomicU64::new(0),
            }),
        }
    }

    /// The protocol stack this server fronts.
    pub fn service(&self) -> &ChatService {
        &self.inner.service
    }

    pub(crate) fn next_conn_id(&self) -> ConnId {
        self.inner.last_conn_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn session_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}",
            self.inner.cookie_name, session_id, self.inner.cookie_ttl_secs
        )
    }

    fn clear_cookie(&self) -> String {
        format!("{}=; Path=/; Max-Age=0", self.inner.cookie_name)
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/whoami", get(whoami))
        .route("/ws", get(ws_upgrade));

    for route in &state.inner.static_routes {
        router = router.nest_service(route.url_path.as_str(), ServeDir::new(&route.fs_path));
    }

    router.with_state(state)
}

/// Outcome of resolving the session cookie on a request.
struct Auth {
    session: Option<Session>,
    user: Option<UserEntry>,
    /// `Set-Cookie` values to apply to the response (refresh or clear).
    cookies: Vec<String>,
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Resolve the request's session: touch and refresh a live one, clear a
/// stale cookie, drop sessions of users that no longer exist.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Auth {
    let Some(session_id) = cookie_value(headers, &state.inner.cookie_name) else {
        return Auth { session: None, user: None, cookies: Vec::new() };
    };

    let Some(session) = state.inner.sessions.session(&session_id) else {
        return Auth { session: None, user: None, cookies: vec![state.clear_cookie()] };
    };

    state.inner.sessions.touch(&session_id);

    let Some(user) = state.inner.users.user(session.user_id) else {
        state.inner.sessions.delete(&session_id);
        return Auth { session: None, user: None, cookies: vec![state.clear_cookie()] };
    };

    let refresh = state.session_cookie(&session.id);
    Auth { session: Some(session), user: Some(user), cookies: vec![refresh] }
}

fn json_with_cookies(cookies: Vec<String>, body: Value) -> Response {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
    (headers, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    name: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = authenticate(&state, &headers);
    if let Some(user) = auth.user {
        // Already logged in; a second login is rejected, not re-issued.
        return json_with_cookies(auth.cookies, json!({"success": false, "user": user}));
    }

    let name = form.name.trim();
    if name.is_empty() {
        return json_with_cookies(auth.cookies, json!({"success": false, "user": Value::Null}));
    }

    let user_id = state.inner.users.add_user(name);
    let session = state.inner.sessions.new_session(user_id);
    tracing::info!(user_id, name, "login");

    let user = UserEntry { id: user_id, name: name.to_string() };
    let cookie = state.session_cookie(&session.id);
    json_with_cookies(vec![cookie], json!({"success": true, "user": user}))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let auth = authenticate(&state, &headers);

    let mut cookies = auth.cookies;
    if let Some(session) = auth.session {
        state.inner.sessions.delete(&session.id);
        cookies = vec![state.clear_cookie()];
        tracing::info!(user_id = session.user_id, "logout");
    }

    json_with_cookies(cookies, json!({"success": true, "user": Value::Null}))
}

async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let auth = authenticate(&state, &headers);
    let user = auth.user.map_or(Value::Null, |user| json!(user));
    json_with_cookies(auth.cookies, json!({"success": true, "user": user}))
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = authenticate(&state, &headers);
    let Some(user) = auth.user else {
        tracing::info!("unauthenticated websocket upgrade rejected");
        return StatusCode::FORBIDDEN.into_response();
    };

    let conn_id = state.next_conn_id();
    ws.on_upgrade(move |socket| crate::ws::serve_socket(state, socket, conn_id, user.id))
}
