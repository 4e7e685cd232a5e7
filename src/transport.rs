// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Request/response boundary with the gateway.
//
// Every gateway response is wrapped in an envelope:
//     {"method": "/api/rest_j/v1/...", "status": 0, "message": "OK", "data": {...}}
//
//     status  0  success, `data` carries the payload
//     status -1  not logged in / session expired
//     other      request rejected, `message` explains why
//
// The gateway reports missing files, tasks and executions as a rejected
// envelope ("... does not exist") rather than an HTTP 404; both become
// `LinkisError::NotFound`.
//
// Session handling:
//     Password credentials log in once (POST /user/login) and ride the
//     session cookie afterwards. A 401 or status -1 triggers one renewal and
//     a replay of the request. Renewal runs under a mutex and is skipped if
//     another thread already renewed the same session generation.

use crate::config::{API_PREFIX, REQUEST_TIMEOUT};
use crate::credentials::{Auth, Credentials};
use crate::error::{LinkisError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const USER_AGENT: &str = concat!("linkis-rust/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A gateway call; `path` is relative to `/api/rest_j/v1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of a query parameter, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Anything that can carry an `ApiRequest` to the gateway and hand back the
/// envelope's `data` payload.
pub trait Transport: Send + Sync + Debug {
    fn send(&self, request: &ApiRequest) -> Result<Value>;

    /// Establish a session. Transports without sessions do nothing.
    fn login(&self) -> Result<()> {
        Ok(())
    }

    /// Tear the session down.
    fn logout(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Envelope Decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: i32,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Map an HTTP status and body onto the envelope payload or an error.
pub fn decode_response(http_status: u16, path: &str, body: &str) -> Result<Value> {
    match http_status {
        401 => return Err(LinkisError::Unauthorized(envelope_message(body))),
        404 => return Err(LinkisError::NotFound(path.to_string())),
        200..=299 => {}
        status => {
            return Err(LinkisError::Api {
                status: i32::from(status),
                message: envelope_message(body),
            })
        }
    }

    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.status {
        0 => Ok(envelope.data.unwrap_or(Value::Null)),
        -1 => Err(LinkisError::Unauthorized(
            envelope.message.unwrap_or_else(|| "login required".to_string()),
        )),
        status => {
            let message = envelope.message.unwrap_or_default();
            if status < 500 && is_not_found_message(&message) {
                Err(LinkisError::NotFound(format!("{path}: {message}")))
            } else {
                Err(LinkisError::Api { status, message })
            }
        }
    }
}

/// Phrases the gateway uses for a path or id it does not know
const NOT_FOUND_MARKERS: &[&str] = &[
    "not exist",
    "not found",
    "can not find",
    "cannot find",
    "no such",
];

fn is_not_found_message(message: &str) -> bool {
    let message = message.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Best-effort error text: the envelope message when the body is one.
fn envelope_message(body: &str) -> String {
    serde_json::from_str::<Envelope>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

// =============================================================================
// HTTP Transport
// =============================================================================

#[derive(Debug, Default)]
struct SessionState {
    /// Bumped on every successful login
    generation: u64,
    logged_in: bool,
}

/// Login bookkeeping shared by every request on one transport. Logins run
/// under the lock.
#[derive(Debug, Default)]
struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log in unless a session exists; returns the generation in use.
    fn ensure(&self, login: impl FnOnce() -> Result<()>) -> Result<u64> {
        let mut state = self.lock();
        if !state.logged_in {
            login()?;
            state.logged_in = true;
            state.generation += 1;
        }
        Ok(state.generation)
    }

    /// Replace generation `seen`, unless another caller already did.
    fn renew(&self, seen: u64, login: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut state = self.lock();
        if state.logged_in && state.generation != seen {
            return Ok(());
        }
        state.logged_in = false;
        login()?;
        state.logged_in = true;
        state.generation += 1;
        Ok(())
    }

    fn end(&self, logout: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut state = self.lock();
        if state.logged_in {
            logout()?;
            state.logged_in = false;
        }
        Ok(())
    }

    /// Run `dispatch` inside the session. A rejected session is renewed
    /// once and the request replayed once.
    fn send(
        &self,
        dispatch: impl Fn() -> Result<Value>,
        login: impl Fn() -> Result<()>,
    ) -> Result<Value> {
        let generation = self.ensure(&login)?;
        match dispatch() {
            Err(LinkisError::Unauthorized(reason)) => {
                tracing::warn!(%reason, generation, "session rejected, logging in again");
                self.renew(generation, &login)?;
                dispatch()
            }
            other => other,
        }
    }
}

/// Blocking HTTP transport with a cookie session.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    credentials: Credentials,
    session: Session,
}

impl HttpTransport {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_timeout(credentials, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            credentials,
            session: Session::default(),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.credentials.address, API_PREFIX, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials.auth {
            Auth::Token { user, token } => request
                .header("Token-User", user)
                .header("Token-Code", token),
            Auth::Password { .. } => request,
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> Result<Value> {
        let url = self.url(&request.path);
        tracing::debug!(method = request.method.as_str(), path = %request.path, "gateway request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let mut builder = self
            .authorize(builder)
            .header("Content-Type", "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_string(body)?);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        decode_response(status, &request.path, &text)
    }

    fn perform_login(&self, username: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post(
            "/user/login",
            serde_json::json!({ "userName": username, "password": password }),
        );
        self.dispatch(&request).map_err(|e| match e {
            LinkisError::Api { message, .. } | LinkisError::NotFound(message) => {
                LinkisError::Unauthorized(message)
            }
            other => other,
        })?;
        tracing::info!(user = username, address = %self.credentials.address, "logged in");
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<Value> {
        match &self.credentials.auth {
            Auth::Password { username, password } => self.session.send(
                || self.dispatch(request),
                || self.perform_login(username, password),
            ),
            Auth::Token { .. } => self.dispatch(request),
        }
    }

    fn login(&self) -> Result<()> {
        match &self.credentials.auth {
            Auth::Password { username, password } => self
                .session
                .ensure(|| self.perform_login(username, password))
                .map(|_| ()),
            Auth::Token { .. } => Ok(()),
        }
    }

    fn logout(&self) -> Result<()> {
        self.session.end(|| {
            self.dispatch(&ApiRequest::post("/user/logout", serde_json::json!({})))?;
            tracing::info!(user = self.credentials.username(), "logged out");
            Ok(())
        })
    }
}
