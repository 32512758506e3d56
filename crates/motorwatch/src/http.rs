//! Axum HTTP handlers for the motorwatch server.
//!
//! Every reading endpoint is guarded by a named policy. The acting user is
//! taken from an `Authorization: Bearer <token>` header; requests without a
//! known token run as the anonymous user and are redirected to the login
//! page by the guards.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use motorwatch_perms::{Admission, Call, ContextRef, PermsErrorKind};
use motorwatch_telemetry::{FeedClient, Ingestor, ReadingStore, TelemetryError};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::actor::{HttpContext, User, UserDirectory};
use crate::config::RootConfig;
use crate::error::{RootError, RootResult};
use crate::policies::{build_registry, AppRegistry, Endpoints, Reply};

/// Shared application state for Axum handlers.
pub struct AppState {
    pub config: RootConfig,
    pub store: Arc<ReadingStore>,
    pub registry: AppRegistry,
    pub users: UserDirectory,
    pub endpoints: Endpoints,
    pub ingestor: Ingestor,
}

impl AppState {
    /// Register the policies and install the guarded endpoints over `store`.
    pub fn new(config: RootConfig, store: Arc<ReadingStore>) -> RootResult<Self> {
        let motor_id = config.motor_id()?;
        let registry = build_registry(config.permissions.clone(), Arc::clone(&store))?;
        let endpoints = Endpoints::install(&registry, Arc::clone(&store), motor_id.clone())?;
        let client = FeedClient::new(config.feed.url.as_str(), config.feed.timeout())?;
        let ingestor = Ingestor::new(client, Arc::clone(&store), motor_id);
        let users = UserDirectory::new(&config.users);
        info!(policies = registry.len(), users = users.len(), "application state ready");
        Ok(Self {
            config,
            store,
            registry,
            users,
            endpoints,
            ingestor,
        })
    }

    /// The user a request acts as.
    pub fn user_for(&self, headers: &HeaderMap) -> Arc<User> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        self.users.resolve(token)
    }

    fn context(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> ContextRef<User> {
        Arc::new(HttpContext {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            user: self.user_for(headers),
        })
    }
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/readings", get(handle_readings))
        .route("/readings/{id}", get(handle_reading))
        .route("/location", get(handle_location))
        .route("/ingest", post(handle_ingest))
        .route("/login/", get(handle_login))
        .route("/me", get(handle_me))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(value) => (StatusCode::OK, Json(value)).into_response(),
            Reply::Text(text) => (StatusCode::OK, text).into_response(),
            Reply::Redirect(location) => {
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
        }
    }
}

impl IntoResponse for RootError {
    fn into_response(self) -> Response {
        let status = match &self {
            RootError::Perms(e) => match e.kind() {
                PermsErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                PermsErrorKind::SubjectNotFound => StatusCode::NOT_FOUND,
                PermsErrorKind::UnknownMethod => StatusCode::METHOD_NOT_ALLOWED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RootError::Telemetry(TelemetryError::NotFound(_)) => StatusCode::NOT_FOUND,
            RootError::Telemetry(TelemetryError::Http(_) | TelemetryError::Feed(_)) => {
                StatusCode::BAD_GATEWAY
            }
            RootError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        let mut body = json!({ "error": self.to_string() });
        if let RootError::Perms(e) = &self {
            if let Some(policy) = e.policy_name() {
                body["permission"] = json!(policy);
            }
        }
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health -- server info
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let readings = state.store.count().ok();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "motor_id": state.config.feed.motor_id,
        "readings": readings,
        "policies": state.registry.len(),
    }))
}

/// GET /readings -- latest readings, oldest first
async fn handle_readings(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Reply, RootError> {
    let call = Call::new(state.context(&method, &uri, &headers));
    state.endpoints.readings.call(&call)
}

/// GET /readings/{id} -- one reading, checked against the reading's motor
async fn handle_reading(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Reply, RootError> {
    let call = Call::new(state.context(&method, &uri, &headers)).arg(id);
    state.endpoints.reading.dispatch(&call)
}

/// GET /location -- fixed site coordinates
async fn handle_location(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Reply, RootError> {
    let call = Call::new(state.context(&method, &uri, &headers));
    state.endpoints.location.call(&call)
}

/// POST /ingest -- run one ingestion pass
async fn handle_ingest(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Reply, RootError> {
    let admission = {
        let call = Call::new(state.context(&method, &uri, &headers));
        state.endpoints.ingest.admit(&call, &[])?
    };
    match admission {
        Admission::Respond(reply) => Ok(reply),
        Admission::Proceed => {
            let report = state.ingestor.run_once().await?;
            Ok(Reply::Json(json!({ "report": report })))
        }
    }
}

/// GET /login/ -- where anonymous requests are sent
async fn handle_login() -> Reply {
    Reply::Text("Login required. Send an `Authorization: Bearer <token>` header.".to_string())
}

/// GET /me -- the caller and what the UI may offer them
async fn handle_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, RootError> {
    let user = state.user_for(&headers);
    let filters = state.registry.filters();
    let mut permissions = serde_json::Map::new();
    for name in filters.names() {
        permissions.insert(name.to_string(), json!(filters.apply(name, Some(&*user))?));
    }
    Ok(Json(json!({
        "user": user.name,
        "anonymous": user.anonymous,
        "permissions": permissions,
    })))
}
