//! HTTP API: auth, endpoint CRUD, and the read-model snapshot served to
//! display clients. Every change to the endpoint set ends by re-feeding the
//! full configured list to the connection manager, which computes its own
//! diff.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::auth;
use crate::conn::ConnStatus;
use crate::db::{Db, DbError, EndpointRow};
use crate::format::{clamp_cpu, format_bytes, format_uptime};
use crate::manager::ManagerHandle;
use crate::sample::Sample;

#[derive(Clone)]
pub struct ApiState {
    pub db: Db,
    pub manager: ManagerHandle,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/endpoints", get(list_endpoints).post(create_endpoint))
        .route("/api/endpoints/:id", delete(delete_endpoint))
        .route("/api/metrics", get(metrics))
        .with_state(state)
}

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal(#[source] DbError),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::UsernameTaken => ApiError::Conflict("username already taken".into()),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(e) => {
                error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------- auth ----------

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    username: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn require_user(state: &ApiState, headers: &HeaderMap) -> Result<i64, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    state
        .db
        .session_user(token, Utc::now().timestamp())
        .await?
        .ok_or(ApiError::Unauthorized)
}

async fn issue_session(state: &ApiState, user_id: i64, username: String) -> Result<Json<AuthResponse>, ApiError> {
    let token = auth::new_token();
    state
        .db
        .create_session(&token, user_id, auth::session_expiry())
        .await?;
    Ok(Json(AuthResponse { token, username }))
}

async fn register(
    State(state): State<ApiState>,
    Json(creds): Json<Credentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    if creds.username.trim().is_empty() || creds.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".into(),
        ));
    }
    if creds.password.len() < auth::MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            auth::MIN_PASSWORD_LEN
        )));
    }
    let hash = auth::hash_password(&creds.password);
    let user_id = state.db.create_user(creds.username.trim(), &hash).await?;
    issue_session(&state, user_id, creds.username.trim().to_string()).await
}

async fn login(
    State(state): State<ApiState>,
    Json(creds): Json<Credentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .db
        .user_by_name(creds.username.trim())
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !auth::verify_password(&creds.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    issue_session(&state, user.id, user.username).await
}

async fn logout(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.db.delete_session(token).await?;
    }
    Ok(Json(json!({ "ok": true })))
}

// ---------- endpoints ----------

#[derive(Deserialize)]
struct NewEndpoint {
    name: String,
    address: String,
}

async fn list_endpoints(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EndpointRow>>, ApiError> {
    let user_id = require_user(&state, &headers).await?;
    Ok(Json(state.db.endpoints_for_user(user_id).await?))
}

async fn create_endpoint(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<NewEndpoint>,
) -> Result<Json<EndpointRow>, ApiError> {
    let user_id = require_user(&state, &headers).await?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    let parsed = url::Url::parse(body.address.trim())
        .map_err(|_| ApiError::BadRequest("address is not a valid URL".into()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(ApiError::BadRequest(
            "address must be a ws:// or wss:// URL".into(),
        ));
    }
    let row = state
        .db
        .insert_endpoint(user_id, body.name.trim(), body.address.trim())
        .await?;
    refresh_manager(&state).await?;
    Ok(Json(row))
}

async fn delete_endpoint(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = require_user(&state, &headers).await?;
    if !state.db.delete_endpoint(user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    refresh_manager(&state).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Re-feed the full configured list; the manager diffs it itself.
async fn refresh_manager(state: &ApiState) -> Result<(), ApiError> {
    let endpoints = state.db.all_endpoints().await?;
    state.manager.reconcile(endpoints);
    Ok(())
}

// ---------- metrics ----------

#[derive(Serialize)]
struct MetricsEntry {
    id: i64,
    name: String,
    address: String,
    status: ConnStatus,
    last_update: Option<DateTime<Utc>>,
    sample: Option<Sample>,
    display: Option<DisplayBlock>,
}

/// Pre-rendered strings for display clients. The only place CPU is clamped.
#[derive(Serialize)]
struct DisplayBlock {
    cpu_pct: f64,
    uptime: String,
    rx_rate: String,
    tx_rate: String,
}

impl DisplayBlock {
    fn from_sample(s: &Sample) -> Self {
        Self {
            cpu_pct: clamp_cpu(s.cpu),
            uptime: format_uptime(s.uptime_days),
            rx_rate: format!("{}/s", format_bytes(s.rx_rate)),
            tx_rate: format!("{}/s", format_bytes(s.tx_rate)),
        }
    }
}

async fn metrics(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MetricsEntry>>, ApiError> {
    let user_id = require_user(&state, &headers).await?;
    let rows = state.db.endpoints_for_user(user_id).await?;
    let read = state.manager.read();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        // One atomic view per endpoint; a row the manager hasn't picked up
        // yet reports connecting with no sample.
        let view = read.view(row.id).await;
        let (status, sample, last_update) = match view {
            Some(v) => (v.status, v.last_sample, v.last_update),
            None => (ConnStatus::Connecting, None, None),
        };
        out.push(MetricsEntry {
            id: row.id,
            name: row.name,
            address: row.address,
            status,
            display: sample.as_ref().map(DisplayBlock::from_sample),
            sample,
            last_update,
        });
    }
    Ok(Json(out))
}
