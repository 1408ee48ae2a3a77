//! JSON API for leave requests and credential verification.
//!
//! - `POST /api/requests`                    create (student)
//! - `GET  /api/requests`                    list, scoped to the caller
//! - `GET  /api/requests/{id}`               read one
//! - `POST /api/requests/{id}/approve`       approve the caller's pending step
//! - `POST /api/requests/{id}/reject`        reject the caller's pending step
//! - `POST /api/requests/{id}/cancel`        cancel (owner, while pending)
//! - `GET  /api/requests/{id}/credential`    owner fetches the issued QR secret
//! - `POST /api/qr/verify`                   public credential check
//! - `GET  /api/admin/logs`                  audit log (dev)
//! - `GET  /realtime`                        websocket channel

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use outpass_core::domain::credential::Verification;
use outpass_core::domain::principal::{Principal, Role};
use outpass_core::domain::request::{NewRequest, Request, RequestId, RequestStatus};
use outpass_core::errors::{ApplicationError, DomainError, InterfaceError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::realtime;
use crate::state::AppState;

const DEFAULT_PAGE_LIMIT: u32 = 50;
const MAX_PAGE_LIMIT: u32 = 200;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/approve", post(approve_request))
        .route("/api/requests/{id}/reject", post(reject_request))
        .route("/api/requests/{id}/cancel", post(cancel_request))
        .route("/api/requests/{id}/credential", get(request_credential))
        .route("/api/qr/verify", post(verify_credential))
        .route("/api/admin/logs", get(audit_logs))
        .route("/realtime", get(realtime::upgrade))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub reason: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub branch: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyBody {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub request_id: RequestId,
    pub credential: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub reason: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Errors and authentication
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn application(error: ApplicationError) -> Self {
        let interface = error.into_interface(correlation_id());
        match &interface {
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => error!(
                event_name = "api.request.failed",
                correlation_id = interface.correlation_id(),
                reason = interface.reason(),
                error = %interface,
                "request failed"
            ),
            _ => debug!(
                event_name = "api.request.refused",
                correlation_id = interface.correlation_id(),
                reason = interface.reason(),
                error = %interface,
                "request refused"
            ),
        }
        Self(interface)
    }

    fn bad_request(reason: &'static str, message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            reason,
            message: message.into(),
            correlation_id: correlation_id(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = if status.is_server_error() {
            self.0.user_message().to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            reason: self.0.reason(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Principal resolved from `Authorization: Bearer <credential>`.
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let Some(credential) = bearer else {
            return Err(InterfaceError::unauthorized("missing bearer credential")
                .with_correlation_id(correlation_id())
                .into());
        };

        match state.identity.authenticate(credential).await {
            Ok(principal) => Ok(Self(principal)),
            Err(rejection) => {
                let correlation_id = correlation_id();
                warn!(
                    event_name = "api.auth.rejected",
                    correlation_id = %correlation_id,
                    reason = rejection.reason(),
                    "bearer credential rejected"
                );
                Err(ApiError(InterfaceError::Unauthorized {
                    reason: rejection.reason(),
                    message: rejection.to_string(),
                    correlation_id,
                }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    body: Bytes,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    let body = required_json::<CreateRequestBody>(&body)?;
    let input = NewRequest {
        reason: body.reason,
        from: body.from,
        to: body.to,
        branch: body.branch,
        section: body.section,
    };
    let outcome = state.engine.submit(&principal, input).await.map_err(ApiError::application)?;
    state.notifier.publish(&outcome.events);
    Ok((StatusCode::CREATED, Json(outcome.request)))
}

async fn list_requests(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Request>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request("validation_error", format!("unknown status `{raw}`"))
        })?),
        None => None,
    };
    let requests = state.engine.list(&principal, status).await.map_err(ApiError::application)?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiError> {
    let request =
        state.engine.get(&principal, &RequestId(id)).await.map_err(ApiError::application)?;
    Ok(Json(request))
}

async fn approve_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Request>, ApiError> {
    let body: DecisionBody = optional_json(&body)?;
    let outcome = state
        .engine
        .approve(&principal, &RequestId(id), body.comment)
        .await
        .map_err(ApiError::application)?;
    state.notifier.publish(&outcome.events);
    Ok(Json(outcome.request))
}

async fn reject_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Request>, ApiError> {
    let body: DecisionBody = optional_json(&body)?;
    let outcome = state
        .engine
        .reject(&principal, &RequestId(id), body.comment)
        .await
        .map_err(ApiError::application)?;
    state.notifier.publish(&outcome.events);
    Ok(Json(outcome.request))
}

async fn cancel_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Request>, ApiError> {
    let outcome =
        state.engine.cancel(&principal, &RequestId(id)).await.map_err(ApiError::application)?;
    state.notifier.publish(&outcome.events);
    Ok(Json(outcome.request))
}

async fn request_credential(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = state
        .engine
        .credential_for(&principal, &RequestId(id))
        .await
        .map_err(ApiError::application)?;
    Ok(Json(CredentialResponse {
        request_id: credential.request_id,
        credential: credential.secret,
        expires_at: credential.expires_at.to_rfc3339(),
    }))
}

/// Public: possession of a valid secret is the proof being checked.
async fn verify_credential(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let token = serde_json::from_slice::<VerifyBody>(&body)
        .ok()
        .and_then(|body| body.token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "valid": false, "reason": "missing_token" })));
    };

    match state.tokens.verify(&token).await {
        Ok(Verification::Valid(projection)) => {
            info!(
                event_name = "credential.verify.accepted",
                request_id = %projection.request_id,
                "credential verified"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "valid": true,
                    "request": {
                        "id": projection.request_id,
                        "requester_id": projection.requester_id,
                        "requester_name": projection.requester_name,
                        "from": projection.window.from.to_rfc3339(),
                        "to": projection.window.to.to_rfc3339(),
                    }
                })),
            )
        }
        Ok(Verification::Invalid(reason)) => {
            (StatusCode::OK, Json(json!({ "valid": false, "reason": reason.as_str() })))
        }
        Err(error) => {
            error!(event_name = "credential.verify.failed", error = %error, "credential check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "valid": false, "reason": "server_error" })),
            )
        }
    }
}

async fn audit_logs(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    if principal.role != Role::Dev {
        return Err(ApiError::application(
            DomainError::AccessDenied(format!("{} cannot read audit logs", principal.role)).into(),
        ));
    }
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

    let result = state
        .audit
        .page(page, limit)
        .await
        .map_err(|error| ApiError::application(error.into()))?;
    let pages = result.total.div_ceil(u64::from(limit));

    Ok(Json(json!({
        "logs": result.entries,
        "pagination": {
            "page": result.page,
            "limit": result.limit,
            "total": result.total,
            "pages": pages,
        }
    })))
}

fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request("validation_error", format!("invalid JSON body: {error}")))
}

fn required_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request("validation_error", format!("invalid JSON body: {error}")))
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}
