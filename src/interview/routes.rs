//! REST endpoints for the interview.
//!
//! Session identity travels only in a signed cookie; a request without a
//! valid one is served against a fresh session and the cookie is set on the
//! response.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::coordinator::{Outcome, TurnCoordinator};
use super::model::SessionId;
use super::wire::{
    AnswerEntry, AnswerListResponse, AnswerRequest, AnswerResponse, AskQuestionRequest,
    AskQuestionResponse, ErrorDetail, ErrorResponse, RegisterRequest, RegisterResponse,
    UpstreamDetail, WhichQuestionResponse,
};
use crate::error::{ConfigError, TurnError};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "chtbtuid";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TurnCoordinator>,
    /// Signs the session cookie.
    pub cookie_key: Key,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// Hand the session id back to the visitor when it is new or its expiry
    /// moved.
    fn remember<T>(&self, jar: SignedCookieJar, outcome: &Outcome<T>) -> SignedCookieJar {
        if !(outcome.created || outcome.refreshed) {
            return jar;
        }
        let ttl = self.coordinator.policy().ttl;
        let cookie = Cookie::build((SESSION_COOKIE, outcome.session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .max_age(time::Duration::seconds(ttl.num_seconds()))
            .build();
        jar.add(cookie)
    }
}

fn session_id(jar: &SignedCookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| SessionId::from(cookie.value().to_string()))
}

/// Build the interview REST routes.
pub fn interview_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/whichQuestion", get(which_question))
        .route("/answerList", get(answer_list))
        .route("/register", post(register))
        .route("/answer", post(answer))
        .route("/askQuestion", post(ask_question))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Cross-origin access for a browser frontend served from `origin`.
///
/// Credentials are allowed so the session cookie is sent along.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
        key: "INTERVIEW_FRONTEND_URL".to_string(),
        message: e.to_string(),
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

// ── Errors ──────────────────────────────────────────────────────────────

/// A failed request, rendered as `{success: false, error: {...}}`.
#[derive(Debug)]
pub struct ApiError(TurnError);

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TurnError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            "validation" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "exhausted" => StatusCode::GONE,
            "generation_failed" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let upstream = match &self.0 {
            TurnError::GenerationFailed(e) => match (e.upstream_status(), e.upstream_body()) {
                (Some(status), Some(body)) => Some(UpstreamDetail {
                    status,
                    body: body.to_string(),
                }),
                _ => None,
            },
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                kind: self.0.kind().to_string(),
                message: self.0.to_string(),
                upstream,
            },
        };
        (status, Json(body)).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-interview"
    }))
}

/// GET /whichQuestion
async fn which_question(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Json<WhichQuestionResponse>), ApiError> {
    let id = session_id(&jar);
    let outcome = state.coordinator.resume(id.as_ref()).await?;
    let jar = state.remember(jar, &outcome);
    Ok((
        jar,
        Json(WhichQuestionResponse {
            success: true,
            question_index: outcome.value.progress,
            name: outcome.value.display_name,
            onboarding: state.coordinator.onboarding(),
            state: outcome.state,
        }),
    ))
}

/// GET /answerList
async fn answer_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Json<AnswerListResponse>, ApiError> {
    let id = session_id(&jar);
    let records = state.coordinator.answer_list(id.as_ref()).await?;
    Ok(Json(AnswerListResponse {
        success: true,
        answer_list: records.into_iter().map(AnswerEntry::from).collect(),
    }))
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(SignedCookieJar, Json<RegisterResponse>), ApiError> {
    let Json(body) = body?;
    let id = session_id(&jar);
    let outcome = state.coordinator.register_name(id.as_ref(), &body.name).await?;
    let jar = state.remember(jar, &outcome);
    Ok((
        jar,
        Json(RegisterResponse {
            success: true,
            name: outcome.value,
        }),
    ))
}

/// POST /answer
async fn answer(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<(SignedCookieJar, Json<AnswerResponse>), ApiError> {
    let Json(body) = body?;
    let id = session_id(&jar);
    let outcome = state
        .coordinator
        .record_answer(id.as_ref(), &body.question, &body.answer, body.question_index)
        .await?;
    let jar = state.remember(jar, &outcome);
    Ok((
        jar,
        Json(AnswerResponse {
            success: true,
            question_index: outcome.value,
        }),
    ))
}

/// POST /askQuestion
async fn ask_question(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    body: Result<Json<AskQuestionRequest>, JsonRejection>,
) -> Result<(SignedCookieJar, Json<AskQuestionResponse>), ApiError> {
    let Json(body) = body?;
    let id = session_id(&jar);
    let outcome = state
        .coordinator
        .next_question(id.as_ref(), &body.message_queue)
        .await?;
    let jar = state.remember(jar, &outcome);
    Ok((
        jar,
        Json(AskQuestionResponse {
            success: true,
            message: outcome.value,
        }),
    ))
}
