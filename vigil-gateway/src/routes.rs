//! Axum route handlers for the Vigil gateway API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use vigil_core::{EngineConfig, SessionId, StateInfo, StateTransition, TrustSample, UserId, VerificationState};
use vigil_engine::{SessionStatus, VerificationSession};

use crate::push::{PushedProvider, ReportedOutcome, ScoreSlot, ScoreUpdate};
use crate::registry::SessionEntry;
use crate::{AppState, GatewayError};

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionId>,
}

/// `GET /v1/sessions/{id}` body: session status plus presentation metadata.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub state_info: StateInfo,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub samples: Vec<TrustSample>,
    pub transitions: Vec<StateTransition>,
}

#[derive(Debug, Deserialize)]
pub struct ReauthBody {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ReauthResponse {
    pub accepted: bool,
    pub state: VerificationState,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/{id}", get(get_session).delete(delete_session))
        .route("/v1/sessions/{id}/scores", post(push_scores))
        .route("/v1/sessions/{id}/history", get(session_history))
        .route("/v1/sessions/{id}/reauth", post(reauthenticate))
        .route("/v1/states/{state}", get(state_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn lookup(state: &AppState, id: Uuid) -> Result<Arc<SessionEntry>, GatewayError> {
    let id = SessionId::from(id);
    state.registry.get(id).ok_or(GatewayError::SessionNotFound(id))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok", "sessions": state.registry.len()})))
}

/// `POST /v1/sessions`: create and start a push-fed session.
///
/// # Errors
/// Returns [`GatewayError::InvalidRequest`] for an empty user ID, or the
/// session's start error.
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let user = body.user_id.trim();
    if user.is_empty() {
        return Err(GatewayError::InvalidRequest("user_id must not be empty".to_owned()));
    }
    let scores = Arc::new(ScoreSlot::new(state.stale_after));
    let session = VerificationSession::new(EngineConfig::clone(&state.config), PushedProvider::set(&scores)?)?;
    session.start(UserId::new(user)).await?;
    let id = state.registry.insert(session, scores);
    tracing::info!(session = %id, user, "session created");
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

/// `GET /v1/sessions`: live session IDs in creation order.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(SessionList { sessions: state.registry.ids() })
}

/// `GET /v1/sessions/{id}`: state, trust, recovery, enforcement policy and
/// registration time.
///
/// # Errors
/// Returns [`GatewayError::SessionNotFound`] if the ID is not registered.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = lookup(&state, id)?;
    let status = entry.session.status();
    let state_info = vigil_core::state_info(status.engine.state);
    Ok(Json(SessionView { status, created_at: entry.created_at, state_info }))
}

/// `DELETE /v1/sessions/{id}`: stop and remove a session.
///
/// # Errors
/// Returns [`GatewayError::SessionNotFound`] if the ID is not registered.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = SessionId::from(id);
    if !state.registry.remove(id) {
        return Err(GatewayError::SessionNotFound(id));
    }
    tracing::info!(session = %id, "session removed");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/sessions/{id}/scores`: latest provider readings.
///
/// # Errors
/// Returns [`GatewayError::SessionNotFound`] for an unknown ID and
/// [`GatewayError::Core`] (400) for a value outside `[0, 1]`.
pub async fn push_scores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ScoreUpdate>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = lookup(&state, id)?;
    if let Err(err) = entry.scores.push(update) {
        tracing::warn!(session = %entry.session.id(), error = %err, "rejected score update");
        return Err(err.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/sessions/{id}/history`: retained samples and transitions.
///
/// # Errors
/// Returns [`GatewayError::SessionNotFound`] if the ID is not registered.
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = lookup(&state, id)?;
    Ok(Json(HistoryResponse { samples: entry.session.history(), transitions: entry.session.transitions() }))
}

/// `POST /v1/sessions/{id}/reauth`: outcome of the external flow.
///
/// A successful outcome is applied on the session's next tick; it is not
/// accepted unless the session is in `RESTRICT` or `REAUTH`.
///
/// # Errors
/// Returns [`GatewayError::SessionNotFound`] for an unknown ID, or 409 if the
/// session is not running.
pub async fn reauthenticate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReauthBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = lookup(&state, id)?;
    let accepted = entry.session.reauthenticate(&ReportedOutcome { success: body.success }).await?;
    Ok(Json(ReauthResponse { accepted, state: entry.session.state() }))
}

/// `GET /v1/states/{state}`: presentation metadata for a state name.
///
/// # Errors
/// Returns [`GatewayError::Core`] (400) for an unknown state name.
pub async fn state_info(Path(name): Path<String>) -> Result<impl IntoResponse, GatewayError> {
    let state: VerificationState = name.parse()?;
    Ok(Json(vigil_core::state_info(state)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    fn app(state: &AppState) -> Router {
        create_router(state.clone())
    }

    fn request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let built = match body {
            Some(json) => builder.header("content-type", "application/json").body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        match built {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> Response {
        match app(state).oneshot(req).await {
            Ok(r) => r,
            Err(e) => panic!("handler error: {e}"),
        }
    }

    async fn json(resp: Response) -> serde_json::Value {
        let bytes = match axum::body::to_bytes(resp.into_body(), 1 << 20).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => panic!("invalid JSON: {e}"),
        }
    }

    async fn create(state: &AppState) -> String {
        let resp = send(state, request(Method::POST, "/v1/sessions", Some(serde_json::json!({"user_id": "alice"})))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        match json(resp).await["id"].as_str() {
            Some(id) => id.to_owned(),
            None => panic!("create response must carry an id"),
        }
    }

    fn state() -> AppState {
        AppState::new(EngineConfig::default())
    }

    #[tokio::test]
    async fn health_response_format_returns_ok_with_status_field() {
        let resp = send(&state(), request(Method::GET, "/health", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_lifecycle_over_http() {
        let state = state();
        let id = create(&state).await;

        let list = json(send(&state, request(Method::GET, "/v1/sessions", None)).await).await;
        assert_eq!(list["sessions"], serde_json::json!([id]));

        let view = json(send(&state, request(Method::GET, &format!("/v1/sessions/{id}"), None)).await).await;
        assert_eq!(view["running"], true);
        assert_eq!(view["user_id"], "alice");
        assert_eq!(view["engine"]["state"], "NORMAL");
        assert_eq!(view["state_info"]["icon"], "shield-check");
        assert!(
            view["created_at"].as_str().is_some_and(|t| chrono::DateTime::parse_from_rfc3339(t).is_ok()),
            "registration time must be exposed: {view}"
        );

        let resp = send(&state, request(Method::DELETE, &format!("/v1/sessions/{id}"), None)).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = send(&state, request(Method::DELETE, &format!("/v1/sessions/{id}"), None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "second delete must 404");
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_face_mismatch_escalates() {
        let state = state();
        let id = create(&state).await;
        let scores = format!("/v1/sessions/{id}/scores");
        let body = serde_json::json!({"face": 0.0, "liveness": 0.9, "behavior": 0.9});
        for _ in 0..8 {
            let resp = send(&state, request(Method::POST, &scores, Some(body.clone()))).await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let view = json(send(&state, request(Method::GET, &format!("/v1/sessions/{id}"), None)).await).await;
        assert_ne!(view["engine"]["state"], "NORMAL", "face 0.0 for 4s must escalate");

        let history = json(send(&state, request(Method::GET, &format!("/v1/sessions/{id}/history"), None)).await).await;
        assert!(history["samples"].as_array().is_some_and(|s| s.len() >= 8));
        assert!(history["transitions"].as_array().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_score_is_rejected() {
        let state = state();
        let id = create(&state).await;
        let resp = send(
            &state,
            request(Method::POST, &format!("/v1/sessions/{id}/scores"), Some(serde_json::json!({"face": 1.5}))),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json(resp).await["error"].as_str().is_some_and(|e| e.contains("1.5")));
    }

    #[tokio::test(start_paused = true)]
    async fn reauth_in_normal_is_not_accepted() {
        let state = state();
        let id = create(&state).await;
        let resp = send(
            &state,
            request(Method::POST, &format!("/v1/sessions/{id}/reauth"), Some(serde_json::json!({"success": true}))),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["accepted"], false);
        assert_eq!(body["state"], "NORMAL");
    }

    #[tokio::test]
    async fn unknown_session_returns_404() {
        let uri = format!("/v1/sessions/{}/history", Uuid::new_v4());
        let resp = send(&state(), request(Method::GET, &uri, None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected() {
        let resp =
            send(&state(), request(Method::POST, "/v1/sessions", Some(serde_json::json!({"user_id": "  "})))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn state_info_lookup_is_case_insensitive() {
        let resp = send(&state(), request(Method::GET, "/v1/states/restrict", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["name"], "Restrict");

        let resp = send(&state(), request(Method::GET, "/v1/states/LOCKED", None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
