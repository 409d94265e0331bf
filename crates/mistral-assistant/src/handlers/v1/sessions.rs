//! Session management HTTP handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conversation::{Conversation, Turn, render};
use crate::presentation::render_html;
use crate::response;
use crate::server::AppState;
use crate::session::Session;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SendMessageRequest {
    content: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    session_id: String,
    created_at: String,
    turns: Vec<Turn>,
    transcript: String,
    transcript_html: String,
}

impl SessionResponse {
    fn new(session: &Session, conversation: &Conversation) -> Self {
        Self {
            session_id: session.id.clone(),
            created_at: session.created_at.to_rfc3339(),
            turns: conversation.turns().to_vec(),
            transcript: render(conversation),
            transcript_html: render_html(conversation),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/sessions
pub async fn create_session(State(state): State<AppState>) -> Response {
    let session = state.sessions.create();
    info!(session_id = %session.id, "session created");

    let response = SessionResponse::new(&session, &Conversation::new());
    (StatusCode::OK, Json(response)).into_response()
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return response::not_found("Session not found").into_response();
    };

    let conversation = session.snapshot().await;
    (
        StatusCode::OK,
        Json(SessionResponse::new(&session, &conversation)),
    )
        .into_response()
}

/// POST /api/v1/sessions/{session_id}/messages
///
/// Runs one exchange and replaces the stored conversation with its result,
/// which after a failure is a single fallback turn.
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return response::not_found("Session not found").into_response();
    };

    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return response::unprocessable(rejection.body_text()).into_response();
        }
    };

    if req.content.trim().is_empty() {
        return response::unprocessable("Message content must not be empty").into_response();
    }

    let mut conversation = session.lock().await;
    let updated = state.exchange.exchange(&conversation, &req.content).await;
    debug!(
        session_id = %session.id,
        before = conversation.len(),
        after = updated.len(),
        "conversation updated"
    );
    *conversation = updated;

    (
        StatusCode::OK,
        Json(SessionResponse::new(&session, &conversation)),
    )
        .into_response()
}
