//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use tutor_core::ports::{PortError, Unsupported};
use tutor_core::{SessionSummary, StoredMessage};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat_handler,
        list_sessions_handler,
        list_messages_handler,
    ),
    components(
        schemas(ChatRequest, ChatResponse, SessionResponse, MessageResponse)
    ),
    tags(
        (name = "AI Tutor API", description = "Chat endpoints for the AI tutor.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A single tutoring exchange requested over plain HTTP.
#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub language: Option<String>,
}

/// The assistant's reply and the session it was recorded under.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub content: String,
    pub has_code: bool,
    pub has_image: bool,
    pub session_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionResponse {
    fn from(session: SessionSummary) -> Self {
        Self {
            id: session.id,
            title: session.title,
            language: session.language,
            created_at: session.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    /// Either `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for MessageResponse {
    fn from(message: StoredMessage) -> Self {
        Self {
            id: message.id,
            role: message.role.as_str().to_string(),
            content: message.content,
            audio_url: message.audio_ref,
            created_at: message.created_at,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Run one tutoring exchange.
///
/// Creates a session when `session_id` is omitted. Provider failures still
/// return 200 with the fallback reply.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Message is required"),
        (status = 401, description = "Missing or invalid user id"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is required".to_string()));
    }

    if let Some(session_id) = req.session_id {
        let owned = app_state
            .history
            .owns_session(user_id, session_id)
            .await
            .map_err(|e| {
                error!("Failed to check session {} for user {}: {:?}", session_id, user_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to load session".to_string(),
                )
            })?;
        if !owned {
            warn!("User {} tried to write to session {}.", user_id, session_id);
            return Err((
                StatusCode::NOT_FOUND,
                format!("Session {} not found", session_id),
            ));
        }
    }

    let language = app_state.language_or_default(req.language.as_deref());
    let chat = app_state.orchestrator(
        user_id,
        language,
        Arc::new(Unsupported),
        Arc::new(Unsupported),
    );

    let exchange = chat
        .send_message(&req.message, req.session_id)
        .await
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Message is required".to_string()))?;

    Ok(Json(ChatResponse {
        content: exchange.assistant.content,
        has_code: exchange.assistant.has_code,
        has_image: exchange.assistant.has_image,
        session_id: exchange.session_id,
    }))
}

/// List the caller's chat sessions, most recently active first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "The user's sessions", body = [SessionResponse]),
        (status = 401, description = "Missing or invalid user id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sessions = app_state.history.list_sessions(user_id).await.map_err(|e| {
        error!("Failed to list sessions for user {}: {:?}", user_id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to list sessions".to_string(),
        )
    })?;
    let body: Vec<SessionResponse> = sessions.into_iter().map(SessionResponse::from).collect();
    Ok(Json(body))
}

/// List the messages of one of the caller's sessions in conversation order.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/messages",
    responses(
        (status = 200, description = "The session's messages", body = [MessageResponse]),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The chat session.")
    )
)]
pub async fn list_messages_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.history.list_messages(user_id, session_id).await {
        Ok(messages) => {
            let body: Vec<MessageResponse> =
                messages.into_iter().map(MessageResponse::from).collect();
            Ok(Json(body))
        }
        Err(PortError::NotFound(msg)) => Err((StatusCode::NOT_FOUND, msg)),
        Err(e) => {
            error!("Failed to list messages for session {}: {:?}", session_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list messages".to_string(),
            ))
        }
    }
}
