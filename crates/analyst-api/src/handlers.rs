//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/query/body parameters via axum extractors,
//! works against the repositories and conversation services in AppState
//! and returns JSON, a streamed text body or a file attachment.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use analyst_chat::{validate_transition, ChatError, TurnEvent};
use analyst_core::types::{ConversationMode, Message, Role, Session, SessionSummary};
use analyst_export::ExportFormat;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 200;
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_TITLE_CHARS: usize = 100;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: String,
    #[serde(alias = "user_message")]
    pub message: String,
}

/// Request body for PATCH /session/{id}.
#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub title: String,
}

/// Request body for POST /analyze.
#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    pub requirement: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LlmStatus {
    pub provider: String,
    pub model: Option<String>,
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub llm: LlmStatus,
    pub sessions: u64,
    pub knowledge_chunks: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: Uuid,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub title: String,
    pub mode: ConversationMode,
    pub messages: Vec<Message>,
    pub brd_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            title: session.title,
            mode: session.mode,
            messages: session.messages,
            brd_generated: session.brd_generated,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("Session not found: {}", raw)))
}

/// Plain-text body fed incrementally from `stream`.
fn text_stream<S>(stream: S) -> Response
where
    S: Stream<Item = Result<String, Infallible>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

// =============================================================================
// UI and health
// =============================================================================

/// GET / - the embedded chat page.
pub async fn ui() -> impl IntoResponse {
    Html(crate::ui::CHAT_HTML)
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let available = match &state.model {
        Some(model) => matches!(
            tokio::time::timeout(HEALTH_CHECK_TIMEOUT, model.health_check()).await,
            Ok(Ok(()))
        ),
        None => false,
    };

    Ok(Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        llm: LlmStatus {
            provider: state.config.llm.provider.clone(),
            model: state.model.as_ref().map(|m| m.model().to_string()),
            available,
        },
        sessions: state.sessions.count()?,
        knowledge_chunks: state.knowledge.count()?,
    }))
}

// =============================================================================
// Sessions
// =============================================================================

/// POST /session/new - create an empty session.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let session = state.sessions.create(None)?;
    info!(session_id = %session.id, "Session created");
    Ok(Json(NewSessionResponse {
        session_id: session.id,
        title: session.title,
    }))
}

/// GET /sessions - most recently updated sessions first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(SessionListResponse {
        sessions: state.sessions.list(limit)?,
    }))
}

/// GET /session/{id} - full session with history.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state
        .sessions
        .find(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", id)))?;
    Ok(Json(session.into()))
}

/// PATCH /session/{id} - rename a session.
pub async fn rename_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "title exceeds maximum length of {} characters",
            MAX_TITLE_CHARS
        )));
    }

    state.sessions.rename(id, title)?;
    info!(session_id = %id, title, "Session renamed");
    let session = state.sessions.find(id)?.ok_or(ChatError::SessionNotFound(id))?;
    Ok(Json(session.into()))
}

/// POST /session/{id}/reset - return the session to general conversation.
/// History and any generated BRD are kept.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state.sessions.find(id)?.ok_or(ChatError::SessionNotFound(id))?;
    validate_transition(session.mode, ConversationMode::General, true)?;

    state.sessions.set_mode(id, ConversationMode::General)?;
    info!(session_id = %id, previous = %session.mode, "Session mode reset");
    let session = state.sessions.find(id)?.ok_or(ChatError::SessionNotFound(id))?;
    Ok(Json(session.into()))
}

/// DELETE /session/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if state.sessions.delete(id)? {
        info!(session_id = %id, "Session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session not found: {}", id)))
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// POST /chat - run one turn and stream the reply as plain text.
///
/// The turn is persisted only once the stream reaches its completion
/// event. A failed or abandoned turn leaves the session untouched.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    let id = parse_session_id(&body.session_id)?;
    let message = state.controller.validate_message(&body.message)?;
    let session = state
        .sessions
        .find(id)?
        .ok_or(ChatError::SessionNotFound(id))?;

    info!(session_id = %id, mode = %session.mode, "Chat turn");
    let turn = state
        .controller
        .run_turn(session.messages, message.clone(), session.mode);

    let sessions = state.sessions.clone();
    let history_limit = state.config.chat.history_limit;
    let body = turn.filter_map(move |event| match event {
        TurnEvent::Completed { reply, mode } => {
            match sessions.append_turn(id, &message, &reply, mode, history_limit) {
                Ok(_) => info!(session_id = %id, mode = %mode, "Turn saved"),
                Err(e) => error!(session_id = %id, error = %e, "Failed to save turn"),
            }
            None
        }
        other => other.body_text().map(|text| Ok::<_, Infallible>(text.to_string())),
    });

    Ok(text_stream(body))
}

/// POST /generate_brd/{id} - stream a BRD built from the session history
/// and store it when generation completes.
pub async fn generate_brd(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state
        .sessions
        .find(id)?
        .ok_or(ChatError::SessionNotFound(id))?;

    if !session.messages.iter().any(|m| m.role == Role::User) {
        return Err(ApiError::BadRequest(
            "Session has no conversation to build a BRD from".to_string(),
        ));
    }

    info!(session_id = %id, messages = session.messages.len(), "BRD requested");
    let stream = state.brd.generate(session.messages);

    let sessions = state.sessions.clone();
    let body = stream.filter_map(move |event| match event {
        TurnEvent::Completed { reply, .. } => {
            match sessions.save_brd(id, &reply) {
                Ok(()) => info!(session_id = %id, chars = reply.len(), "BRD saved"),
                Err(e) => error!(session_id = %id, error = %e, "Failed to save BRD"),
            }
            None
        }
        other => other.body_text().map(|text| Ok::<_, Infallible>(text.to_string())),
    });

    Ok(text_stream(body))
}

/// GET /export_brd/{id}?format= - download the stored BRD.
pub async fn export_brd(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let id = parse_session_id(&id)?;
    let format: ExportFormat = params.format.as_deref().unwrap_or("txt").parse()?;
    let content = state
        .sessions
        .brd(id)?
        .ok_or(ChatError::BrdNotGenerated)?;

    let document = analyst_export::export(&content, id, format, Local::now().naive_local())?;
    if document.format != format {
        warn!(session_id = %id, requested = %format, served = %document.format, "Export format substituted");
    }
    info!(session_id = %id, format = %document.format, bytes = document.bytes.len(), "BRD exported");

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        document.bytes,
    )
        .into_response())
}

/// POST /analyze - one-shot structured analysis of a requirement.
pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let analysis = state.analyzer.analyze(&body.requirement).await?;
    Ok(Json(AnalyzeResponse { analysis }))
}
