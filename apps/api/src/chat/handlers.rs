//! HTTP handlers for the per-session chat surface.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

async fn require_session(app: &AppState, session_id: &str) -> Result<(), AppError> {
    app.gateway
        .get_session(session_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))
}

pub async fn history(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, AppError> {
    require_session(&app, &session_id).await?;
    let messages = app.gateway.get_chat_history(&session_id, params.limit).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "messages": messages,
    })))
}

pub async fn ask(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<AskRequest>,
) -> Result<Json<Value>, AppError> {
    let session = app
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    let answer =
        super::answer_question(&app.llm, app.gateway.as_ref(), &session, &body.question).await?;

    Ok(Json(json!({
        "session_id": session_id,
        "question": body.question.trim(),
        "answer": answer,
    })))
}

pub async fn clear(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_session(&app, &session_id).await?;
    let cleared = app.gateway.clear_chat_history(&session_id).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "cleared": cleared,
    })))
}
