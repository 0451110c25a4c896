//! HTTP handlers for session management.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::state::AppState;

use super::{export, titles};

pub async fn list_sessions(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let sessions = app.gateway.get_all_sessions().await?;
    Ok(Json(json!({
        "total": sessions.len(),
        "sessions": sessions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

pub async fn search_sessions(
    State(app): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::Validation(
            "Search query must not be empty".to_string(),
        ));
    }

    let sessions = app.gateway.search_sessions(query).await?;
    Ok(Json(json!({
        "query": query,
        "total": sessions.len(),
        "sessions": sessions,
    })))
}

pub async fn get_session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let state = app
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    Ok(Json(json!({
        "session_id": state.session_id,
        "session_title": state.session_title,
        "position_title": state.position_title,
        "job_description": state.job_description,
        "required_candidates": state.required_candidates,
        "status": state.processing_status.as_str(),
        "error": state.error,
        "email_status": state.email_status,
        "results": state.final_results,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

pub async fn rename_session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<Value>, AppError> {
    let title = body.title.trim();
    titles::validate_session_title(title)
        .map_err(|reason| AppError::Validation(reason.to_string()))?;

    let renamed = app.gateway.rename_session(&session_id, title).await?;
    if !renamed {
        return Err(AppError::NotFound(format!(
            "Session '{session_id}' not found"
        )));
    }

    // Drop any cached snapshot carrying the old title.
    app.sessions.evict(&session_id).await;
    info!("Renamed session {session_id} to {title:?}");

    Ok(Json(json!({
        "session_id": session_id,
        "session_title": title,
    })))
}

pub async fn delete_session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = app.gateway.delete_session(&session_id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!(
            "Session '{session_id}' not found"
        )));
    }

    app.sessions.evict(&session_id).await;

    // Uploaded documents are grouped per session on disk.
    let upload_dir = std::path::Path::new(&app.config.upload_dir).join(&session_id);
    if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove uploads for {session_id}: {e}");
        }
    }

    Ok(Json(json!({
        "session_id": session_id,
        "deleted": true,
    })))
}

pub async fn session_analytics(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    app.gateway
        .get_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    let analytics = app.gateway.get_session_analytics(&session_id).await?;
    let evaluations = app.gateway.get_session_evaluations(&session_id).await?;
    let bands = super::score_bands(evaluations.iter().map(|e| e.score));
    Ok(Json(json!({
        "session_id": session_id,
        "analytics": analytics,
        "score_bands": bands,
    })))
}

pub async fn database_stats(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let stats = app.gateway.get_database_stats().await?;
    Ok(Json(json!(stats)))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

pub async fn export_session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let state = app
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    match params.format.as_deref().unwrap_or("json") {
        "json" => {
            let chat_history = app.gateway.get_chat_history(&session_id, None).await?;
            Ok(Json(export::export_json(&state, &chat_history)).into_response())
        }
        "csv" => {
            let results = state.final_results.as_ref().ok_or_else(|| {
                AppError::UnprocessableEntity(
                    "Session has no results to export yet".to_string(),
                )
            })?;
            let csv = export::export_csv(results);
            let disposition = format!("attachment; filename=\"{session_id}.csv\"");
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response())
        }
        other => Err(AppError::Validation(format!(
            "Unsupported export format '{other}'; use json or csv"
        ))),
    }
}
