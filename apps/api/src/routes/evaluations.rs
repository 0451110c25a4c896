//! POST /api/v1/evaluations — the entry point of the pipeline.
//!
//! Accepts one multipart form carrying the job description, the opening
//! count and the CV files, runs the evaluation synchronously and returns the
//! outcome envelope.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::EvaluationRequest;
use crate::state::AppState;
use crate::uploads;

pub async fn create_evaluation(
    State(app): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let session_id = Uuid::new_v4().to_string();
    let mut job_description = String::new();
    let mut position_title = String::new();
    let mut required_candidates: usize = 1;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Upload(format!("Malformed multipart request: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "job_description" => {
                job_description = field
                    .text()
                    .await
                    .map_err(|e| AppError::Upload(format!("Invalid job_description: {e}")))?;
            }
            "position_title" => {
                position_title = field
                    .text()
                    .await
                    .map_err(|e| AppError::Upload(format!("Invalid position_title: {e}")))?;
            }
            "required_candidates" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Upload(format!("Invalid required_candidates: {e}")))?;
                required_candidates = raw.trim().parse().map_err(|_| {
                    AppError::Validation(format!(
                        "required_candidates must be a positive integer, got {raw:?}"
                    ))
                })?;
            }
            "files" => {
                let filename = field
                    .file_name()
                    .map(|n| n.to_string())
                    .ok_or_else(|| AppError::Upload("File field without a filename".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Upload(format!("Could not read {filename}: {e}")))?;

                let descriptor =
                    uploads::save_upload(&app.config.upload_dir, &session_id, &filename, &data)
                        .await?;
                info!(
                    "Stored upload {} ({})",
                    descriptor.filename,
                    uploads::format_file_size(descriptor.size_bytes)
                );
                files.push(descriptor);
            }
            other => {
                info!("Ignoring unknown multipart field {other:?}");
            }
        }
    }

    let outcome = app
        .pipeline
        .run_evaluation(EvaluationRequest {
            session_id,
            job_description,
            position_title,
            required_candidates,
            files,
        })
        .await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(outcome)).into_response())
}
