use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Evaluation joined with its owning file, as served by the gateway for
/// result reconstruction (ordered by score descending). Evaluations are
/// immutable once written; "latest" is by `created_at` when a file is
/// re-evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EvaluationRecord {
    pub file_id: Uuid,
    pub filename: String,
    pub score: f64,
    pub is_qualified: bool,
    pub evaluation_payload: Value,
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
}
