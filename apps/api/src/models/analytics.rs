use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Derived per-session counters, upserted lazily and incremented by every
/// upload, extraction, evaluation and chat event. `average_score` is kept
/// with the incremental-mean formula so it always equals the true mean of
/// recorded scores.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionAnalyticsRow {
    pub session_id: String,
    pub total_files_uploaded: i32,
    pub total_files_processed: i32,
    pub total_evaluations: i32,
    pub qualified_candidates: i32,
    pub average_score: f64,
    pub total_chat_messages: i32,
    pub last_activity_timestamp: DateTime<Utc>,
}

/// Global store-wide totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct DatabaseStats {
    pub total_sessions: i64,
    pub total_cvs: i64,
    pub total_evaluations: i64,
    pub average_score: f64,
}
