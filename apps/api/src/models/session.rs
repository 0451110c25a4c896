use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One evaluation run scoped to a job description and a candidate pool.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub session_id: String,
    pub session_title: String,
    pub job_description: String,
    pub position_title: String,
    pub required_candidates: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Listing/search view: session header plus per-session counts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionSummary {
    pub session_id: String,
    pub session_title: String,
    pub position_title: String,
    pub job_description: String,
    pub required_candidates: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub total_cvs: i64,
    pub total_evaluations: i64,
}

/// Pipeline lifecycle states, persisted as text on the session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Initialized,
    Ready,
    FilesProcessed,
    TextExtracted,
    CvsEvaluated,
    ResultsFinalized,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initialized" => Some(ProcessingStatus::Initialized),
            "ready" => Some(ProcessingStatus::Ready),
            "files_processed" => Some(ProcessingStatus::FilesProcessed),
            "text_extracted" => Some(ProcessingStatus::TextExtracted),
            "cvs_evaluated" => Some(ProcessingStatus::CvsEvaluated),
            "results_finalized" => Some(ProcessingStatus::ResultsFinalized),
            "completed" => Some(ProcessingStatus::Completed),
            "error" => Some(ProcessingStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Initialized => "initialized",
            ProcessingStatus::Ready => "ready",
            ProcessingStatus::FilesProcessed => "files_processed",
            ProcessingStatus::TextExtracted => "text_extracted",
            ProcessingStatus::CvsEvaluated => "cvs_evaluated",
            ProcessingStatus::ResultsFinalized => "results_finalized",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
