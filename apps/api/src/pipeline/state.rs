//! In-memory session state passed between pipeline stages, and the pure
//! result-aggregation logic shared by the finalize stage and cache
//! reconstruction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::chat::ChatMessageRow;
use crate::models::evaluation::EvaluationRecord;
use crate::models::file::FileDescriptor;
use crate::models::session::ProcessingStatus;
use crate::scoring::ParsedEvaluation;

/// Per-file output of the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file_id: Uuid,
    pub filename: String,
    pub extracted_text: String,
}

/// Per-file output of the scoring stage, before persistence.
#[derive(Debug, Clone)]
pub struct RawEvaluation {
    pub file_id: Uuid,
    pub filename: String,
    pub evaluation: ParsedEvaluation,
    pub raw_model_output: String,
    pub extracted_text: String,
}

/// One ranked candidate inside [`FinalResults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub file_id: Uuid,
    pub filename: String,
    pub score: f64,
    pub is_qualified: bool,
    pub evaluation: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

impl From<EvaluationRecord> for CandidateResult {
    fn from(record: EvaluationRecord) -> Self {
        CandidateResult {
            file_id: record.file_id,
            filename: record.filename,
            score: record.score,
            is_qualified: record.is_qualified,
            evaluation: record.evaluation_payload,
            extracted_text: record.extracted_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub best_score: f64,
    pub worst_score: f64,
    pub qualification_rate: f64,
}

/// Aggregated outcome of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResults {
    pub total_cvs: usize,
    pub qualified_count: usize,
    pub average_score: f64,
    pub top_candidates: Vec<CandidateResult>,
    pub all_evaluations: Vec<CandidateResult>,
    pub summary: ResultsSummary,
    pub qualified_candidates: Vec<CandidateResult>,
    pub rejected_candidates: Vec<CandidateResult>,
}

/// Outcome of the notification stage. Dispatch is best-effort: failures are
/// recorded here, never escalated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailStatus {
    pub rejections_dispatched: usize,
    pub interviews_scheduled: usize,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Working snapshot owned by one `run_evaluation` call, cached for readers
/// afterwards.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub session_title: String,
    pub job_description: String,
    pub position_title: String,
    pub required_candidates: usize,
    pub uploaded_files: Vec<FileDescriptor>,
    pub extracted_documents: Vec<ExtractedDocument>,
    pub raw_evaluations: Vec<RawEvaluation>,
    pub final_results: Option<FinalResults>,
    pub processing_status: ProcessingStatus,
    pub error: Option<String>,
    pub email_status: EmailStatus,
    pub chat_log: Vec<ChatMessageRow>,
}

impl SessionState {
    pub fn new(
        session_id: String,
        job_description: String,
        position_title: String,
        required_candidates: usize,
        uploaded_files: Vec<FileDescriptor>,
    ) -> Self {
        SessionState {
            session_id,
            session_title: String::new(),
            job_description,
            position_title,
            required_candidates,
            uploaded_files,
            extracted_documents: Vec::new(),
            raw_evaluations: Vec::new(),
            final_results: None,
            processing_status: ProcessingStatus::Initialized,
            error: None,
            email_status: EmailStatus::default(),
            chat_log: Vec::new(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Aggregates candidate results into [`FinalResults`].
///
/// Sort is by score descending and stable, so ties keep their input order.
/// `top_candidates` is the first `required_candidates` of the sorted list
/// regardless of qualification: the best available are shown even when none
/// qualify. The average includes zero-score fallbacks.
pub fn build_final_results(
    candidates: Vec<CandidateResult>,
    required_candidates: usize,
) -> FinalResults {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total_cvs = sorted.len();
    let qualified_count = sorted.iter().filter(|c| c.is_qualified).count();
    let average_score = if total_cvs > 0 {
        round2(sorted.iter().map(|c| c.score).sum::<f64>() / total_cvs as f64)
    } else {
        0.0
    };

    let summary = ResultsSummary {
        best_score: sorted.first().map(|c| c.score).unwrap_or(0.0),
        worst_score: sorted.last().map(|c| c.score).unwrap_or(0.0),
        qualification_rate: if total_cvs > 0 {
            round1(qualified_count as f64 / total_cvs as f64 * 100.0)
        } else {
            0.0
        },
    };

    FinalResults {
        total_cvs,
        qualified_count,
        average_score,
        top_candidates: sorted.iter().take(required_candidates).cloned().collect(),
        qualified_candidates: sorted.iter().filter(|c| c.is_qualified).cloned().collect(),
        rejected_candidates: sorted.iter().filter(|c| !c.is_qualified).cloned().collect(),
        all_evaluations: sorted,
        summary,
    }
}
