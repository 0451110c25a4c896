//! The CV evaluation pipeline.
//!
//! One `run_evaluation` call drives a session through six stages: initialize,
//! ingest, extract, score, finalize, notify. Per-file problems degrade to
//! zero-score fallback evaluations and the run continues; a stage-level
//! failure aborts the run and is reported through the outcome envelope
//! instead of an error return. Notification failures never fail the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extraction::{is_extraction_failure, TextExtractor};
use crate::models::chat::{ChatMessageRow, MessageKind, Sender};
use crate::models::file::FileDescriptor;
use crate::models::session::ProcessingStatus;
use crate::notify::{Notifier, NotifyCandidate};
use crate::scoring::{fallback_evaluation, parse_evaluation, CvScorer};
use crate::storage::{NewEvaluation, NewSession, PersistenceGateway};

pub mod state;
pub mod store;

use state::{
    build_final_results, CandidateResult, EmailStatus, ExtractedDocument, FinalResults,
    RawEvaluation, SessionState,
};
use store::SessionStore;

/// Ingest progress is narrated once per this many files.
const PROGRESS_BATCH: usize = 5;

/// Input to one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub session_id: String,
    pub job_description: String,
    pub position_title: String,
    pub required_candidates: usize,
    pub files: Vec<FileDescriptor>,
}

/// What the caller gets back, success or not. `chat_log` always carries the
/// narration accumulated up to the point the run ended.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub success: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<FinalResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub chat_log: Vec<ChatMessageRow>,
    pub status: String,
    pub email_status: EmailStatus,
}

pub struct EvaluationPipeline {
    gateway: Arc<dyn PersistenceGateway>,
    extractor: Arc<dyn TextExtractor>,
    scorer: Arc<dyn CvScorer>,
    notifier: Arc<dyn Notifier>,
    store: Arc<SessionStore>,
}

impl EvaluationPipeline {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        extractor: Arc<dyn TextExtractor>,
        scorer: Arc<dyn CvScorer>,
        notifier: Arc<dyn Notifier>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            gateway,
            extractor,
            scorer,
            notifier,
            store,
        }
    }

    fn validate(request: &EvaluationRequest) -> Result<(), String> {
        if request.job_description.trim().is_empty() {
            return Err("Job description must not be empty".to_string());
        }
        if request.required_candidates < 1 {
            return Err("At least one required candidate".to_string());
        }
        if request.files.is_empty() {
            return Err("At least one CV file is required".to_string());
        }
        Ok(())
    }

    /// Runs the full pipeline for one session. Never returns an error: every
    /// failure mode is folded into the outcome envelope.
    pub async fn run_evaluation(&self, request: EvaluationRequest) -> EvaluationOutcome {
        if let Err(message) = Self::validate(&request) {
            warn!("Rejected evaluation request: {message}");
            return EvaluationOutcome {
                success: false,
                session_id: request.session_id,
                results: None,
                error: Some(message),
                chat_log: Vec::new(),
                status: ProcessingStatus::Error.as_str().to_string(),
                email_status: EmailStatus::default(),
            };
        }

        let mut state = SessionState::new(
            request.session_id,
            request.job_description,
            request.position_title,
            request.required_candidates,
            request.files,
        );

        if let Err(e) = self.run_stages(&mut state).await {
            error!("Evaluation run for {} aborted: {e:#}", state.session_id);
            state.error = Some(format!("{e:#}"));
            state.processing_status = ProcessingStatus::Error;
            // Best effort: the abort may be the storage layer itself.
            let _ = self
                .gateway
                .update_session_status(&state.session_id, ProcessingStatus::Error)
                .await;
            let _ = self
                .narrate(
                    &mut state,
                    MessageKind::Error,
                    format!("Processing failed: {e:#}"),
                )
                .await;
        }

        let state = self.store.insert(state).await;
        EvaluationOutcome {
            success: state.error.is_none(),
            session_id: state.session_id.clone(),
            results: state.final_results.clone(),
            error: state.error.clone(),
            chat_log: state.chat_log.clone(),
            status: state.processing_status.as_str().to_string(),
            email_status: state.email_status.clone(),
        }
    }

    async fn run_stages(&self, state: &mut SessionState) -> Result<()> {
        self.initialize(state).await.context("initialize stage")?;
        self.ingest(state).await.context("ingest stage")?;
        self.extract(state).await.context("extract stage")?;
        self.score(state).await.context("score stage")?;
        self.finalize(state).await.context("finalize stage")?;

        // Notification is best-effort and must not fail the run.
        if let Err(e) = self.notify(state).await {
            error!("Notification stage failed for {}: {e:#}", state.session_id);
            state.email_status.error = Some(format!("{e:#}"));
        }

        self.set_status(state, ProcessingStatus::Completed).await?;
        Ok(())
    }

    async fn initialize(&self, state: &mut SessionState) -> Result<()> {
        state.session_title = crate::sessions::titles::generate_session_title(
            &state.position_title,
            &state.job_description,
            state.required_candidates,
            &state.session_id,
        );

        // The session row must exist before any narration can be recorded
        // against it. A rerun with the same id replaces the previous header.
        self.gateway
            .create_or_replace_session(NewSession {
                session_id: &state.session_id,
                session_title: &state.session_title,
                job_description: &state.job_description,
                position_title: &state.position_title,
                required_candidates: state.required_candidates as i32,
            })
            .await?;

        self.narrate(
            state,
            MessageKind::System,
            format!(
                "Session created: {} ({} CVs, {} position(s) to fill)",
                state.session_title,
                state.uploaded_files.len(),
                state.required_candidates
            ),
        )
        .await?;

        self.set_status(state, ProcessingStatus::Ready).await
    }

    async fn ingest(&self, state: &mut SessionState) -> Result<()> {
        let total = state.uploaded_files.len();
        self.narrate(
            state,
            MessageKind::System,
            format!("Processing {total} uploaded file(s)"),
        )
        .await?;

        let files = std::mem::take(&mut state.uploaded_files);
        let mut registered = Vec::with_capacity(files.len());
        for (index, file) in files.into_iter().enumerate() {
            let file_id = self
                .gateway
                .add_file(
                    &state.session_id,
                    &file.filename,
                    &file.storage_path,
                    &file.mime_type,
                    file.size_bytes,
                )
                .await?;

            registered.push(FileDescriptor {
                file_id: Some(file_id),
                ..file
            });

            let done = index + 1;
            if done % PROGRESS_BATCH == 0 && done < total {
                self.narrate(
                    state,
                    MessageKind::System,
                    format!("Registered {done}/{total} files"),
                )
                .await?;
            }
        }
        state.uploaded_files = registered;

        self.narrate(
            state,
            MessageKind::System,
            format!("All {total} file(s) registered"),
        )
        .await?;
        self.set_status(state, ProcessingStatus::FilesProcessed)
            .await
    }

    async fn extract(&self, state: &mut SessionState) -> Result<()> {
        let total = state.uploaded_files.len();
        self.narrate(
            state,
            MessageKind::System,
            format!("Extracting text from {total} document(s)"),
        )
        .await?;

        let files = state.uploaded_files.clone();
        for (index, file) in files.iter().enumerate() {
            let file_id = file
                .file_id
                .context("file was not registered during ingest")?;

            let text = self.extractor.extract(&file.storage_path).await;
            self.gateway
                .update_file_extracted_text(file_id, &text)
                .await?;

            let position = index + 1;
            if is_extraction_failure(&text) {
                self.narrate(
                    state,
                    MessageKind::Error,
                    format!(
                        "[{position}/{total}] {}: no text could be extracted",
                        file.filename
                    ),
                )
                .await?;
            } else {
                self.narrate(
                    state,
                    MessageKind::System,
                    format!(
                        "[{position}/{total}] {}: extracted {} characters",
                        file.filename,
                        text.len()
                    ),
                )
                .await?;
            }

            state.extracted_documents.push(ExtractedDocument {
                file_id,
                filename: file.filename.clone(),
                extracted_text: text,
            });
        }

        self.set_status(state, ProcessingStatus::TextExtracted).await
    }

    async fn score(&self, state: &mut SessionState) -> Result<()> {
        self.narrate(
            state,
            MessageKind::System,
            format!(
                "Evaluating {} CV(s) against the job description",
                state.extracted_documents.len()
            ),
        )
        .await?;

        let documents = state.extracted_documents.clone();
        for document in documents {
            // Files without usable text get a fallback verdict without ever
            // reaching the scorer.
            let (evaluation, raw_output) = if is_extraction_failure(&document.extracted_text) {
                (
                    fallback_evaluation("no usable text was extracted"),
                    String::new(),
                )
            } else {
                match self
                    .scorer
                    .score(&state.job_description, &document.extracted_text)
                    .await
                {
                    Ok(raw) => match parse_evaluation(&raw) {
                        Some(parsed) => (parsed, raw),
                        None => {
                            warn!(
                                "Unparseable scorer output for {}; recording fallback",
                                document.filename
                            );
                            (
                                fallback_evaluation("model output could not be parsed"),
                                raw,
                            )
                        }
                    },
                    Err(e) => {
                        warn!("Scoring failed for {}: {e}", document.filename);
                        (
                            fallback_evaluation(&format!("scoring failed: {e}")),
                            String::new(),
                        )
                    }
                }
            };

            let verdict = if evaluation.qualified {
                "Qualified"
            } else {
                "Not Qualified"
            };
            self.narrate(
                state,
                MessageKind::Result,
                format!(
                    "{}: {:.1}/10 - {verdict}",
                    document.filename, evaluation.overall_score
                ),
            )
            .await?;

            state.raw_evaluations.push(RawEvaluation {
                file_id: document.file_id,
                filename: document.filename,
                evaluation,
                raw_model_output: raw_output,
                extracted_text: document.extracted_text,
            });
        }

        self.set_status(state, ProcessingStatus::CvsEvaluated).await
    }

    async fn finalize(&self, state: &mut SessionState) -> Result<()> {
        let mut candidates = Vec::with_capacity(state.raw_evaluations.len());
        for raw in &state.raw_evaluations {
            let payload = serde_json::to_value(&raw.evaluation)?;
            self.gateway
                .add_evaluation(NewEvaluation {
                    session_id: &state.session_id,
                    file_id: raw.file_id,
                    score: raw.evaluation.overall_score,
                    is_qualified: raw.evaluation.qualified,
                    evaluation_payload: payload.clone(),
                    raw_model_output: &raw.raw_model_output,
                    model_identifier: self.scorer.model_identifier(),
                })
                .await?;

            candidates.push(CandidateResult {
                file_id: raw.file_id,
                filename: raw.filename.clone(),
                score: raw.evaluation.overall_score,
                is_qualified: raw.evaluation.qualified,
                evaluation: payload,
                extracted_text: Some(raw.extracted_text.clone()),
            });
        }

        let results = build_final_results(candidates, state.required_candidates);
        self.narrate(
            state,
            MessageKind::Summary,
            format!(
                "Evaluation complete: {}/{} candidate(s) qualified, average score {:.2}, best {:.1}",
                results.qualified_count,
                results.total_cvs,
                results.average_score,
                results.summary.best_score
            ),
        )
        .await?;

        state.final_results = Some(results);
        self.set_status(state, ProcessingStatus::ResultsFinalized)
            .await
    }

    async fn notify(&self, state: &mut SessionState) -> Result<()> {
        let results = state
            .final_results
            .as_ref()
            .context("notify stage reached without finalized results")?;

        let to_notify = |candidates: &[CandidateResult]| -> Vec<NotifyCandidate> {
            candidates
                .iter()
                .map(|c| NotifyCandidate {
                    filename: c.filename.clone(),
                    score: c.score,
                    extracted_text: c.extracted_text.clone().unwrap_or_default(),
                })
                .collect()
        };

        let rejected = to_notify(&results.rejected_candidates);
        let invited = to_notify(&results.qualified_candidates);
        let (rejected_count, invited_count) = (rejected.len(), invited.len());

        self.notifier.send_rejections(&state.position_title, rejected);
        self.notifier
            .schedule_interviews(&state.position_title, invited);

        state.email_status = EmailStatus {
            rejections_dispatched: rejected_count,
            interviews_scheduled: invited_count,
            dispatched_at: Some(Utc::now()),
            error: None,
        };

        self.narrate(
            state,
            MessageKind::System,
            format!(
                "Notifications dispatched: {rejected_count} rejection(s), {invited_count} interview invitation(s)"
            ),
        )
        .await
    }

    async fn set_status(&self, state: &mut SessionState, status: ProcessingStatus) -> Result<()> {
        self.gateway
            .update_session_status(&state.session_id, status)
            .await?;
        state.processing_status = status;
        info!("Session {} is now {status}", state.session_id);
        Ok(())
    }

    /// Persists one narration message and mirrors it into the in-memory log.
    async fn narrate(
        &self,
        state: &mut SessionState,
        kind: MessageKind,
        text: String,
    ) -> Result<()> {
        let sender = match kind {
            MessageKind::User => Sender::User,
            MessageKind::Result | MessageKind::Summary => Sender::Assistant,
            MessageKind::System | MessageKind::Error => Sender::System,
        };
        self.gateway
            .append_chat_message(&state.session_id, kind, &text, sender, None)
            .await?;
        state.chat_log.push(ChatMessageRow {
            message_id: Uuid::new_v4(),
            session_id: state.session_id.clone(),
            kind: kind.as_str().to_string(),
            text,
            sender: sender.as_str().to_string(),
            metadata: None,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extraction::EXTRACTION_ERROR_PREFIX;
    use crate::llm_client::LlmError;
    use crate::storage::memory::MemoryStore;

    struct MapExtractor {
        by_path: std::collections::HashMap<String, String>,
    }

    #[async_trait]
    impl TextExtractor for MapExtractor {
        async fn extract(&self, path: &str) -> String {
            self.by_path
                .get(path)
                .cloned()
                .unwrap_or_else(|| format!("{EXTRACTION_ERROR_PREFIX} no fixture for {path}"))
        }
    }

    /// Returns scripted responses in call order.
    struct ScriptedScorer {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    impl ScriptedScorer {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CvScorer for ScriptedScorer {
        async fn score(&self, _jd: &str, _cv_text: &str) -> Result<String, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scorer called more times than scripted")
        }

        fn model_identifier(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        rejections: Mutex<Vec<Vec<NotifyCandidate>>>,
        interviews: Mutex<Vec<Vec<NotifyCandidate>>>,
    }

    impl Notifier for RecordingNotifier {
        fn send_rejections(&self, _position: &str, candidates: Vec<NotifyCandidate>) {
            self.rejections.lock().unwrap().push(candidates);
        }

        fn schedule_interviews(&self, _position: &str, candidates: Vec<NotifyCandidate>) {
            self.interviews.lock().unwrap().push(candidates);
        }
    }

    fn file(name: &str) -> FileDescriptor {
        FileDescriptor {
            filename: name.to_string(),
            storage_path: format!("/tmp/{name}"),
            mime_type: "application/pdf".to_string(),
            size_bytes: 1024,
            file_id: None,
        }
    }

    fn scored(score: f64) -> Result<String, LlmError> {
        Ok(format!(
            r#"{{"overall_score": {score}, "qualified": false, "summary": "scripted"}}"#
        ))
    }

    struct Harness {
        gateway: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        scorer: Arc<ScriptedScorer>,
        store: Arc<SessionStore>,
        pipeline: EvaluationPipeline,
    }

    fn harness(
        extractions: Vec<(&str, &str)>,
        responses: Vec<Result<String, LlmError>>,
    ) -> Harness {
        let gateway: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let extractor = Arc::new(MapExtractor {
            by_path: extractions
                .into_iter()
                .map(|(name, text)| (format!("/tmp/{name}"), text.to_string()))
                .collect(),
        });
        let scorer = Arc::new(ScriptedScorer::new(responses));
        let notifier = Arc::new(RecordingNotifier::default());
        let store = SessionStore::new(gateway.clone());
        let pipeline = EvaluationPipeline::new(
            gateway.clone(),
            extractor,
            scorer.clone(),
            notifier.clone(),
            store.clone(),
        );
        Harness {
            gateway,
            notifier,
            scorer,
            store,
            pipeline,
        }
    }

    fn request(files: Vec<FileDescriptor>, required: usize) -> EvaluationRequest {
        EvaluationRequest {
            session_id: "session-1".to_string(),
            job_description: "We need a senior Rust engineer.".to_string(),
            position_title: "Rust Engineer".to_string(),
            required_candidates: required,
            files,
        }
    }

    #[tokio::test]
    async fn test_full_run_ranks_and_notifies() {
        let h = harness(
            vec![
                ("a.pdf", "Alice\nalice@example.com\nRust expert"),
                ("b.pdf", "Bob\nbob@example.com\nJunior"),
                ("c.pdf", "Carol\ncarol@example.com\nSolid"),
            ],
            vec![scored(9.0), scored(4.0), scored(7.5)],
        );

        let outcome = h
            .pipeline
            .run_evaluation(request(vec![file("a.pdf"), file("b.pdf"), file("c.pdf")], 2))
            .await;

        assert!(outcome.success, "unexpected error: {:?}", outcome.error);
        assert_eq!(outcome.status, "completed");

        let results = outcome.results.expect("results missing");
        assert_eq!(results.total_cvs, 3);
        assert_eq!(results.qualified_count, 2);
        assert_eq!(results.average_score, 6.83);
        assert_eq!(results.summary.qualification_rate, 66.7);
        assert_eq!(results.top_candidates.len(), 2);
        assert_eq!(results.top_candidates[0].filename, "a.pdf");
        assert_eq!(results.top_candidates[1].filename, "c.pdf");

        // Rejections and invitations each went out as one batch.
        assert_eq!(h.notifier.rejections.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.rejections.lock().unwrap()[0].len(), 1);
        assert_eq!(h.notifier.interviews.lock().unwrap()[0].len(), 2);
        assert_eq!(outcome.email_status.rejections_dispatched, 1);
        assert_eq!(outcome.email_status.interviews_scheduled, 2);

        // Narration includes one result line per CV.
        let result_lines: Vec<&ChatMessageRow> = outcome
            .chat_log
            .iter()
            .filter(|m| m.kind == "result")
            .collect();
        assert_eq!(result_lines.len(), 3);
        assert!(result_lines[0].text.contains("9.0/10"));

        let session = h
            .gateway
            .get_session("session-1")
            .await
            .unwrap()
            .expect("session not persisted");
        assert_eq!(session.status, "completed");
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_scorer() {
        let h = harness(
            vec![
                ("good.pdf", "Alice\nalice@example.com\nRust expert"),
                ("bad.pdf", "[extraction-error] scanner jam"),
            ],
            // Only the good file may reach the scorer.
            vec![scored(8.0)],
        );

        let outcome = h
            .pipeline
            .run_evaluation(request(vec![file("good.pdf"), file("bad.pdf")], 1))
            .await;

        assert!(outcome.success);
        assert_eq!(h.scorer.remaining(), 0);

        let results = outcome.results.unwrap();
        assert_eq!(results.total_cvs, 2);
        let bad = results
            .all_evaluations
            .iter()
            .find(|c| c.filename == "bad.pdf")
            .unwrap();
        assert_eq!(bad.score, 0.0);
        assert!(!bad.is_qualified);
        // The zero fallback still drags the average.
        assert_eq!(results.average_score, 4.0);
    }

    #[tokio::test]
    async fn test_unparseable_scorer_output_degrades_to_fallback() {
        let h = harness(
            vec![("cv.pdf", "Alice\nalice@example.com")],
            vec![Ok("I cannot evaluate this candidate.".to_string())],
        );

        let outcome = h.pipeline.run_evaluation(request(vec![file("cv.pdf")], 1)).await;

        assert!(outcome.success);
        let results = outcome.results.unwrap();
        assert_eq!(results.all_evaluations[0].score, 0.0);
        assert!(!results.all_evaluations[0].is_qualified);
    }

    #[tokio::test]
    async fn test_scorer_error_degrades_to_fallback() {
        let h = harness(
            vec![("cv.pdf", "Alice\nalice@example.com")],
            vec![Err(LlmError::EmptyContent)],
        );

        let outcome = h.pipeline.run_evaluation(request(vec![file("cv.pdf")], 1)).await;

        assert!(outcome.success, "per-file scorer errors must not abort");
        assert_eq!(outcome.results.unwrap().all_evaluations[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_validation_failures_return_error_envelope() {
        let h = harness(vec![], vec![]);

        let mut bad = request(vec![file("cv.pdf")], 1);
        bad.job_description = "  ".to_string();
        let outcome = h.pipeline.run_evaluation(bad).await;
        assert!(!outcome.success);
        assert_eq!(outcome.status, "error");
        assert!(outcome.error.unwrap().contains("Job description"));

        let outcome = h.pipeline.run_evaluation(request(vec![], 1)).await;
        assert!(!outcome.success);

        let outcome = h.pipeline.run_evaluation(request(vec![file("cv.pdf")], 0)).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_reconstructed_state_matches_run_results() {
        let h = harness(
            vec![
                ("a.pdf", "Alice\nalice@example.com\nRust expert"),
                ("b.pdf", "Bob\nbob@example.com\nJunior"),
                ("c.pdf", "Carol\ncarol@example.com\nSolid"),
            ],
            vec![scored(9.0), scored(4.0), scored(7.5)],
        );

        let outcome = h
            .pipeline
            .run_evaluation(request(vec![file("a.pdf"), file("b.pdf"), file("c.pdf")], 2))
            .await;
        assert!(outcome.success);

        // A cold cache forces reconstruction from the gateway.
        let cold_store = SessionStore::new(h.gateway.clone());
        let restored = cold_store
            .get("session-1")
            .await
            .unwrap()
            .expect("session should reconstruct");

        assert_eq!(restored.final_results.as_ref(), outcome.results.as_ref());
        assert_eq!(restored.processing_status, ProcessingStatus::Completed);
        let last = restored.chat_log.last().unwrap();
        assert_eq!(last.text, "Session restored from storage");
    }

    #[tokio::test]
    async fn test_cached_state_is_served_without_reconstruction() {
        let h = harness(
            vec![("cv.pdf", "Alice\nalice@example.com")],
            vec![scored(7.0)],
        );

        let outcome = h.pipeline.run_evaluation(request(vec![file("cv.pdf")], 1)).await;
        assert!(outcome.success);

        let state = h.store.get("session-1").await.unwrap().unwrap();
        // Cached states keep their full working set; reconstructions do not.
        assert!(!state.uploaded_files.is_empty());
        assert!(state
            .chat_log
            .iter()
            .all(|m| m.text != "Session restored from storage"));
    }

    #[tokio::test]
    async fn test_missing_session_is_none() {
        let h = harness(vec![], vec![]);
        assert!(h.store.get("nope").await.unwrap().is_none());
    }
}
