//! In-memory `PersistenceGateway` double for tests. Mirrors the SQL
//! semantics that matter to the core: idempotent session creation, cascade
//! deletion, incremental analytics counters and latest-per-file evaluation
//! ordering.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::analytics::{DatabaseStats, SessionAnalyticsRow};
use crate::models::chat::{ChatMessageRow, MessageKind, Sender};
use crate::models::evaluation::EvaluationRecord;
use crate::models::session::{ProcessingStatus, SessionRow, SessionSummary};

use super::{NewEvaluation, NewSession, PersistenceGateway, SEARCH_PAGE_SIZE};

#[derive(Debug, Clone)]
struct StoredFile {
    file_id: Uuid,
    session_id: String,
    filename: String,
    extracted_text: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredEvaluation {
    session_id: String,
    file_id: Uuid,
    score: f64,
    is_qualified: bool,
    payload: Value,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRow>,
    files: Vec<StoredFile>,
    evaluations: Vec<StoredEvaluation>,
    chat: Vec<ChatMessageRow>,
    analytics: HashMap<String, SessionAnalyticsRow>,
    clock_ticks: i64,
}

impl Inner {
    // Strictly increasing timestamps so ordering assertions are stable.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock_ticks += 1;
        Utc::now() + Duration::milliseconds(self.clock_ticks)
    }

    fn analytics_entry(&mut self, session_id: &str) -> &mut SessionAnalyticsRow {
        self.analytics
            .entry(session_id.to_string())
            .or_insert_with(|| SessionAnalyticsRow {
                session_id: session_id.to_string(),
                total_files_uploaded: 0,
                total_files_processed: 0,
                total_evaluations: 0,
                qualified_candidates: 0,
                average_score: 0.0,
                total_chat_messages: 0,
                last_activity_timestamp: Utc::now(),
            })
    }
}

/// Shared-nothing in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn create_or_replace_session(&self, session: NewSession<'_>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.tick();
        match inner.sessions.get_mut(session.session_id) {
            Some(existing) => {
                existing.session_title = session.session_title.to_string();
                existing.job_description = session.job_description.to_string();
                existing.position_title = session.position_title.to_string();
                existing.required_candidates = session.required_candidates;
                existing.updated_at = now;
            }
            None => {
                inner.sessions.insert(
                    session.session_id.to_string(),
                    SessionRow {
                        session_id: session.session_id.to_string(),
                        session_title: session.session_title.to_string(),
                        job_description: session.job_description.to_string(),
                        position_title: session.position_title.to_string(),
                        required_candidates: session.required_candidates,
                        status: ProcessingStatus::Initialized.as_str().to_string(),
                        created_at: now,
                        updated_at: now,
                        completed_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.tick();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.status = status.as_str().to_string();
            session.updated_at = now;
            if status == ProcessingStatus::Completed {
                session.completed_at = Some(now);
            }
        }
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.tick();
        match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.session_title = title.to_string();
                session.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_file(
        &self,
        session_id: &str,
        filename: &str,
        _storage_path: &str,
        _mime_type: &str,
        _size_bytes: i64,
    ) -> Result<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(session_id) {
            bail!("session {session_id} does not exist");
        }
        let file_id = Uuid::new_v4();
        inner.files.push(StoredFile {
            file_id,
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            extracted_text: None,
        });
        inner.analytics_entry(session_id).total_files_uploaded += 1;
        Ok(file_id)
    }

    async fn update_file_extracted_text(&self, file_id: Uuid, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let session_id = {
            let file = inner
                .files
                .iter_mut()
                .find(|f| f.file_id == file_id)
                .ok_or_else(|| anyhow::anyhow!("file {file_id} does not exist"))?;
            file.extracted_text = Some(text.to_string());
            file.session_id.clone()
        };
        inner.analytics_entry(&session_id).total_files_processed += 1;
        Ok(())
    }

    async fn add_evaluation(&self, evaluation: NewEvaluation<'_>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let created_at = inner.tick();
        inner.evaluations.push(StoredEvaluation {
            session_id: evaluation.session_id.to_string(),
            file_id: evaluation.file_id,
            score: evaluation.score,
            is_qualified: evaluation.is_qualified,
            payload: evaluation.evaluation_payload.clone(),
            created_at,
        });

        let entry = inner.analytics_entry(evaluation.session_id);
        entry.total_evaluations += 1;
        if evaluation.is_qualified {
            entry.qualified_candidates += 1;
        }
        entry.average_score +=
            (evaluation.score - entry.average_score) / entry.total_evaluations as f64;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn get_session_evaluations(&self, session_id: &str) -> Result<Vec<EvaluationRecord>> {
        let inner = self.inner.lock().unwrap();

        // Latest evaluation per file.
        let mut latest: HashMap<Uuid, &StoredEvaluation> = HashMap::new();
        for eval in inner.evaluations.iter().filter(|e| e.session_id == session_id) {
            match latest.get(&eval.file_id) {
                Some(existing) if existing.created_at >= eval.created_at => {}
                _ => {
                    latest.insert(eval.file_id, eval);
                }
            }
        }

        let mut records: Vec<EvaluationRecord> = latest
            .into_values()
            .map(|e| {
                let filename = inner
                    .files
                    .iter()
                    .find(|f| f.file_id == e.file_id)
                    .map(|f| f.filename.clone())
                    .unwrap_or_default();
                let extracted_text = inner
                    .files
                    .iter()
                    .find(|f| f.file_id == e.file_id)
                    .and_then(|f| f.extracted_text.clone());
                EvaluationRecord {
                    file_id: e.file_id,
                    filename,
                    score: e.score,
                    is_qualified: e.is_qualified,
                    evaluation_payload: e.payload.clone(),
                    extracted_text,
                    created_at: e.created_at,
                }
            })
            .collect();

        records.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn get_all_sessions(&self) -> Result<Vec<SessionSummary>> {
        let inner = self.inner.lock().unwrap();
        let mut summaries: Vec<SessionSummary> = inner
            .sessions
            .values()
            .map(|s| summarize(&inner, s))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn search_sessions(&self, query: &str) -> Result<Vec<SessionSummary>> {
        let needle = query.to_lowercase();
        let mut summaries: Vec<SessionSummary> = {
            let inner = self.inner.lock().unwrap();
            inner
                .sessions
                .values()
                .filter(|s| {
                    s.session_title.to_lowercase().contains(&needle)
                        || s.position_title.to_lowercase().contains(&needle)
                })
                .map(|s| summarize(&inner, s))
                .collect()
        };
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(SEARCH_PAGE_SIZE as usize);
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.sessions.remove(session_id).is_some();
        if existed {
            inner.files.retain(|f| f.session_id != session_id);
            inner.evaluations.retain(|e| e.session_id != session_id);
            inner.chat.retain(|m| m.session_id != session_id);
            inner.analytics.remove(session_id);
        }
        Ok(existed)
    }

    async fn append_chat_message(
        &self,
        session_id: &str,
        kind: MessageKind,
        text: &str,
        sender: Sender,
        metadata: Option<Value>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let created_at = inner.tick();
        inner.chat.push(ChatMessageRow {
            message_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            kind: kind.as_str().to_string(),
            text: text.to_string(),
            sender: sender.as_str().to_string(),
            metadata,
            created_at,
        });
        inner.analytics_entry(session_id).total_chat_messages += 1;
        Ok(())
    }

    async fn get_chat_history(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessageRow>> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<ChatMessageRow> = inner
            .chat
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(limit) = limit {
            messages.truncate(limit as usize);
        }
        Ok(messages)
    }

    async fn clear_chat_history(&self, session_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.chat.len();
        inner.chat.retain(|m| m.session_id != session_id);
        Ok(inner.chat.len() < before)
    }

    async fn get_session_analytics(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionAnalyticsRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.analytics.get(session_id).cloned())
    }

    async fn get_database_stats(&self) -> Result<DatabaseStats> {
        let inner = self.inner.lock().unwrap();
        let total = inner.evaluations.len();
        let average_score = if total > 0 {
            inner.evaluations.iter().map(|e| e.score).sum::<f64>() / total as f64
        } else {
            0.0
        };
        Ok(DatabaseStats {
            total_sessions: inner.sessions.len() as i64,
            total_cvs: inner.files.len() as i64,
            total_evaluations: total as i64,
            average_score,
        })
    }
}

fn summarize(inner: &Inner, session: &SessionRow) -> SessionSummary {
    let job_description = if session.job_description.len() > 100 {
        format!("{}...", &session.job_description[..100])
    } else {
        session.job_description.clone()
    };
    SessionSummary {
        session_id: session.session_id.clone(),
        session_title: session.session_title.clone(),
        position_title: session.position_title.clone(),
        job_description,
        required_candidates: session.required_candidates,
        status: session.status.clone(),
        created_at: session.created_at,
        total_cvs: inner
            .files
            .iter()
            .filter(|f| f.session_id == session.session_id)
            .count() as i64,
        total_evaluations: inner
            .evaluations
            .iter()
            .filter(|e| e.session_id == session.session_id)
            .count() as i64,
    }
}
