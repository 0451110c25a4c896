//! Persistence gateway: every durable fact the pipeline and handlers touch
//! goes through [`PersistenceGateway`]. `PgStore` is the PostgreSQL
//! implementation; tests use the in-memory double in [`memory`].
//!
//! Analytics counters are maintained here as single-statement upserts (the
//! incremental-mean formula runs inside the UPDATE) so concurrent sessions
//! cannot lose updates.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::analytics::{DatabaseStats, SessionAnalyticsRow};
use crate::models::chat::{ChatMessageRow, MessageKind, Sender};
use crate::models::evaluation::EvaluationRecord;
use crate::models::session::{ProcessingStatus, SessionRow, SessionSummary};

#[cfg(test)]
pub mod memory;

/// Sessions returned by a title/position search, newest first.
pub const SEARCH_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub session_id: &'a str,
    pub session_title: &'a str,
    pub job_description: &'a str,
    pub position_title: &'a str,
    pub required_candidates: i32,
}

#[derive(Debug, Clone)]
pub struct NewEvaluation<'a> {
    pub session_id: &'a str,
    pub file_id: Uuid,
    pub score: f64,
    pub is_qualified: bool,
    pub evaluation_payload: Value,
    pub raw_model_output: &'a str,
    pub model_identifier: &'a str,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Idempotent by `session_id`: a second call updates the existing row.
    async fn create_or_replace_session(&self, session: NewSession<'_>) -> Result<()>;

    async fn update_session_status(&self, session_id: &str, status: ProcessingStatus)
        -> Result<()>;

    /// Returns false when the session does not exist or the title is unchanged.
    async fn rename_session(&self, session_id: &str, title: &str) -> Result<bool>;

    /// Registers an uploaded file and returns its durable id.
    async fn add_file(
        &self,
        session_id: &str,
        filename: &str,
        storage_path: &str,
        mime_type: &str,
        size_bytes: i64,
    ) -> Result<Uuid>;

    async fn update_file_extracted_text(&self, file_id: Uuid, text: &str) -> Result<()>;

    async fn add_evaluation(&self, evaluation: NewEvaluation<'_>) -> Result<()>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>>;

    /// Latest evaluation per file, ordered by score descending (ties by
    /// evaluation time ascending, preserving insertion order).
    async fn get_session_evaluations(&self, session_id: &str) -> Result<Vec<EvaluationRecord>>;

    /// All sessions, most recent first, with per-session counts.
    async fn get_all_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Case-insensitive substring search over title and position.
    async fn search_sessions(&self, query: &str) -> Result<Vec<SessionSummary>>;

    /// Deletes the session and cascades to files, evaluations, chat and
    /// analytics. Returns false when the session did not exist.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    async fn append_chat_message(
        &self,
        session_id: &str,
        kind: MessageKind,
        text: &str,
        sender: Sender,
        metadata: Option<Value>,
    ) -> Result<()>;

    async fn get_chat_history(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessageRow>>;

    async fn clear_chat_history(&self, session_id: &str) -> Result<bool>;

    async fn get_session_analytics(&self, session_id: &str)
        -> Result<Option<SessionAnalyticsRow>>;

    async fn get_database_stats(&self) -> Result<DatabaseStats>;
}

/// PostgreSQL-backed gateway.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgStore {
    async fn create_or_replace_session(&self, session: NewSession<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (session_id, session_title, job_description, position_title, required_candidates)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id) DO UPDATE SET
                session_title = EXCLUDED.session_title,
                job_description = EXCLUDED.job_description,
                position_title = EXCLUDED.position_title,
                required_candidates = EXCLUDED.required_candidates,
                updated_at = now()
            "#,
        )
        .bind(session.session_id)
        .bind(session.session_title)
        .bind(session.job_description)
        .bind(session.position_title)
        .bind(session.required_candidates)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: ProcessingStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions SET
                status = $2,
                updated_at = now(),
                completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET session_title = $2, updated_at = now() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(title)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_file(
        &self,
        session_id: &str,
        filename: &str,
        storage_path: &str,
        mime_type: &str,
        size_bytes: i64,
    ) -> Result<Uuid> {
        let (file_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO uploaded_files (session_id, filename, storage_path, mime_type, size_bytes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING file_id
            "#,
        )
        .bind(session_id)
        .bind(filename)
        .bind(storage_path)
        .bind(mime_type)
        .bind(size_bytes)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_analytics (session_id, total_files_uploaded)
            VALUES ($1, 1)
            ON CONFLICT (session_id) DO UPDATE SET
                total_files_uploaded = session_analytics.total_files_uploaded + 1,
                last_activity_timestamp = now()
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(file_id)
    }

    async fn update_file_extracted_text(&self, file_id: Uuid, text: &str) -> Result<()> {
        let (session_id,): (String,) = sqlx::query_as(
            r#"
            UPDATE uploaded_files SET
                extracted_text = $2,
                processing_status = 'text_extracted',
                extraction_timestamp = now()
            WHERE file_id = $1
            RETURNING session_id
            "#,
        )
        .bind(file_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_analytics (session_id, total_files_processed)
            VALUES ($1, 1)
            ON CONFLICT (session_id) DO UPDATE SET
                total_files_processed = session_analytics.total_files_processed + 1,
                last_activity_timestamp = now()
            "#,
        )
        .bind(&session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_evaluation(&self, evaluation: NewEvaluation<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluations
                (session_id, file_id, score, is_qualified, evaluation_payload,
                 raw_model_output, model_identifier)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(evaluation.session_id)
        .bind(evaluation.file_id)
        .bind(evaluation.score)
        .bind(evaluation.is_qualified)
        .bind(&evaluation.evaluation_payload)
        .bind(evaluation.raw_model_output)
        .bind(evaluation.model_identifier)
        .execute(&self.pool)
        .await?;

        // Running mean: new_avg = old_avg + (score - old_avg) / new_count.
        sqlx::query(
            r#"
            INSERT INTO session_analytics
                (session_id, total_evaluations, qualified_candidates, average_score)
            VALUES ($1, 1, CASE WHEN $3 THEN 1 ELSE 0 END, $2)
            ON CONFLICT (session_id) DO UPDATE SET
                total_evaluations = session_analytics.total_evaluations + 1,
                qualified_candidates = session_analytics.qualified_candidates
                    + CASE WHEN $3 THEN 1 ELSE 0 END,
                average_score = session_analytics.average_score
                    + ($2 - session_analytics.average_score)
                      / (session_analytics.total_evaluations + 1),
                last_activity_timestamp = now()
            "#,
        )
        .bind(evaluation.session_id)
        .bind(evaluation.score)
        .bind(evaluation.is_qualified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn get_session_evaluations(&self, session_id: &str) -> Result<Vec<EvaluationRecord>> {
        let rows: Vec<EvaluationRecord> = sqlx::query_as(
            r#"
            SELECT file_id, filename, score, is_qualified, evaluation_payload,
                   extracted_text, created_at
            FROM (
                SELECT DISTINCT ON (e.file_id)
                       e.file_id, f.filename, e.score, e.is_qualified,
                       e.evaluation_payload, f.extracted_text, e.created_at
                FROM evaluations e
                JOIN uploaded_files f ON f.file_id = e.file_id
                WHERE e.session_id = $1
                ORDER BY e.file_id, e.created_at DESC
            ) latest
            ORDER BY score DESC, created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_all_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows: Vec<SessionSummary> = sqlx::query_as(
            r#"
            SELECT s.session_id, s.session_title, s.position_title,
                   CASE WHEN length(s.job_description) > 100
                        THEN left(s.job_description, 100) || '...'
                        ELSE s.job_description END AS job_description,
                   s.required_candidates, s.status, s.created_at,
                   COUNT(DISTINCT f.file_id) AS total_cvs,
                   COUNT(DISTINCT e.evaluation_id) AS total_evaluations
            FROM sessions s
            LEFT JOIN uploaded_files f ON f.session_id = s.session_id
            LEFT JOIN evaluations e ON e.session_id = s.session_id
            GROUP BY s.session_id
            ORDER BY s.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn search_sessions(&self, query: &str) -> Result<Vec<SessionSummary>> {
        let pattern = format!("%{}%", query);
        let rows: Vec<SessionSummary> = sqlx::query_as(
            r#"
            SELECT s.session_id, s.session_title, s.position_title,
                   CASE WHEN length(s.job_description) > 100
                        THEN left(s.job_description, 100) || '...'
                        ELSE s.job_description END AS job_description,
                   s.required_candidates, s.status, s.created_at,
                   COUNT(DISTINCT f.file_id) AS total_cvs,
                   COUNT(DISTINCT e.evaluation_id) AS total_evaluations
            FROM sessions s
            LEFT JOIN uploaded_files f ON f.session_id = s.session_id
            LEFT JOIN evaluations e ON e.session_id = s.session_id
            WHERE s.session_title ILIKE $1 OR s.position_title ILIKE $1
            GROUP BY s.session_id
            ORDER BY s.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(SEARCH_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        // Foreign keys cascade to files, evaluations, chat and analytics.
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted session {session_id} and all related data");
        }
        Ok(deleted)
    }

    async fn append_chat_message(
        &self,
        session_id: &str,
        kind: MessageKind,
        text: &str,
        sender: Sender,
        metadata: Option<Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (session_id, kind, text, sender, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session_id)
        .bind(kind.as_str())
        .bind(text)
        .bind(sender.as_str())
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_analytics (session_id, total_chat_messages)
            VALUES ($1, 1)
            ON CONFLICT (session_id) DO UPDATE SET
                total_chat_messages = session_analytics.total_chat_messages + 1,
                last_activity_timestamp = now()
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_chat_history(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessageRow>> {
        let rows: Vec<ChatMessageRow> = sqlx::query_as(
            r#"
            SELECT message_id, session_id, kind, text, sender, metadata, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn clear_chat_history(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_session_analytics(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionAnalyticsRow>> {
        let row: Option<SessionAnalyticsRow> =
            sqlx::query_as("SELECT * FROM session_analytics WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn get_database_stats(&self) -> Result<DatabaseStats> {
        let stats: DatabaseStats = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM sessions) AS total_sessions,
                   (SELECT COUNT(*) FROM uploaded_files) AS total_cvs,
                   (SELECT COUNT(*) FROM evaluations) AS total_evaluations,
                   COALESCE((SELECT AVG(score) FROM evaluations), 0) AS average_score
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
