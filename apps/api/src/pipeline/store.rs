//! Session-state cache with storage fallback.
//!
//! States produced by a pipeline run are served from memory; after a restart
//! (or for sessions evaluated elsewhere) the state is rebuilt from the
//! persistence gateway, producing the same `FinalResults` the finalize stage
//! computed.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::chat::{ChatMessageRow, MessageKind, Sender};
use crate::models::session::ProcessingStatus;
use crate::pipeline::state::{build_final_results, CandidateResult, EmailStatus, SessionState};
use crate::storage::PersistenceGateway;

pub struct SessionStore {
    gateway: Arc<dyn PersistenceGateway>,
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub async fn insert(&self, state: SessionState) -> Arc<SessionState> {
        let state = Arc::new(state);
        self.sessions
            .write()
            .await
            .insert(state.session_id.clone(), state.clone());
        state
    }

    pub async fn evict(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Cached state when present, otherwise a reconstruction from storage.
    /// `None` means the session does not exist at all.
    pub async fn get(&self, session_id: &str) -> Result<Option<Arc<SessionState>>> {
        if let Some(state) = self.sessions.read().await.get(session_id) {
            return Ok(Some(state.clone()));
        }

        let Some(state) = self.reconstruct(session_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.insert(state).await))
    }

    async fn reconstruct(&self, session_id: &str) -> Result<Option<SessionState>> {
        let Some(row) = self.gateway.get_session(session_id).await? else {
            return Ok(None);
        };

        let records = self.gateway.get_session_evaluations(session_id).await?;
        let final_results = if records.is_empty() {
            None
        } else {
            let candidates: Vec<CandidateResult> =
                records.into_iter().map(CandidateResult::from).collect();
            Some(build_final_results(
                candidates,
                row.required_candidates as usize,
            ))
        };

        let mut chat_log = self.gateway.get_chat_history(session_id, None).await?;
        chat_log.push(ChatMessageRow {
            message_id: Uuid::new_v4(),
            session_id: row.session_id.clone(),
            kind: MessageKind::System.as_str().to_string(),
            text: "Session restored from storage".to_string(),
            sender: Sender::System.as_str().to_string(),
            metadata: None,
            created_at: Utc::now(),
        });

        Ok(Some(SessionState {
            session_id: row.session_id,
            session_title: row.session_title,
            job_description: row.job_description,
            position_title: row.position_title,
            required_candidates: row.required_candidates as usize,
            uploaded_files: Vec::new(),
            extracted_documents: Vec::new(),
            raw_evaluations: Vec::new(),
            final_results,
            processing_status: ProcessingStatus::parse(&row.status)
                .unwrap_or(ProcessingStatus::Error),
            error: None,
            email_status: EmailStatus::default(),
            chat_log,
        }))
    }
}
