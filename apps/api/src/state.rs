use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::pipeline::store::SessionStore;
use crate::pipeline::EvaluationPipeline;
use crate::storage::PersistenceGateway;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub llm: LlmClient,
    pub pipeline: Arc<EvaluationPipeline>,
    pub sessions: Arc<SessionStore>,
}
