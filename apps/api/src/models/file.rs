use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptor for a file handed to the pipeline before it has a durable id.
/// The ingest stage fills in `file_id` as each file is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
}
