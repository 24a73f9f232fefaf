// LanceDB vector database module
// Handles vector storage and similarity search for issue embeddings

pub mod vector_store;

use serde::{Deserialize, Serialize};

/// Embedding record stored in LanceDB. Everything else about the issue
/// lives in SQLite; the vector table is keyed by the issue id alone so a
/// search result can be joined back to its repository-scoped metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueEmbeddingRecord {
    /// Upstream issue id, matching `issues.id` in SQLite.
    pub issue_id: i64,
    /// The vector embedding for the issue's title and body.
    pub vector: Vec<f32>,
}

/// One nearest-neighbor hit, before the SQLite join.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub issue_id: i64,
    pub distance: f32,
}
