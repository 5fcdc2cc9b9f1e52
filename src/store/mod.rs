//! Vector storage.
//!
//! - `VectorStore`: the storage collaborator, scoped per index
//! - `KnowledgeBaseId`: validated index identifier
//! - `StorageHandle` / `ResourceCache`: one shared handle per knowledge base

pub mod cache;
pub mod knowledge_base;
pub mod memory;
pub mod weaviate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::errors::RagError;

pub use cache::{ResourceCache, StorageHandle};
pub use knowledge_base::KnowledgeBaseId;
pub use memory::MemoryVectorStore;
pub use weaviate::WeaviateStore;

/// A unit of text plus its metadata (`source`, `title`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn source(&self) -> &str {
        self.metadata_str("source").unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.metadata_str("title").unwrap_or_default()
    }
}

/// A document with its embedding, ready to be written under a fixed id.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: Uuid,
    pub document: Document,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub id: Uuid,
    pub document: Document,
    /// Similarity, higher is closer.
    pub score: f32,
}

/// The vector database, addressed by index name.
///
/// Missing indexes are reported distinctly: `aggregate_count` returns `None`
/// and `similarity_search` fails with `RagError::CollectionNotFound`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backing connection currently answers.
    async fn is_ready(&self) -> Result<bool, RagError>;

    /// Number of stored vectors, or `None` if the index does not exist.
    async fn aggregate_count(&self, index: &str) -> Result<Option<usize>, RagError>;

    /// Insert or replace records by id. Creates the index on first write.
    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<(), RagError>;

    /// Deletes the given ids, returning how many existed.
    async fn delete(&self, index: &str, ids: &[Uuid]) -> Result<usize, RagError>;

    async fn similarity_search(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RagError>;

    /// Distinct `source` metadata values stored in the index.
    async fn list_sources(&self, index: &str) -> Result<Vec<String>, RagError>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
