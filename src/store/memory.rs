//! In-process [`VectorStore`] for local runs and tests.
//!
//! Indexes are `HashMap`s behind a `std::sync::RwLock`; search is brute-force
//! cosine similarity. Like the remote store, an index springs into existence
//! on its first upsert and persists (possibly empty) afterwards.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{cosine_similarity, Document, ScoredDocument, VectorRecord, VectorStore};
use crate::core::errors::RagError;

struct StoredVector {
    document: Document,
    vector: Vec<f32>,
}

pub struct MemoryVectorStore {
    indexes: RwLock<HashMap<String, HashMap<Uuid, StoredVector>>>,
    ready: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
        }
    }

    /// Flips the readiness probe, to simulate an unreachable backend.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_ready(&self) -> Result<bool, RagError> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn aggregate_count(&self, index: &str) -> Result<Option<usize>, RagError> {
        let indexes = self.indexes.read().unwrap_or_else(|e| e.into_inner());
        Ok(indexes.get(index).map(HashMap::len))
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<(), RagError> {
        let mut indexes = self.indexes.write().unwrap_or_else(|e| e.into_inner());
        let entries = indexes.entry(index.to_string()).or_default();
        for record in records {
            entries.insert(
                record.id,
                StoredVector {
                    document: record.document,
                    vector: record.vector,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, index: &str, ids: &[Uuid]) -> Result<usize, RagError> {
        let mut indexes = self.indexes.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = indexes.get_mut(index) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| entries.remove(id).is_some()).count())
    }

    async fn similarity_search(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let indexes = self.indexes.read().unwrap_or_else(|e| e.into_inner());
        let entries = indexes
            .get(index)
            .ok_or_else(|| RagError::CollectionNotFound(index.to_string()))?;

        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(id, stored)| ScoredDocument {
                id: *id,
                document: stored.document.clone(),
                score: cosine_similarity(vector, &stored.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn list_sources(&self, index: &str) -> Result<Vec<String>, RagError> {
        let indexes = self.indexes.read().unwrap_or_else(|e| e.into_inner());
        let entries = indexes
            .get(index)
            .ok_or_else(|| RagError::CollectionNotFound(index.to_string()))?;

        let sources: BTreeSet<String> = entries
            .values()
            .map(|stored| stored.document.source().to_string())
            .collect();
        Ok(sources.into_iter().collect())
    }
}
