//! Per-knowledge-base storage handles.
//!
//! `ResourceCache` owns the single process-wide `VectorStore` connection and
//! hands out at most one `StorageHandle` per `KnowledgeBaseId`. Lookups take
//! a shared read lock; only a miss takes the construction mutex, re-checks,
//! and inserts. Neither lock is held across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use super::{Document, KnowledgeBaseId, ScoredDocument, VectorRecord, VectorStore};
use crate::core::errors::RagError;
use crate::llm::Embedder;

/// Client-side view of one knowledge base's vectors.
///
/// The target index is fixed at construction. Handles are shared by every
/// pipeline built for the same id.
pub struct StorageHandle {
    id: KnowledgeBaseId,
    index: String,
    client: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl StorageHandle {
    fn new(id: KnowledgeBaseId, client: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        let index = id.class_name();
        Self {
            id,
            index,
            client,
            embedder,
        }
    }

    pub fn id(&self) -> &KnowledgeBaseId {
        &self.id
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// `None` when nothing was ever written under this id.
    pub async fn count(&self) -> Result<Option<usize>, RagError> {
        self.client.aggregate_count(&self.index).await
    }

    /// Embeds `query` and returns the `k` closest documents.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let vector = self.embedder.embed_query(query).await?;
        self.client.similarity_search(&self.index, &vector, k).await
    }

    /// Embeds and writes documents under caller-chosen ids.
    pub async fn add_documents(&self, documents: Vec<(Uuid, Document)>) -> Result<(), RagError> {
        if documents.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = documents
            .iter()
            .map(|(_, doc)| doc.page_content.clone())
            .collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(RagError::Collaborator(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                vectors.len()
            )));
        }

        let records = documents
            .into_iter()
            .zip(vectors)
            .map(|((id, document), vector)| VectorRecord {
                id,
                document,
                vector,
            })
            .collect();

        self.client.upsert(&self.index, records).await
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<usize, RagError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.client.delete(&self.index, ids).await
    }

    pub async fn sources(&self) -> Result<Vec<String>, RagError> {
        self.client.list_sources(&self.index).await
    }
}

pub struct ResourceCache {
    client: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    handles: RwLock<HashMap<KnowledgeBaseId, Arc<StorageHandle>>>,
    construct_lock: Mutex<()>,
    constructed: AtomicUsize,
}

impl ResourceCache {
    pub fn new(client: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            client,
            embedder,
            handles: RwLock::new(HashMap::new()),
            construct_lock: Mutex::new(()),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Returns the handle for `id`, constructing it on first use.
    ///
    /// Concurrent first calls for the same id construct exactly once and all
    /// receive the same `Arc`.
    pub fn get_or_create(&self, id: &KnowledgeBaseId) -> Arc<StorageHandle> {
        if let Some(handle) = self.lookup(id) {
            return handle;
        }

        let _guard = self
            .construct_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = self.lookup(id) {
            return handle;
        }

        let handle = Arc::new(StorageHandle::new(
            id.clone(),
            self.client.clone(),
            self.embedder.clone(),
        ));
        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), handle.clone());
        let total = self.constructed.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(knowledge_base = %id, total, "Constructed storage handle");

        handle
    }

    fn lookup(&self, id: &KnowledgeBaseId) -> Option<Arc<StorageHandle>> {
        let guard = self.handles.read().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned()
    }

    /// The process-wide connection every handle queries through.
    pub fn shared_client(&self) -> Arc<dyn VectorStore> {
        self.client.clone()
    }

    /// Non-throwing readiness probe, for health reporting only.
    pub async fn is_ready(&self) -> bool {
        match self.client.is_ready().await {
            Ok(ready) => ready,
            Err(err) => {
                tracing::debug!("Vector store readiness probe failed: {}", err);
                false
            }
        }
    }

    /// How many handles have been constructed since start.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}
