use std::sync::Arc;

use super::pipeline::RetrievalPipeline;
use crate::core::errors::RagError;
use crate::llm::{ChatModel, GenerationOptions};
use crate::store::{KnowledgeBaseId, ResourceCache};

/// Builds a [`RetrievalPipeline`] for a knowledge base, sharing storage
/// handles through the [`ResourceCache`].
pub struct PipelineFactory {
    cache: Arc<ResourceCache>,
    model: Arc<dyn ChatModel>,
    k: usize,
    options: GenerationOptions,
}

impl PipelineFactory {
    pub fn new(
        cache: Arc<ResourceCache>,
        model: Arc<dyn ChatModel>,
        k: usize,
        options: GenerationOptions,
    ) -> Self {
        Self {
            cache,
            model,
            k,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Fails with `CollectionNotFound` when nothing was ever stored under `id`.
    pub async fn build(&self, id: &KnowledgeBaseId) -> Result<Arc<RetrievalPipeline>, RagError> {
        let handle = self.cache.get_or_create(id);

        match handle.count().await? {
            Some(count) if count > 0 => {
                tracing::debug!(knowledge_base = %id, vectors = count, "Building pipeline");
            }
            _ => return Err(RagError::CollectionNotFound(id.to_string())),
        }

        Ok(Arc::new(RetrievalPipeline::new(
            handle,
            self.model.clone(),
            self.k,
            self.options,
        )))
    }
}
