use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Receiving end of a streamed completion. Each item is a text delta.
pub type TextStream = mpsc::Receiver<Result<String, RagError>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// model identifier as sent to the provider (e.g. "deepseek-chat")
    fn model(&self) -> &str;

    /// single-shot completion
    async fn complete(&self, request: ChatRequest) -> Result<String, RagError>;

    /// streamed completion
    async fn stream(&self, request: ChatRequest) -> Result<TextStream, RagError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// Vector width. Fixed for the lifetime of the process; every knowledge
    /// base shares it.
    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Collaborator("embedding provider returned no vector".into()))
    }
}
