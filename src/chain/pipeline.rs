use std::sync::Arc;

use async_trait::async_trait;

use super::prompt::{format_docs, rephrase_prompt, response_system_prompt};
use super::runnable::{ChatInput, ChatOutput, RunConfig, Runnable, SourceDocument};
use crate::core::errors::RagError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, GenerationOptions, TextStream};
use crate::store::{ScoredDocument, StorageHandle};

/// Retriever + prompt + model + parser for one knowledge base.
///
/// Holds no per-request state; the same instance serves concurrent calls.
pub struct RetrievalPipeline {
    name: String,
    handle: Arc<StorageHandle>,
    model: Arc<dyn ChatModel>,
    k: usize,
    options: GenerationOptions,
}

impl RetrievalPipeline {
    pub fn new(
        handle: Arc<StorageHandle>,
        model: Arc<dyn ChatModel>,
        k: usize,
        options: GenerationOptions,
    ) -> Self {
        Self {
            name: format!("retrieval:{}", handle.id()),
            handle,
            model,
            k,
            options,
        }
    }

    pub fn handle(&self) -> &Arc<StorageHandle> {
        &self.handle
    }

    /// Rewrites a follow-up into a standalone question. No-op without history.
    async fn condense_question(&self, input: &ChatInput) -> Result<String, RagError> {
        if input.chat_history.is_empty() {
            return Ok(input.question.clone());
        }

        let request = ChatRequest::from_prompt(rephrase_prompt(&input.chat_history, &input.question))
            .with_options(GenerationOptions {
                temperature: Some(0.0),
                max_tokens: self.options.max_tokens,
            });
        let condensed = self.model.complete(request).await?;
        let condensed = condensed.trim();
        if condensed.is_empty() {
            Ok(input.question.clone())
        } else {
            Ok(condensed.to_string())
        }
    }

    async fn prepare(&self, input: &ChatInput) -> Result<(ChatRequest, Vec<ScoredDocument>), RagError> {
        let standalone = self.condense_question(input).await?;
        let docs = self.handle.similarity_search(&standalone, self.k).await?;
        tracing::debug!(
            knowledge_base = %self.handle.id(),
            retrieved = docs.len(),
            "Retrieved context"
        );

        let mut messages = Vec::with_capacity(input.chat_history.len() * 2 + 2);
        messages.push(ChatMessage::system(response_system_prompt(&format_docs(&docs))));
        for turn in &input.chat_history {
            messages.push(ChatMessage::user(turn.human.clone()));
            messages.push(ChatMessage::assistant(turn.ai.clone()));
        }
        messages.push(ChatMessage::user(input.question.clone()));

        Ok((ChatRequest::new(messages).with_options(self.options), docs))
    }
}

fn to_sources(docs: Vec<ScoredDocument>) -> Vec<SourceDocument> {
    docs.into_iter()
        .map(|scored| SourceDocument {
            source: scored.document.source().to_string(),
            title: scored.document.title().to_string(),
            content: scored.document.page_content,
        })
        .collect()
}

#[async_trait]
impl Runnable for RetrievalPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: ChatInput, _config: &RunConfig) -> Result<ChatOutput, RagError> {
        let (request, docs) = self.prepare(&input).await?;
        let answer = self.model.complete(request).await?;
        Ok(ChatOutput {
            answer: answer.trim().to_string(),
            sources: to_sources(docs),
        })
    }

    async fn stream(&self, input: ChatInput, _config: &RunConfig) -> Result<TextStream, RagError> {
        let (request, _docs) = self.prepare(&input).await?;
        self.model.stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::runnable::ChatTurn;
    use crate::store::{Document, KnowledgeBaseId, MemoryVectorStore, ResourceCache};
    use crate::testing::{HashEmbedder, StubChatModel};
    use uuid::Uuid;

    async fn seeded_handle() -> Arc<StorageHandle> {
        let cache = ResourceCache::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(32)),
        );
        let handle = cache.get_or_create(&KnowledgeBaseId::parse("kb1").unwrap());
        handle
            .add_documents(vec![
                (
                    Uuid::new_v4(),
                    Document::new("rust ownership rules")
                        .with_metadata("source", "https://a.example")
                        .with_metadata("title", "Ownership"),
                ),
                (
                    Uuid::new_v4(),
                    Document::new("gardening in spring").with_metadata("source", "https://b.example"),
                ),
            ])
            .await
            .unwrap();
        handle
    }

    #[tokio::test]
    async fn answers_with_retrieved_sources() {
        let model = Arc::new(StubChatModel::new(vec!["  X is ownership  "]));
        let pipeline = RetrievalPipeline::new(
            seeded_handle().await,
            model.clone(),
            1,
            GenerationOptions::default(),
        );

        let out = pipeline
            .invoke(ChatInput::new("rust ownership rules"), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(out.answer, "X is ownership");
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].source, "https://a.example");
        assert_eq!(out.sources[0].title, "Ownership");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[0].content.contains("<doc id='0'>rust ownership rules</doc>"));
        assert_eq!(requests[0].messages.last().unwrap().content, "rust ownership rules");
    }

    #[tokio::test]
    async fn history_triggers_condensing() {
        let model = Arc::new(StubChatModel::new(vec!["rust ownership rules", "answer"]));
        let pipeline = RetrievalPipeline::new(
            seeded_handle().await,
            model.clone(),
            2,
            GenerationOptions::default(),
        );

        let input = ChatInput::new("and borrowing?").with_history(vec![ChatTurn {
            human: "tell me about rust".into(),
            ai: "it is a language".into(),
        }]);
        let out = pipeline.invoke(input, &RunConfig::default()).await.unwrap();
        assert_eq!(out.answer, "answer");

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].messages[0].content.contains("Follow Up Input: and borrowing?"));
        // system + (user, assistant) + user
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[1].role, "user");
        assert_eq!(requests[1].messages[2].role, "assistant");
    }

    #[tokio::test]
    async fn stream_yields_model_deltas() {
        let model = Arc::new(StubChatModel::new(vec!["X is streamed"]));
        let pipeline =
            RetrievalPipeline::new(seeded_handle().await, model, 1, GenerationOptions::default());

        let mut rx = pipeline
            .stream(ChatInput::new("rust"), &RunConfig::default())
            .await
            .unwrap();
        let mut text = String::new();
        while let Some(delta) = rx.recv().await {
            text.push_str(&delta.unwrap());
        }
        assert_eq!(text, "X is streamed");
    }
}
