//! Creating and selecting knowledge bases.
//!
//! Both operations finish by rebinding the shared executor, so the next chat
//! request is answered from the knowledge base just created or selected.

pub mod questions;

use std::sync::Arc;

use serde::Serialize;

use crate::chain::{PipelineFactory, SwappableExecutor};
use crate::core::errors::RagError;
use crate::ingest::url::{is_valid_url, resolve_title};
use crate::ingest::{CleanupMode, IndexStats, Indexer, RecursiveCharacterSplitter, WebLoader};
use crate::store::{Document, KnowledgeBaseId};

pub use questions::QuestionGenerator;

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeAdded {
    pub title: String,
    pub index_name: String,
    pub example_questions: Vec<String>,
    pub stats: IndexStats,
}

pub struct KnowledgeService {
    loader: WebLoader,
    splitter: RecursiveCharacterSplitter,
    indexer: Indexer,
    questions: QuestionGenerator,
    factory: Arc<PipelineFactory>,
    executor: Arc<SwappableExecutor>,
    min_chunk_chars: usize,
}

impl KnowledgeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loader: WebLoader,
        splitter: RecursiveCharacterSplitter,
        indexer: Indexer,
        questions: QuestionGenerator,
        factory: Arc<PipelineFactory>,
        executor: Arc<SwappableExecutor>,
        min_chunk_chars: usize,
    ) -> Self {
        Self {
            loader,
            splitter,
            indexer,
            questions,
            factory,
            executor,
            min_chunk_chars,
        }
    }

    /// Fetches `url`, indexes it under an id derived from its title and makes
    /// it the active knowledge base.
    pub async fn add_from_url(&self, url: &str) -> Result<KnowledgeAdded, RagError> {
        let url = url.trim();
        if !is_valid_url(url) {
            return Err(RagError::InvalidInput("Invalid URL format".to_string()));
        }

        let docs = self.loader.load(url).await.unwrap_or_else(|err| {
            tracing::warn!(url, "Failed to load URL: {}", err);
            Vec::new()
        });
        if docs.is_empty() {
            return Err(RagError::InvalidInput(
                "Failed to load content from URL".to_string(),
            ));
        }

        let title = resolve_title(&docs);
        let id = KnowledgeBaseId::from_title(&title);
        tracing::info!(url, title = %title, knowledge_base = %id, "Ingesting URL");
        self.warn_on_shared_id(&id, url).await;

        let stats = self.index(&id, &docs).await?;
        let example_questions = self.questions.generate(&docs[0].page_content).await;

        let pipeline = self.factory.build(&id).await?;
        self.executor.rebind(pipeline);

        Ok(KnowledgeAdded {
            title,
            index_name: id.to_string(),
            example_questions,
            stats,
        })
    }

    /// Makes an existing knowledge base active and lists its sources.
    pub async fn select(&self, index_name: &str) -> Result<Vec<String>, RagError> {
        let id = KnowledgeBaseId::parse(index_name)?;
        let pipeline = self.factory.build(&id).await?;
        let sources = pipeline.handle().sources().await?;
        self.executor.rebind(pipeline);
        Ok(sources)
    }

    async fn index(&self, id: &KnowledgeBaseId, docs: &[Document]) -> Result<IndexStats, RagError> {
        let chunks: Vec<Document> = self
            .splitter
            .split_documents(docs)
            .into_iter()
            .filter(|chunk| chunk.page_content.chars().count() > self.min_chunk_chars)
            .map(|mut chunk| {
                for key in ["source", "title"] {
                    chunk
                        .metadata
                        .entry(key)
                        .or_insert_with(|| serde_json::Value::String(String::new()));
                }
                chunk
            })
            .collect();

        // Full cleanup of an empty run would wipe whatever the id already holds.
        if chunks.is_empty() {
            tracing::warn!(knowledge_base = %id, "Page produced no usable chunks");
            return Err(RagError::InvalidInput(
                "Failed to load content from URL".to_string(),
            ));
        }

        let handle = self.factory.cache().get_or_create(id);
        self.indexer
            .reconcile(chunks, &id.record_scope(), &handle, CleanupMode::Full)
            .await
    }

    /// Distinct sources whose titles normalize alike share one index; the
    /// newer ingestion replaces the older one's data.
    async fn warn_on_shared_id(&self, id: &KnowledgeBaseId, url: &str) {
        let handle = self.factory.cache().get_or_create(id);
        if let Ok(sources) = handle.sources().await {
            if !sources.is_empty() && !sources.iter().any(|s| s == url) {
                tracing::warn!(
                    knowledge_base = %id,
                    url,
                    existing = ?sources,
                    "Knowledge base id already holds other sources; they will be replaced"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{response::Html, routing::get, Router};

    use super::*;
    use crate::chain::{ChatInput, RunConfig, Runnable};
    use crate::core::config::QuestionSettings;
    use crate::ingest::RecordManager;
    use crate::llm::GenerationOptions;
    use crate::store::{MemoryVectorStore, ResourceCache};
    use crate::testing::{HashEmbedder, StubChatModel};

    const PAGE: &str = "<html lang=\"en\"><head><title>Rust Notes!</title></head>\
        <body><p>Ownership means each value has exactly one owner.</p>\
        <p>Borrowing lets code use a value without taking ownership.</p></body></html>";

    async fn serve_page() -> String {
        let app = Router::new()
            .route("/notes", get(|| async { Html(PAGE) }))
            .route("/empty", get(|| async { Html("<html><body></body></html>") }))
            .route(
                "/placeholder",
                get(|| async {
                    Html("<html><head><title>Rust Notes!</title></head><body><p>Loading</p></body></html>")
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        service: KnowledgeService,
        executor: Arc<SwappableExecutor>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:///{}", dir.path().join("records.db").display());
        let records = Arc::new(RecordManager::connect(&url).await.unwrap());

        let model = Arc::new(StubChatModel::new(vec!["What is ownership?\nWhat is borrowing?"]));
        let cache = Arc::new(ResourceCache::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(32)),
        ));
        let factory = Arc::new(PipelineFactory::new(
            cache,
            model.clone(),
            4,
            GenerationOptions::default(),
        ));
        let executor = Arc::new(SwappableExecutor::new());

        let service = KnowledgeService::new(
            WebLoader::new(Duration::from_secs(5)).unwrap(),
            RecursiveCharacterSplitter::new(60, 10),
            Indexer::new(records, 64, false),
            QuestionGenerator::new(model, QuestionSettings::default()),
            factory,
            executor.clone(),
            10,
        );

        Fixture {
            _dir: dir,
            service,
            executor,
        }
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_fetching() {
        let fx = fixture().await;
        let err = fx.service.add_from_url("not a url").await.unwrap_err();
        assert_eq!(err, RagError::InvalidInput("Invalid URL format".into()));
        assert!(!fx.executor.is_bound());
    }

    #[tokio::test]
    async fn ingesting_a_page_binds_its_knowledge_base() {
        let fx = fixture().await;
        let base = serve_page().await;
        let url = format!("{base}/notes");

        let added = fx.service.add_from_url(&url).await.unwrap();
        assert_eq!(added.title, "Rust Notes!");
        assert_eq!(added.index_name, "rust_notes_index_name");
        assert!(added.stats.num_added >= 2);
        assert_eq!(
            added.example_questions,
            vec!["What is ownership?", "What is borrowing?"]
        );
        assert!(fx.executor.is_bound());

        let again = fx.service.add_from_url(&url).await.unwrap();
        assert_eq!(again.stats.num_added, 0);
        assert_eq!(again.stats.num_skipped, added.stats.num_added);

        let out = fx
            .executor
            .invoke(ChatInput::new("ownership"), &RunConfig::default())
            .await
            .unwrap();
        assert!(out.sources.iter().all(|s| s.source == url));
    }

    #[tokio::test]
    async fn empty_page_is_a_client_error() {
        let fx = fixture().await;
        let base = serve_page().await;
        let err = fx
            .service
            .add_from_url(&format!("{base}/empty"))
            .await
            .unwrap_err();
        assert_eq!(err, RagError::InvalidInput("Failed to load content from URL".into()));

        let err = fx
            .service
            .add_from_url(&format!("{base}/missing"))
            .await
            .unwrap_err();
        assert_eq!(err, RagError::InvalidInput("Failed to load content from URL".into()));
    }

    #[tokio::test]
    async fn select_unknown_knowledge_base() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.select("nothing_here").await,
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(
            fx.service.select("Bad-Name").await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(!fx.executor.is_bound());
    }

    #[tokio::test]
    async fn page_without_usable_chunks_keeps_existing_knowledge_base() {
        let fx = fixture().await;
        let base = serve_page().await;
        let url = format!("{base}/notes");
        let added = fx.service.add_from_url(&url).await.unwrap();
        let generation = fx.executor.generation();

        let err = fx
            .service
            .add_from_url(&format!("{base}/placeholder"))
            .await
            .unwrap_err();
        assert_eq!(err, RagError::InvalidInput("Failed to load content from URL".into()));
        assert_eq!(fx.executor.generation(), generation);

        let sources = fx.service.select("rust_notes_index_name").await.unwrap();
        assert_eq!(sources, vec![url]);
        let handle = fx
            .service
            .factory
            .cache()
            .get_or_create(&KnowledgeBaseId::parse("rust_notes_index_name").unwrap());
        assert_eq!(handle.count().await.unwrap(), Some(added.stats.num_added));
    }

    #[tokio::test]
    async fn select_returns_sources_and_rebinds() {
        let fx = fixture().await;
        let base = serve_page().await;
        let url = format!("{base}/notes");
        fx.service.add_from_url(&url).await.unwrap();

        let generation = fx.executor.generation();
        let sources = fx.service.select("rust_notes_index_name").await.unwrap();
        assert_eq!(sources, vec![url]);
        assert_eq!(fx.executor.generation(), generation + 1);
    }
}
