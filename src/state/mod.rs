use std::sync::Arc;
use std::time::Duration;

use crate::chain::{PipelineFactory, SwappableExecutor};
use crate::core::config::{AppConfig, Settings};
use crate::feedback::LangSmithClient;
use crate::ingest::{Indexer, RecordManager, RecursiveCharacterSplitter, WebLoader};
use crate::knowledge::{KnowledgeService, QuestionGenerator};
use crate::llm::{
    ChatModel, Embedder, GenerationOptions, OpenAiCompatibleChat, OpenAiCompatibleEmbedder,
};
use crate::store::{ResourceCache, VectorStore, WeaviateStore};

pub mod error;

use error::InitializationError;

/// External services the process talks to.
pub struct Collaborators {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub records: Arc<RecordManager>,
    pub langsmith: Option<LangSmithClient>,
}

/// Global application state shared across all routes.
///
/// Contains references to:
/// - The executor every chat request goes through
/// - The per-knowledge-base handle cache
/// - Knowledge base creation / selection
/// - The optional LangSmith client for feedback and traces
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<SwappableExecutor>,
    pub cache: Arc<ResourceCache>,
    pub knowledge: Arc<KnowledgeService>,
    pub langsmith: Option<LangSmithClient>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Connects every collaborator named in `config`.
    ///
    /// The executor starts unbound; the first knowledge base created or
    /// selected binds it.
    pub async fn initialize(config: &AppConfig) -> Result<Arc<Self>, InitializationError> {
        let secrets = &config.secrets;
        let settings = &config.settings;

        let store = Arc::new(
            WeaviateStore::new(&secrets.weaviate_url, &secrets.weaviate_api_key)
                .map_err(InitializationError::VectorStore)?,
        );

        let records = Arc::new(
            RecordManager::connect(&secrets.record_manager_db_url)
                .await
                .map_err(InitializationError::RecordManager)?,
        );

        let embedder = Arc::new(OpenAiCompatibleEmbedder::new(
            &settings.embedding.base_url,
            &secrets.zhipuai_api_key,
            &settings.embedding.model,
            settings.embedding.dimensions,
        ));
        let chat = Arc::new(OpenAiCompatibleChat::new(
            &settings.generation.base_url,
            &secrets.deepseek_api_key,
            &settings.generation.model,
        ));

        let langsmith = match &config.langsmith {
            Some(ls) => Some(LangSmithClient::new(ls).map_err(InitializationError::LangSmith)?),
            None => {
                tracing::info!("LANGCHAIN_API_KEY not set; feedback and tracing disabled");
                None
            }
        };

        let collaborators = Collaborators {
            store,
            embedder,
            chat,
            records,
            langsmith,
        };
        Self::from_parts(
            collaborators,
            config.settings.clone(),
            config.runtime.force_update,
        )
    }

    /// Wires the application around already-constructed collaborators.
    pub fn from_parts(
        collaborators: Collaborators,
        settings: Settings,
        force_update: bool,
    ) -> Result<Arc<Self>, InitializationError> {
        let Collaborators {
            store,
            embedder,
            chat,
            records,
            langsmith,
        } = collaborators;

        let cache = Arc::new(ResourceCache::new(store, embedder));
        let options = GenerationOptions {
            temperature: Some(settings.generation.temperature),
            max_tokens: settings.generation.max_tokens,
        };
        let factory = Arc::new(PipelineFactory::new(
            cache.clone(),
            chat.clone(),
            settings.retrieval.k,
            options,
        ));
        let executor = Arc::new(SwappableExecutor::new());

        let ingest = &settings.ingest;
        let loader = WebLoader::new(Duration::from_secs(ingest.fetch_timeout_secs))
            .map_err(InitializationError::Loader)?;
        let knowledge = Arc::new(KnowledgeService::new(
            loader,
            RecursiveCharacterSplitter::new(ingest.chunk_size, ingest.chunk_overlap),
            Indexer::new(records, ingest.batch_size, force_update),
            QuestionGenerator::new(chat, settings.questions.clone()),
            factory,
            executor.clone(),
            ingest.min_chunk_chars,
        ));

        Ok(Arc::new(AppState {
            executor,
            cache,
            knowledge,
            langsmith,
            settings: Arc::new(settings),
        }))
    }
}
