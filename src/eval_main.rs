use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};

use kb_chat_backend::chain::{PipelineFactory, SwappableExecutor};
use kb_chat_backend::core::config::AppConfig;
use kb_chat_backend::core::logging;
use kb_chat_backend::evaluation::{evaluate, load_dataset};
use kb_chat_backend::llm::{GenerationOptions, OpenAiCompatibleChat, OpenAiCompatibleEmbedder};
use kb_chat_backend::store::{KnowledgeBaseId, ResourceCache, WeaviateStore};

const USAGE: &str = "usage: kb-chat-eval <dataset.jsonl> <index_name>";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(dataset), Some(index_name)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };

    let config = AppConfig::from_env().context("Invalid configuration")?;
    logging::init(&config.runtime.log_dir);

    let examples = load_dataset(&PathBuf::from(&dataset))?;
    if examples.is_empty() {
        bail!("dataset {} has no examples", dataset);
    }
    let id = KnowledgeBaseId::parse(&index_name)?;

    let secrets = &config.secrets;
    let settings = &config.settings;
    let store = WeaviateStore::new(&secrets.weaviate_url, &secrets.weaviate_api_key)?;
    let embedder = OpenAiCompatibleEmbedder::new(
        &settings.embedding.base_url,
        &secrets.zhipuai_api_key,
        &settings.embedding.model,
        settings.embedding.dimensions,
    );
    let chat = OpenAiCompatibleChat::new(
        &settings.generation.base_url,
        &secrets.deepseek_api_key,
        &settings.generation.model,
    );

    let cache = ResourceCache::new(Arc::new(store), Arc::new(embedder));
    let factory = PipelineFactory::new(
        Arc::new(cache),
        Arc::new(chat),
        settings.retrieval.k,
        GenerationOptions {
            temperature: Some(settings.generation.temperature),
            max_tokens: settings.generation.max_tokens,
        },
    );

    let executor = SwappableExecutor::new();
    executor.rebind(factory.build(&id).await?);

    tracing::info!(examples = examples.len(), knowledge_base = %id, "Starting evaluation");
    let report = evaluate(&executor, &examples).await;
    println!("{}", report);

    if report.results.is_empty() {
        bail!("every example failed");
    }
    Ok(())
}
