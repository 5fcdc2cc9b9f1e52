//! Process configuration.
//!
//! Credentials and endpoints come from the environment and are required at
//! startup; tunables come from an optional YAML file and fall back to
//! defaults.

pub mod env;
pub mod settings;
pub mod validation;

use std::path::PathBuf;

use thiserror::Error;

pub use env::{LangSmithConfig, RuntimeOptions, Secrets};
pub use settings::{
    EmbeddingSettings, GenerationSettings, IngestSettings, QuestionSettings, RetrievalSettings,
    ServerSettings, Settings,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("invalid config at '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

/// Everything the composition root needs to build the process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub secrets: Secrets,
    pub langsmith: Option<LangSmithConfig>,
    pub runtime: RuntimeOptions,
    pub settings: Settings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let secrets = Secrets::from_lookup(lookup)?;
        let langsmith = LangSmithConfig::from_lookup(lookup);
        let runtime = RuntimeOptions::from_lookup(lookup);
        let settings = Settings::load(runtime.config_path.as_deref())?;

        Ok(Self {
            secrets,
            langsmith,
            runtime,
            settings,
        })
    }
}
