use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::validation::validate_settings;
use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            model: "embedding-3".to_string(),
            dimensions: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { k: 6 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub min_chunk_chars: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 4000,
            chunk_overlap: 200,
            batch_size: 64,
            min_chunk_chars: 10,
            fetch_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuestionSettings {
    pub temperature: f64,
    pub count: usize,
    pub max_context_chars: usize,
}

impl Default for QuestionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            count: 4,
            max_context_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub cors_allowed_origins: Vec<String>,
}

/// Tunables read from the optional YAML config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub ingest: IngestSettings,
    pub questions: QuestionSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Loads settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let value = match serde_yaml::from_str::<Value>(contents) {
            Ok(Value::Null) => Value::Object(Map::new()),
            Ok(value) => value,
            Err(err) => return Err(ConfigError::Parse(err.to_string())),
        };

        validate_settings(&value)?;
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
