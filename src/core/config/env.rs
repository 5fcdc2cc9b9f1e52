use std::path::PathBuf;

use super::ConfigError;

const DEFAULT_LANGSMITH_ENDPOINT: &str = "https://api.smith.langchain.com";

/// Credentials and collaborator endpoints. All fields are mandatory.
#[derive(Clone)]
pub struct Secrets {
    pub weaviate_url: String,
    pub weaviate_api_key: String,
    pub zhipuai_api_key: String,
    pub record_manager_db_url: String,
    pub deepseek_api_key: String,
}

impl Secrets {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        Ok(Self {
            weaviate_url: require("WEAVIATE_URL")?,
            weaviate_api_key: require("WEAVIATE_API_KEY")?,
            zhipuai_api_key: require("ZHIPUAI_API_KEY")?,
            record_manager_db_url: require("RECORD_MANAGER_DB_URL")?,
            deepseek_api_key: require("DEEPSEEK_API_KEY")?,
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("weaviate_url", &self.weaviate_url)
            .field("weaviate_api_key", &"****")
            .field("zhipuai_api_key", &"****")
            .field("record_manager_db_url", &self.record_manager_db_url)
            .field("deepseek_api_key", &"****")
            .finish()
    }
}

/// Run tracing / feedback backend. Present only when `LANGCHAIN_API_KEY` is set.
#[derive(Clone)]
pub struct LangSmithConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl LangSmithConfig {
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("LANGCHAIN_API_KEY").filter(|v| !v.trim().is_empty())?;
        let endpoint = lookup("LANGCHAIN_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANGSMITH_ENDPOINT.to_string());
        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl std::fmt::Debug for LangSmithConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangSmithConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"****")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub force_update: bool,
}

impl RuntimeOptions {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(8080);

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_dir: lookup("KB_CHAT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            config_path: lookup("KB_CHAT_CONFIG_PATH").map(PathBuf::from),
            force_update: lookup("FORCE_UPDATE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
