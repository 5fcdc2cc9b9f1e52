//! The invocation capability set shared by pipelines and the executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::errors::RagError;
use crate::llm::TextStream;

/// One prior exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub human: String,
    pub ai: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInput {
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

impl ChatInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            chat_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.chat_history = history;
        self
    }
}

/// A retrieved chunk as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutput {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
}

/// Per-call configuration, accepted from clients under the `config` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub configurable: Map<String, Value>,
}

impl RunConfig {
    /// Returns `self` with a run id, generating one when absent.
    pub fn ensure_run_id(mut self) -> Self {
        if self.run_id.is_none() {
            self.run_id = Some(Uuid::new_v4());
        }
        self
    }
}

/// Anything that turns a [`ChatInput`] into a [`ChatOutput`].
///
/// `batch` and `stream` have defaults so a minimal implementation only needs
/// `invoke`; an unsupported `stream` fails with `NotImplemented`.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, input: ChatInput, config: &RunConfig) -> Result<ChatOutput, RagError>;

    /// Sequential invoke, stopping at the first error.
    async fn batch(
        &self,
        inputs: Vec<ChatInput>,
        config: &RunConfig,
    ) -> Result<Vec<ChatOutput>, RagError> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.invoke(input, config).await?);
        }
        Ok(outputs)
    }

    async fn stream(&self, _input: ChatInput, _config: &RunConfig) -> Result<TextStream, RagError> {
        Err(RagError::NotImplemented(format!("stream on {}", self.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_input_history_defaults_to_empty() {
        let input: ChatInput = serde_json::from_str(r#"{"question":"what is X?"}"#).unwrap();
        assert_eq!(input, ChatInput::new("what is X?"));
    }

    #[test]
    fn run_config_accepts_partial_json() {
        let config: RunConfig =
            serde_json::from_str(r#"{"tags":["web"],"metadata":{"user":"u1"}}"#).unwrap();
        assert_eq!(config.tags, vec!["web"]);
        assert_eq!(config.metadata["user"], "u1");
        assert!(config.run_id.is_none());
        assert!(config.configurable.is_empty());
    }

    #[test]
    fn ensure_run_id_keeps_existing_id() {
        let id = Uuid::new_v4();
        let config = RunConfig {
            run_id: Some(id),
            ..RunConfig::default()
        };
        assert_eq!(config.ensure_run_id().run_id, Some(id));
        assert!(RunConfig::default().ensure_run_id().run_id.is_some());
    }
}
