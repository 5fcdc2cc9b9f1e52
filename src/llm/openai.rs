use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{ChatModel, Embedder, TextStream};
use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Chat completions against any OpenAI-compatible endpoint (DeepSeek by default).
#[derive(Clone)]
pub struct OpenAiCompatibleChat {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiCompatibleChat {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(s) = &request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        body
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, false);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| RagError::Collaborator("chat completion returned no content".into()))?
            .to_string();

        Ok(content)
    }

    async fn stream(&self, request: ChatRequest) -> Result<TextStream, RagError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, true);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "chat stream failed ({}): {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        for event in drain_sse_events(&mut buffer) {
                            match event {
                                SseEvent::Done => return,
                                SseEvent::Delta(content) => {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(RagError::collaborator(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Pulls every complete `data:` line out of `buffer`, leaving a trailing
/// partial line in place for the next network chunk.
///
/// The buffer holds raw bytes so a multi-byte character split across chunks
/// is only decoded once its line is complete.
fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<SseEvent> {
    let mut events = Vec::new();

    while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            events.push(SseEvent::Done);
            break;
        }
        if let Ok(json) = serde_json::from_str::<Value>(data) {
            if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                if !content.is_empty() {
                    events.push(SseEvent::Delta(content.to_string()));
                }
            }
        }
    }

    events
}

/// Embeddings against an OpenAI-compatible `/embeddings` endpoint (Zhipu by default).
#[derive(Clone)]
pub struct OpenAiCompatibleEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, dimensions: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimensions,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimensions,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "embedding request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await?;
        let embeddings = parse_embeddings(&payload);

        if embeddings.len() != texts.len() {
            return Err(RagError::Collaborator(format!(
                "embedding provider returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Reads `data[*].embedding`, ordered by `index` when the provider sends one.
fn parse_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let Some(data) = payload["data"].as_array() else {
        return Vec::new();
    };

    let mut indexed: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let vals = item["embedding"].as_array()?;
            let vector = vals
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            let index = item["index"].as_u64().unwrap_or(position as u64);
            Some((index, vector))
        })
        .collect();

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, vector)| vector).collect()
}
