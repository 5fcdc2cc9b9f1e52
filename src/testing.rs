//! Offline collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chain::{ChatInput, ChatOutput, RunConfig, Runnable};
use crate::core::errors::RagError;
use crate::llm::{ChatModel, ChatRequest, Embedder, TextStream};

/// Hashed bag-of-words embedder. Identical texts embed identically.
pub struct HashEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
    embedded: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            embedded: AtomicUsize::new(0),
        }
    }

    /// Total texts embedded so far.
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Replays scripted replies in order, repeating the last one, and records
/// every request it receives.
pub struct StubChatModel {
    replies: Vec<String>,
    next: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
    fail_with: Option<String>,
}

impl StubChatModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(str::to_string).collect(),
            next: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn reply(&self, request: ChatRequest) -> Result<String, RagError> {
        self.requests.lock().unwrap().push(request);
        if let Some(message) = &self.fail_with {
            return Err(RagError::Collaborator(message.clone()));
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(reply)
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    fn model(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, RagError> {
        self.reply(request)
    }

    async fn stream(&self, request: ChatRequest) -> Result<TextStream, RagError> {
        let reply = self.reply(request)?;
        Ok(stream_words(&reply))
    }
}

/// A pipeline with a fixed answer, for executor and HTTP tests.
pub struct StubPipeline {
    name: String,
    answer: String,
}

impl StubPipeline {
    pub fn new(name: &str, answer: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl Runnable for StubPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _input: ChatInput, _config: &RunConfig) -> Result<ChatOutput, RagError> {
        Ok(ChatOutput {
            answer: self.answer.clone(),
            sources: Vec::new(),
        })
    }

    async fn stream(&self, _input: ChatInput, _config: &RunConfig) -> Result<TextStream, RagError> {
        Ok(stream_words(&self.answer))
    }
}

fn stream_words(text: &str) -> TextStream {
    let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
    let (tx, rx) = mpsc::channel(words.len().max(1));
    for word in words {
        let _ = tx.try_send(Ok(word));
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let embedder = HashEmbedder::new(16);
        let vectors = embedder
            .embed_documents(&["Rust ownership".into(), "rust OWNERSHIP".into(), "".into()])
            .await
            .unwrap();
        assert!((cosine_similarity(&vectors[0], &vectors[1]) - 1.0).abs() < 1e-6);
        assert!(vectors[2].iter().all(|v| *v == 0.0));
        assert_eq!(embedder.embedded(), 3);
    }

    #[tokio::test]
    async fn stub_model_repeats_last_reply() {
        let model = StubChatModel::new(vec!["one", "two"]);
        for expected in ["one", "two", "two"] {
            let reply = model.complete(ChatRequest::from_prompt("q")).await.unwrap();
            assert_eq!(reply, expected);
        }
        assert_eq!(model.requests().len(), 3);
    }
}
