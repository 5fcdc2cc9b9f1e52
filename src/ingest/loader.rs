use std::time::Duration;

use reqwest::Client;

use super::html::{extract_metadata, extract_text};
use crate::core::errors::RagError;
use crate::store::Document;

/// Fetches a single web page as a document carrying `source`, `title`,
/// `description` and `language` metadata.
#[derive(Clone)]
pub struct WebLoader {
    client: Client,
}

impl WebLoader {
    pub fn new(timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kb-chat-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RagError::collaborator)?;
        Ok(Self { client })
    }

    /// Returns no documents when the page has no visible text.
    pub async fn load(&self, url: &str) -> Result<Vec<Document>, RagError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RagError::Collaborator(format!(
                "fetching {} returned {}",
                url,
                response.status()
            )));
        }

        let html = response.text().await?;
        let text = extract_text(&html);
        if text.is_empty() {
            tracing::warn!(url, "Page has no extractable text");
            return Ok(Vec::new());
        }

        let meta = extract_metadata(&html);
        let document = Document::new(text)
            .with_metadata("source", url)
            .with_metadata("title", meta.title)
            .with_metadata("description", meta.description)
            .with_metadata("language", meta.language);

        Ok(vec![document])
    }
}
