//! Weaviate REST/GraphQL client.
//!
//! Each knowledge base is a Weaviate class. Vectors are computed client side
//! (`vectorizer: none`); the page text lives in the `text` property and
//! `source` / `title` are always present so retrieval queries never hit a
//! missing property.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{Document, ScoredDocument, VectorRecord, VectorStore};
use crate::core::errors::RagError;

const TEXT_KEY: &str = "text";
const ATTRIBUTES: [&str; 2] = ["source", "title"];

#[derive(Clone)]
pub struct WeaviateStore {
    base_url: String,
    api_key: String,
    client: Client,
}

impl WeaviateStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RagError> {
        let client = Client::builder()
            .build()
            .map_err(RagError::collaborator)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    async fn class_exists(&self, class: &str) -> Result<bool, RagError> {
        let url = format!("{}/v1/schema/{}", self.base_url, class);
        let res = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        match res.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(RagError::Collaborator(format!(
                "weaviate schema lookup for {} failed: {}",
                class, status
            ))),
        }
    }

    async fn graphql(&self, query: String) -> Result<Value, RagError> {
        let url = format!("{}/v1/graphql", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "weaviate graphql error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await?;
        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                return Err(RagError::Collaborator(format!(
                    "weaviate graphql error: {}",
                    messages.join("; ")
                )));
            }
        }
        Ok(payload)
    }

    /// Runs a query against `class`, turning a failure on a missing class into
    /// `CollectionNotFound`.
    async fn query_class(&self, class: &str, query: String) -> Result<Value, RagError> {
        match self.graphql(query).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                if !self.class_exists(class).await? {
                    return Err(RagError::CollectionNotFound(class.to_string()));
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl VectorStore for WeaviateStore {
    fn name(&self) -> &str {
        "weaviate"
    }

    async fn is_ready(&self) -> Result<bool, RagError> {
        let url = format!("{}/v1/.well-known/ready", self.base_url);
        let res = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        Ok(res.status().is_success())
    }

    async fn aggregate_count(&self, index: &str) -> Result<Option<usize>, RagError> {
        if !self.class_exists(index).await? {
            return Ok(None);
        }
        let payload = self.graphql(aggregate_count_query(index)).await?;
        Ok(Some(parse_aggregate_count(&payload, index)))
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let objects: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "class": index,
                    "id": record.id.to_string(),
                    "properties": build_properties(&record.document),
                    "vector": record.vector,
                })
            })
            .collect();

        let url = format!("{}/v1/batch/objects", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "objects": objects }))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "weaviate batch import failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await?;
        let errors = batch_errors(&payload);
        if !errors.is_empty() {
            return Err(RagError::Collaborator(format!(
                "weaviate rejected {} object(s): {}",
                errors.len(),
                errors.join("; ")
            )));
        }
        Ok(())
    }

    async fn delete(&self, index: &str, ids: &[Uuid]) -> Result<usize, RagError> {
        let mut deleted = 0;
        for id in ids {
            let url = format!("{}/v1/objects/{}/{}", self.base_url, index, id);
            let res = self.client.delete(&url).bearer_auth(&self.api_key).send().await?;
            match res.status() {
                StatusCode::NOT_FOUND => {}
                status if status.is_success() => deleted += 1,
                status => {
                    return Err(RagError::Collaborator(format!(
                        "weaviate delete of {} failed: {}",
                        id, status
                    )))
                }
            }
        }
        Ok(deleted)
    }

    async fn similarity_search(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let payload = self
            .query_class(index, near_vector_query(index, vector, k))
            .await?;
        Ok(parse_near_vector(&payload, index))
    }

    async fn list_sources(&self, index: &str) -> Result<Vec<String>, RagError> {
        let payload = self.query_class(index, group_by_source_query(index)).await?;
        Ok(parse_grouped_sources(&payload, index))
    }
}

fn aggregate_count_query(class: &str) -> String {
    format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", class)
}

fn near_vector_query(class: &str, vector: &[f32], k: usize) -> String {
    let vector = serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {class}(nearVector: {{vector: {vector}}}, limit: {k}) {{ {text} {attrs} _additional {{ id distance }} }} }} }}",
        class = class,
        vector = vector,
        k = k.max(1),
        text = TEXT_KEY,
        attrs = ATTRIBUTES.join(" "),
    )
}

fn group_by_source_query(class: &str) -> String {
    format!(
        "{{ Aggregate {{ {}(groupBy: [\"source\"]) {{ groupedBy {{ value }} }} }} }}",
        class
    )
}

fn build_properties(document: &Document) -> Value {
    let mut properties = Map::new();
    for (key, value) in &document.metadata {
        if !is_property_name(key) || key == TEXT_KEY {
            continue;
        }
        if value.is_string() || value.is_number() || value.is_boolean() {
            properties.insert(key.clone(), value.clone());
        }
    }
    for attr in ATTRIBUTES {
        properties
            .entry(attr.to_string())
            .or_insert_with(|| Value::String(String::new()));
    }
    properties.insert(
        TEXT_KEY.to_string(),
        Value::String(document.page_content.clone()),
    );
    Value::Object(properties)
}

fn is_property_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

fn parse_aggregate_count(payload: &Value, class: &str) -> usize {
    payload["data"]["Aggregate"][class][0]["meta"]["count"]
        .as_u64()
        .unwrap_or(0) as usize
}

fn parse_near_vector(payload: &Value, class: &str) -> Vec<ScoredDocument> {
    let Some(items) = payload["data"]["Get"][class].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item["_additional"]["id"]
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok())?;
            let distance = item["_additional"]["distance"].as_f64().unwrap_or(1.0) as f32;

            let mut document = Document::new(item[TEXT_KEY].as_str().unwrap_or_default());
            for attr in ATTRIBUTES {
                let value = item[attr].as_str().unwrap_or_default();
                document = document.with_metadata(attr, value);
            }

            Some(ScoredDocument {
                id,
                document,
                score: 1.0 - distance,
            })
        })
        .collect()
}

fn parse_grouped_sources(payload: &Value, class: &str) -> Vec<String> {
    let Some(groups) = payload["data"]["Aggregate"][class].as_array() else {
        return Vec::new();
    };
    groups
        .iter()
        .filter_map(|group| group["groupedBy"]["value"].as_str())
        .map(str::to_string)
        .collect()
}

fn batch_errors(payload: &Value) -> Vec<String> {
    let Some(items) = payload.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .flat_map(|item| {
            item["result"]["errors"]["error"]
                .as_array()
                .cloned()
                .unwrap_or_default()
        })
        .filter_map(|err| err["message"].as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_always_carry_text_source_and_title() {
        let doc = Document::new("body")
            .with_metadata("source", "https://example.com")
            .with_metadata("language", "en")
            .with_metadata("bad-key", "dropped")
            .with_metadata("nested", json!({ "a": 1 }))
            .with_metadata("text", "shadowed");

        let props = build_properties(&doc);
        assert_eq!(props["text"], "body");
        assert_eq!(props["source"], "https://example.com");
        assert_eq!(props["title"], "");
        assert_eq!(props["language"], "en");
        assert!(props.get("bad-key").is_none());
        assert!(props.get("nested").is_none());
    }

    #[test]
    fn near_vector_query_shape() {
        let query = near_vector_query("Docs_index_name", &[0.5, 1.0], 4);
        assert!(query.starts_with("{ Get { Docs_index_name(nearVector: {vector: [0.5,1.0]}, limit: 4)"));
        assert!(query.contains("text source title _additional { id distance }"));
    }

    #[test]
    fn parses_near_vector_results() {
        let id = Uuid::new_v4();
        let payload = json!({
            "data": { "Get": { "Kb": [
                {
                    "text": "chunk",
                    "source": "https://example.com",
                    "title": "Example",
                    "_additional": { "id": id.to_string(), "distance": 0.25 }
                },
                { "text": "no id", "_additional": {} }
            ]}}
        });

        let hits = parse_near_vector(&payload, "Kb");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].document.title(), "Example");
        assert!((hits[0].score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn parses_aggregates() {
        let count = json!({ "data": { "Aggregate": { "Kb": [ { "meta": { "count": 3 } } ] } } });
        assert_eq!(parse_aggregate_count(&count, "Kb"), 3);

        let groups = json!({ "data": { "Aggregate": { "Kb": [
            { "groupedBy": { "value": "https://a" } },
            { "groupedBy": { "value": "https://b" } }
        ] } } });
        assert_eq!(parse_grouped_sources(&groups, "Kb"), vec!["https://a", "https://b"]);
    }

    #[test]
    fn collects_batch_errors() {
        let payload = json!([
            { "result": {} },
            { "result": { "errors": { "error": [ { "message": "vector length mismatch" } ] } } }
        ]);
        assert_eq!(batch_errors(&payload), vec!["vector length mismatch"]);
    }
}
