use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Upper bound on identifier length, in characters.
pub const MAX_ID_LEN: usize = 50;

const INDEX_SUFFIX: &str = "index_name";

/// Name of one knowledge base / vector index.
///
/// Always non-empty, at most [`MAX_ID_LEN`] characters, and limited to
/// `[a-z0-9_]`. Two sources whose titles normalize to the same string share
/// an id and therefore overwrite each other's index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KnowledgeBaseId(String);

impl KnowledgeBaseId {
    /// Validates an identifier supplied by a client.
    pub fn parse(raw: &str) -> Result<Self, RagError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RagError::InvalidInput("knowledge base id is empty".into()));
        }
        if raw.chars().count() > MAX_ID_LEN {
            return Err(RagError::InvalidInput(format!(
                "knowledge base id longer than {} characters",
                MAX_ID_LEN
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
        {
            return Err(RagError::InvalidInput(format!(
                "knowledge base id contains invalid character {:?}",
                bad
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Derives the id for a source from its title.
    ///
    /// Lowercases, drops everything but ASCII letters, digits and whitespace,
    /// turns whitespace runs into `_`, appends `_index_name`, collapses and
    /// trims underscores and cuts the result to [`MAX_ID_LEN`] characters.
    pub fn from_title(title: &str) -> Self {
        let lowered = title.to_lowercase();
        let kept: String = lowered
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
            .collect();
        let clean = kept.split_whitespace().collect::<Vec<_>>().join("_");
        let clean = clean.trim_matches('_');

        let candidate = format!("{}_{}", clean, INDEX_SUFFIX);
        let mut collapsed = String::with_capacity(candidate.len());
        for c in candidate.chars() {
            let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' };
            if c == '_' && collapsed.ends_with('_') {
                continue;
            }
            collapsed.push(c);
        }

        let trimmed = collapsed.trim_matches('_');
        Self(trimmed.chars().take(MAX_ID_LEN).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Index name as the vector database expects it (leading letter upper-cased).
    pub fn class_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    /// Scope under which ingestion records for this knowledge base are kept.
    pub fn record_scope(&self) -> String {
        format!("weaviate/{}", self.0)
    }
}

impl fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KnowledgeBaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KnowledgeBaseId {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KnowledgeBaseId> for String {
    fn from(id: KnowledgeBaseId) -> Self {
        id.0
    }
}
