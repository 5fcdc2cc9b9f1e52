//! Content-addressed reconciliation of documents against a storage handle.
//!
//! Each document is keyed by a hash of its content and metadata. Keys already
//! recorded under the scope are skipped, new keys are embedded and written,
//! and (with cleanup) records the run did not touch are removed from both the
//! record table and the vector store.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::record_manager::RecordManager;
use crate::core::errors::RagError;
use crate::store::{Document, StorageHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Never delete.
    None,
    /// Delete stale records whose source appears in this run.
    Incremental,
    /// Delete every record in scope this run did not touch.
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_added: usize,
    pub num_updated: usize,
    pub num_skipped: usize,
    pub num_deleted: usize,
}

/// Hash key and vector id for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub key: String,
    pub id: Uuid,
}

/// SHA-256 over the content and the canonical (key-sorted) metadata JSON;
/// the id is built from the first 16 bytes of that digest.
pub fn content_key(document: &Document) -> ContentKey {
    let metadata = serde_json::to_string(&document.metadata).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(document.page_content.as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    let id = uuid::Builder::from_random_bytes(bytes).into_uuid();

    ContentKey {
        key: id.to_string(),
        id,
    }
}

pub struct Indexer {
    records: Arc<RecordManager>,
    batch_size: usize,
    force_update: bool,
}

impl Indexer {
    pub fn new(records: Arc<RecordManager>, batch_size: usize, force_update: bool) -> Self {
        Self {
            records,
            batch_size: batch_size.max(1),
            force_update,
        }
    }

    pub async fn reconcile(
        &self,
        documents: Vec<Document>,
        scope: &str,
        handle: &StorageHandle,
        cleanup: CleanupMode,
    ) -> Result<IndexStats, RagError> {
        let run_start = self.records.now();
        let mut stats = IndexStats::default();

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(documents.len());
        for document in documents {
            let key = content_key(&document);
            if seen.insert(key.key.clone()) {
                unique.push((key, document));
            } else {
                stats.num_skipped += 1;
            }
        }

        for batch in unique.chunks(self.batch_size) {
            let keys: Vec<String> = batch.iter().map(|(k, _)| k.key.clone()).collect();
            let groups: Vec<String> = batch.iter().map(|(_, d)| d.source().to_string()).collect();
            let exists = self.records.exists(scope, &keys).await?;

            let mut to_write = Vec::new();
            for ((key, document), recorded) in batch.iter().zip(exists) {
                match (recorded, self.force_update) {
                    (true, false) => stats.num_skipped += 1,
                    (true, true) => {
                        stats.num_updated += 1;
                        to_write.push((key.id, document.clone()));
                    }
                    (false, _) => {
                        stats.num_added += 1;
                        to_write.push((key.id, document.clone()));
                    }
                }
            }

            handle.add_documents(to_write).await?;
            self.records
                .update(scope, &keys, &groups, self.records.now().max(run_start))
                .await?;

            if cleanup == CleanupMode::Incremental {
                let mut sources: Vec<String> = groups.clone();
                sources.sort();
                sources.dedup();
                let stale = self.records.list_keys(scope, run_start, Some(&sources)).await?;
                stats.num_deleted += self.remove(scope, handle, &stale).await?;
            }
        }

        if cleanup == CleanupMode::Full {
            let stale = self.records.list_keys(scope, run_start, None).await?;
            stats.num_deleted += self.remove(scope, handle, &stale).await?;
        }

        tracing::info!(
            scope,
            added = stats.num_added,
            updated = stats.num_updated,
            skipped = stats.num_skipped,
            deleted = stats.num_deleted,
            "Indexing finished"
        );
        Ok(stats)
    }

    async fn remove(
        &self,
        scope: &str,
        handle: &StorageHandle,
        keys: &[String],
    ) -> Result<usize, RagError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = keys
            .iter()
            .filter_map(|key| Uuid::parse_str(key).ok())
            .collect();
        handle.delete(&ids).await?;
        self.records.delete_keys(scope, keys).await?;
        Ok(keys.len())
    }
}
