//! Ingestion: fetch, extract, split, and reconcile documents into a knowledge base.

pub mod html;
pub mod indexer;
pub mod loader;
pub mod record_manager;
pub mod splitter;
pub mod url;

pub use indexer::{content_key, CleanupMode, IndexStats, Indexer};
pub use loader::WebLoader;
pub use record_manager::RecordManager;
pub use splitter::RecursiveCharacterSplitter;
