use thiserror::Error;

use crate::core::errors::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to connect to vector store: {0}")]
    VectorStore(#[source] RagError),

    #[error("Failed to open record manager: {0}")]
    RecordManager(#[source] RagError),

    #[error("Failed to build document loader: {0}")]
    Loader(#[source] RagError),

    #[error("Failed to initialize LangSmith client: {0}")]
    LangSmith(#[source] RagError),
}
