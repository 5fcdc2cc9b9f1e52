pub mod openai;
pub mod provider;
pub mod types;

pub use openai::{OpenAiCompatibleChat, OpenAiCompatibleEmbedder};
pub use provider::{ChatModel, Embedder, TextStream};
pub use types::{ChatMessage, ChatRequest, GenerationOptions};
