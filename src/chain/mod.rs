//! Chat pipelines and the swappable executor that fronts them.

pub mod executor;
pub mod factory;
pub mod pipeline;
pub mod prompt;
pub mod runnable;

pub use executor::SwappableExecutor;
pub use factory::PipelineFactory;
pub use pipeline::RetrievalPipeline;
pub use runnable::{ChatInput, ChatOutput, ChatTurn, RunConfig, Runnable, SourceDocument};
