pub mod chain;
pub mod core;
pub mod evaluation;
pub mod feedback;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod server;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
