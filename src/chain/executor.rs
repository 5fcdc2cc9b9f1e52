//! SwappableExecutor: the single "current pipeline" slot behind the chat endpoints.
//!
//! Every call reads the slot once, clones the `Arc` and releases the lock
//! before awaiting, so an invocation always finishes on the pipeline it
//! started with and never holds up a concurrent `rebind`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::runtime::{Handle, RuntimeFlavor};

use super::runnable::{ChatInput, ChatOutput, RunConfig, Runnable};
use crate::core::errors::RagError;
use crate::llm::TextStream;

#[derive(Default)]
pub struct SwappableExecutor {
    active: RwLock<Option<Arc<dyn Runnable>>>,
    generation: AtomicU64,
}

impl SwappableExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active pipeline. Last writer wins.
    pub fn rebind(&self, pipeline: Arc<dyn Runnable>) {
        let name = pipeline.name().to_string();
        let previous = {
            let mut slot = self.active.write().unwrap_or_else(|e| e.into_inner());
            slot.replace(pipeline)
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            pipeline = %name,
            previous = previous.as_ref().map(|p| p.name()).unwrap_or("none"),
            generation,
            "Rebound chat pipeline"
        );
    }

    /// The bound pipeline at this instant.
    pub fn snapshot(&self) -> Result<Arc<dyn Runnable>, RagError> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(RagError::NotConfigured)
    }

    pub fn is_bound(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Number of successful rebinds since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Synchronous form of [`Runnable::invoke`].
    ///
    /// Outside a runtime a private current-thread runtime drives the call.
    /// Inside a multi-thread runtime the worker is handed off with
    /// `block_in_place`. A current-thread runtime cannot be blocked on and
    /// is rejected.
    pub fn invoke_blocking(
        &self,
        input: ChatInput,
        config: &RunConfig,
    ) -> Result<ChatOutput, RagError> {
        let pipeline = self.snapshot()?;

        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| {
                    handle.block_on(pipeline.invoke(input, config))
                }),
                _ => Err(RagError::Collaborator(
                    "invoke_blocking called from a current-thread runtime; use invoke".into(),
                )),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(RagError::collaborator)?;
                runtime.block_on(pipeline.invoke(input, config))
            }
        }
    }
}

#[async_trait]
impl Runnable for SwappableExecutor {
    fn name(&self) -> &str {
        "swappable_executor"
    }

    async fn invoke(&self, input: ChatInput, config: &RunConfig) -> Result<ChatOutput, RagError> {
        let pipeline = self.snapshot()?;
        pipeline.invoke(input, config).await
    }

    async fn batch(
        &self,
        inputs: Vec<ChatInput>,
        config: &RunConfig,
    ) -> Result<Vec<ChatOutput>, RagError> {
        let pipeline = self.snapshot()?;
        pipeline.batch(inputs, config).await
    }

    async fn stream(&self, input: ChatInput, config: &RunConfig) -> Result<TextStream, RagError> {
        let pipeline = self.snapshot()?;
        pipeline.stream(input, config).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::testing::StubPipeline;

    fn question() -> ChatInput {
        ChatInput::new("what is X?")
    }

    #[tokio::test]
    async fn fresh_executor_is_not_configured() {
        let executor = SwappableExecutor::new();
        let err = executor
            .invoke(ChatInput::new("anything"), &RunConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, RagError::NotConfigured);
        assert!(!executor.is_bound());

        let err = executor.batch(vec![question()], &RunConfig::default()).await.unwrap_err();
        assert_eq!(err, RagError::NotConfigured);
        let err = executor.stream(question(), &RunConfig::default()).await.unwrap_err();
        assert_eq!(err, RagError::NotConfigured);
    }

    #[tokio::test]
    async fn rebind_switches_answers() {
        let executor = SwappableExecutor::new();

        executor.rebind(Arc::new(StubPipeline::new("a", "X is A")));
        let first = executor.invoke(question(), &RunConfig::default()).await.unwrap();
        assert_eq!(first.answer, "X is A");

        executor.rebind(Arc::new(StubPipeline::new("b", "X is B")));
        let second = executor.invoke(question(), &RunConfig::default()).await.unwrap();
        assert_eq!(second.answer, "X is B");
        assert_eq!(executor.generation(), 2);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let executor = SwappableExecutor::new();
        for i in 0..10 {
            executor.rebind(Arc::new(StubPipeline::new(
                &format!("p{i}"),
                &format!("answer {i}"),
            )));
        }
        let out = executor.invoke(question(), &RunConfig::default()).await.unwrap();
        assert_eq!(out.answer, "answer 9");
    }

    struct GatedPipeline {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Runnable for GatedPipeline {
        fn name(&self) -> &str {
            "gated"
        }

        async fn invoke(&self, _input: ChatInput, _config: &RunConfig) -> Result<ChatOutput, RagError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ChatOutput {
                answer: "old".into(),
                sources: Vec::new(),
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_invoke_finishes_on_captured_pipeline() {
        let executor = Arc::new(SwappableExecutor::new());
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        executor.rebind(Arc::new(GatedPipeline {
            entered: entered.clone(),
            release: release.clone(),
        }));

        let in_flight = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.invoke(question(), &RunConfig::default()).await })
        };

        entered.notified().await;
        // rebind must not wait for the in-flight call
        tokio::time::timeout(Duration::from_secs(1), async {
            executor.rebind(Arc::new(StubPipeline::new("new", "new")));
        })
        .await
        .unwrap();

        let fresh = executor.invoke(question(), &RunConfig::default()).await.unwrap();
        assert_eq!(fresh.answer, "new");

        release.notify_one();
        let old = in_flight.await.unwrap().unwrap();
        assert_eq!(old.answer, "old");
    }

    #[test]
    fn invoke_blocking_outside_runtime() {
        let executor = SwappableExecutor::new();
        assert_eq!(
            executor.invoke_blocking(question(), &RunConfig::default()).unwrap_err(),
            RagError::NotConfigured
        );

        executor.rebind(Arc::new(StubPipeline::new("a", "X is A")));
        let out = executor.invoke_blocking(question(), &RunConfig::default()).unwrap();
        assert_eq!(out.answer, "X is A");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invoke_blocking_inside_multi_thread_runtime() {
        let executor = Arc::new(SwappableExecutor::new());
        executor.rebind(Arc::new(StubPipeline::new("a", "X is A")));
        let out = tokio::spawn(async move {
            executor.invoke_blocking(question(), &RunConfig::default())
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out.answer, "X is A");
    }

    #[tokio::test]
    async fn invoke_blocking_rejects_current_thread_runtime() {
        let executor = SwappableExecutor::new();
        executor.rebind(Arc::new(StubPipeline::new("a", "X is A")));
        let err = executor.invoke_blocking(question(), &RunConfig::default()).unwrap_err();
        assert!(matches!(err, RagError::Collaborator(_)));
    }

    #[tokio::test]
    async fn batch_and_stream_are_forwarded() {
        let executor = SwappableExecutor::new();
        executor.rebind(Arc::new(StubPipeline::new("a", "X is A")));

        let outputs = executor
            .batch(vec![question(), question()], &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.answer == "X is A"));

        let mut rx = executor.stream(question(), &RunConfig::default()).await.unwrap();
        let mut streamed = String::new();
        while let Some(delta) = rx.recv().await {
            streamed.push_str(&delta.unwrap());
        }
        assert_eq!(streamed, "X is A");
    }

    struct InvokeOnly;

    #[async_trait]
    impl Runnable for InvokeOnly {
        fn name(&self) -> &str {
            "invoke_only"
        }

        async fn invoke(&self, input: ChatInput, _config: &RunConfig) -> Result<ChatOutput, RagError> {
            Ok(ChatOutput {
                answer: input.question,
                sources: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn unsupported_stream_fails_clearly() {
        let executor = SwappableExecutor::new();
        executor.rebind(Arc::new(InvokeOnly));
        let err = executor.stream(question(), &RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, RagError::NotImplemented(_)));
    }
}
