use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::chain::{ChatInput, RunConfig, Runnable};
use crate::core::errors::ApiError;
use crate::feedback::{LangSmithClient, RunRecord};
use crate::llm::TextStream;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub input: ChatInput,
    #[serde(default)]
    pub config: RunConfig,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub inputs: Vec<ChatInput>,
    #[serde(default)]
    pub config: RunConfig,
}

/// A run in progress, recorded to LangSmith when it finishes.
struct RunTrace {
    client: Option<LangSmithClient>,
    run_id: Uuid,
    name: &'static str,
    inputs: Value,
    config: RunConfig,
    start_time: DateTime<Utc>,
}

impl RunTrace {
    fn start(state: &AppState, name: &'static str, inputs: Value, config: RunConfig) -> Self {
        let config = config.ensure_run_id();
        Self {
            client: state.langsmith.clone(),
            run_id: config.run_id.unwrap_or_default(),
            name,
            inputs,
            config,
            start_time: Utc::now(),
        }
    }

    /// Records the run in the background; a recording failure is only logged.
    fn finish(self, outcome: Result<Value, String>) {
        let Some(client) = self.client else {
            return;
        };
        let (outputs, error) = match outcome {
            Ok(outputs) => (Some(outputs), None),
            Err(err) => (None, Some(err)),
        };
        let record = RunRecord {
            run_id: self.run_id,
            name: self.name.to_string(),
            inputs: self.inputs,
            outputs,
            error,
            start_time: self.start_time,
            end_time: Utc::now(),
            tags: self.config.tags,
            metadata: self.config.metadata,
        };
        tokio::spawn(async move {
            if let Err(err) = client.record_run(&record).await {
                tracing::warn!(run_id = %record.run_id, "Failed to record run: {}", err);
            }
        });
    }
}

pub async fn invoke(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InvokeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let trace = RunTrace::start(&state, "chat.invoke", json!(payload.input), payload.config);
    let run_id = trace.run_id;

    match state.executor.invoke(payload.input, &trace.config).await {
        Ok(output) => {
            trace.finish(Ok(json!(output)));
            Ok(Json(json!({
                "output": output,
                "metadata": { "run_id": run_id },
            })))
        }
        Err(err) => {
            trace.finish(Err(err.to_string()));
            Err(err.into())
        }
    }
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let trace = RunTrace::start(&state, "chat.batch", json!(payload.inputs), payload.config);
    let run_id = trace.run_id;

    match state.executor.batch(payload.inputs, &trace.config).await {
        Ok(outputs) => {
            trace.finish(Ok(json!(outputs)));
            Ok(Json(json!({
                "output": outputs,
                "metadata": { "run_ids": [run_id] },
            })))
        }
        Err(err) => {
            trace.finish(Err(err.to_string()));
            Err(err.into())
        }
    }
}

/// Server-sent events: one `metadata` event with the run id, a `data` event
/// per text delta, then a terminal `end` event. A failure mid-stream is
/// reported as an `error` event before `end`.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InvokeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let trace = RunTrace::start(&state, "chat.stream", json!(payload.input), payload.config);

    let deltas = match state.executor.stream(payload.input, &trace.config).await {
        Ok(deltas) => deltas,
        Err(err) => {
            trace.finish(Err(err.to_string()));
            return Err(err.into());
        }
    };

    let metadata = json_event("metadata", &json!({ "run_id": trace.run_id }));
    let events = stream::once(async move { Ok(metadata) }).chain(stream::unfold(
        StreamState::Open {
            deltas,
            answer: String::new(),
            trace,
        },
        next_event,
    ));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

enum StreamState {
    Open {
        deltas: TextStream,
        answer: String,
        trace: RunTrace,
    },
    Ending,
    Done,
}

async fn next_event(state: StreamState) -> Option<(Result<Event, Infallible>, StreamState)> {
    match state {
        StreamState::Open {
            mut deltas,
            mut answer,
            trace,
        } => match deltas.recv().await {
            Some(Ok(delta)) => {
                answer.push_str(&delta);
                let event = json_event("data", &Value::String(delta));
                Some((
                    Ok(event),
                    StreamState::Open {
                        deltas,
                        answer,
                        trace,
                    },
                ))
            }
            Some(Err(err)) => {
                trace.finish(Err(err.to_string()));
                let event = json_event(
                    "error",
                    &json!({ "status_code": 500, "message": err.to_string() }),
                );
                Some((Ok(event), StreamState::Ending))
            }
            None => {
                trace.finish(Ok(json!({ "answer": answer })));
                Some((Ok(Event::default().event("end")), StreamState::Done))
            }
        },
        StreamState::Ending => Some((Ok(Event::default().event("end")), StreamState::Done)),
        StreamState::Done => None,
    }
}

fn json_event(name: &str, value: &Value) -> Event {
    Event::default().event(name).data(value.to_string())
}
