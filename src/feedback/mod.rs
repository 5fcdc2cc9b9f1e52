//! LangSmith client: user feedback, run recording and trace share links.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::core::config::LangSmithConfig;
use crate::core::errors::RagError;

/// A feedback score: LangSmith accepts numbers and booleans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Bool(bool),
    Number(f64),
}

fn default_feedback_key() -> String {
    "user_score".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub run_id: Uuid,
    #[serde(default = "default_feedback_key")]
    pub key: String,
    #[serde(default)]
    pub score: Option<Score>,
    #[serde(default)]
    pub feedback_id: Option<Uuid>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackUpdate {
    pub feedback_id: Uuid,
    #[serde(default)]
    pub score: Option<Score>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A finished chain run, as recorded for tracing.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub name: String,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Bounded exponential backoff for trace lookups: `base`, `2*base`, `4*base`...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Clone)]
pub struct LangSmithClient {
    endpoint: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

impl LangSmithClient {
    pub fn new(config: &LangSmithConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(RagError::collaborator)?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.endpoint, path))
            .header("x-api-key", &self.api_key)
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Value, RagError> {
        let res = builder.send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Collaborator(format!(
                "langsmith {} failed ({}): {}",
                what, status, text
            )));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(RagError::collaborator)
    }

    /// Returns the feedback id.
    pub async fn create_feedback(&self, feedback: &FeedbackRequest) -> Result<Uuid, RagError> {
        let id = feedback.feedback_id.unwrap_or_else(Uuid::new_v4);
        let body = json!({
            "id": id,
            "run_id": feedback.run_id,
            "key": feedback.key,
            "score": feedback.score,
            "comment": feedback.comment,
        });
        self.send(self.request(Method::POST, "/feedback").json(&body), "create feedback")
            .await?;
        Ok(id)
    }

    pub async fn update_feedback(&self, update: &FeedbackUpdate) -> Result<(), RagError> {
        let mut body = Map::new();
        if let Some(score) = update.score {
            body.insert("score".to_string(), json!(score));
        }
        if let Some(comment) = &update.comment {
            body.insert("comment".to_string(), json!(comment));
        }
        let path = format!("/feedback/{}", update.feedback_id);
        self.send(
            self.request(Method::PATCH, &path).json(&Value::Object(body)),
            "update feedback",
        )
        .await?;
        Ok(())
    }

    pub async fn read_run(&self, run_id: Uuid) -> Result<Value, RagError> {
        self.send(self.request(Method::GET, &format!("/runs/{run_id}")), "read run")
            .await
    }

    /// The share token, if the run was already shared.
    pub async fn shared_token(&self, run_id: Uuid) -> Result<Option<String>, RagError> {
        let payload = self
            .send(
                self.request(Method::GET, &format!("/runs/{run_id}/share")),
                "read share state",
            )
            .await?;
        Ok(payload
            .get("share_token")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub async fn run_is_shared(&self, run_id: Uuid) -> Result<bool, RagError> {
        Ok(self.shared_token(run_id).await?.is_some())
    }

    /// Shares the run and returns its public URL.
    pub async fn share_run(&self, run_id: Uuid) -> Result<String, RagError> {
        let body = json!({ "run_id": run_id, "share_token": Uuid::new_v4() });
        let payload = self
            .send(
                self.request(Method::PUT, &format!("/runs/{run_id}/share")).json(&body),
                "share run",
            )
            .await?;
        let token = payload
            .get("share_token")
            .and_then(Value::as_str)
            .ok_or_else(|| RagError::Collaborator("langsmith share returned no token".into()))?;
        Ok(self.public_url(token))
    }

    pub async fn record_run(&self, run: &RunRecord) -> Result<(), RagError> {
        let body = json!({
            "id": run.run_id,
            "name": run.name,
            "run_type": "chain",
            "inputs": run.inputs,
            "outputs": run.outputs,
            "error": run.error,
            "start_time": run.start_time.to_rfc3339(),
            "end_time": run.end_time.to_rfc3339(),
            "tags": run.tags,
            "extra": { "metadata": run.metadata },
        });
        self.send(self.request(Method::POST, "/runs").json(&body), "record run")
            .await?;
        Ok(())
    }

    /// Public URL for `run_id`, waiting for the run to become readable first.
    ///
    /// Runs are recorded asynchronously, so `read_run` is polled up to
    /// `retry.attempts` times with exponential backoff. The link is resolved
    /// even if the run never became readable.
    pub async fn trace_url(&self, run_id: Uuid) -> Result<String, RagError> {
        for attempt in 0..self.retry.attempts {
            match self.read_run(run_id).await {
                Ok(_) => break,
                Err(err) => {
                    let delay = self.retry.delay(attempt);
                    tracing::debug!(%run_id, attempt, ?delay, "Run not readable yet: {}", err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        match self.shared_token(run_id).await? {
            Some(token) => Ok(self.public_url(&token)),
            None => self.share_run(run_id).await,
        }
    }

    /// The web UI host for this API endpoint.
    fn host_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches("/api").trim_end_matches("/api/v1");
        if let Some((scheme, rest)) = endpoint.split_once("://") {
            if let Some(stripped) = rest.strip_prefix("api.") {
                return format!("{scheme}://{stripped}");
            }
        }
        endpoint.to_string()
    }

    fn public_url(&self, token: &str) -> String {
        format!("{}/public/{}/r", self.host_url(), token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};

    use super::*;

    #[derive(Default)]
    struct Mock {
        reads: AtomicUsize,
        ready_after: usize,
        shared: Mutex<Option<String>>,
        bodies: Mutex<Vec<Value>>,
    }

    async fn read_run(State(mock): State<Arc<Mock>>, Path(id): Path<Uuid>) -> (AxumStatus, Json<Value>) {
        let seen = mock.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if seen > mock.ready_after {
            (AxumStatus::OK, Json(json!({ "id": id })))
        } else {
            (AxumStatus::NOT_FOUND, Json(json!({ "detail": "not found" })))
        }
    }

    async fn read_share(State(mock): State<Arc<Mock>>) -> Json<Value> {
        match mock.shared.lock().unwrap().clone() {
            Some(token) => Json(json!({ "share_token": token })),
            None => Json(Value::Null),
        }
    }

    async fn put_share(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Json<Value> {
        let token = body["share_token"].as_str().unwrap().to_string();
        *mock.shared.lock().unwrap() = Some(token.clone());
        Json(json!({ "share_token": token }))
    }

    async fn record(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Json<Value> {
        mock.bodies.lock().unwrap().push(body);
        Json(json!({}))
    }

    async fn spawn(mock: Arc<Mock>) -> LangSmithClient {
        let app = Router::new()
            .route("/runs", post(record))
            .route("/runs/:id", get(read_run))
            .route("/runs/:id/share", get(read_share).put(put_share))
            .route("/feedback", post(record))
            .route("/feedback/:id", patch(record))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = LangSmithConfig {
            endpoint: format!("http://{addr}"),
            api_key: "test-key".into(),
        };
        LangSmithClient::new(&config).unwrap().with_retry(RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(1),
        })
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|i| policy.delay(i).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn host_url_drops_api_prefix() {
        let client = LangSmithClient::new(&LangSmithConfig {
            endpoint: "https://api.smith.langchain.com".into(),
            api_key: "k".into(),
        })
        .unwrap();
        assert_eq!(client.public_url("tok"), "https://smith.langchain.com/public/tok/r");
    }

    #[test]
    fn feedback_body_defaults() {
        let body: FeedbackRequest = serde_json::from_value(json!({
            "run_id": Uuid::nil(),
            "score": 1
        }))
        .unwrap();
        assert_eq!(body.key, "user_score");
        assert_eq!(body.score, Some(Score::Number(1.0)));

        let flag: FeedbackRequest =
            serde_json::from_value(json!({ "run_id": Uuid::nil(), "score": true })).unwrap();
        assert_eq!(flag.score, Some(Score::Bool(true)));
    }

    #[tokio::test]
    async fn trace_url_waits_for_run_then_shares() {
        let mock = Arc::new(Mock {
            ready_after: 2,
            ..Mock::default()
        });
        let client = spawn(mock.clone()).await;
        let run_id = Uuid::new_v4();

        let url = client.trace_url(run_id).await.unwrap();
        assert_eq!(mock.reads.load(Ordering::SeqCst), 3);
        let token = mock.shared.lock().unwrap().clone().unwrap();
        assert_eq!(url, format!("{}/public/{}/r", client.host_url(), token));

        // second call reuses the existing share
        let again = client.trace_url(run_id).await.unwrap();
        assert_eq!(again, url);
    }

    #[tokio::test]
    async fn trace_url_gives_up_polling_after_bounded_attempts() {
        let mock = Arc::new(Mock {
            ready_after: usize::MAX,
            ..Mock::default()
        });
        let client = spawn(mock.clone()).await;

        let url = client.trace_url(Uuid::new_v4()).await.unwrap();
        assert_eq!(mock.reads.load(Ordering::SeqCst), 5);
        assert!(url.contains("/public/"));
    }

    #[tokio::test]
    async fn feedback_is_posted_with_generated_id() {
        let mock = Arc::new(Mock::default());
        let client = spawn(mock.clone()).await;
        let run_id = Uuid::new_v4();

        let id = client
            .create_feedback(&FeedbackRequest {
                run_id,
                key: "user_score".into(),
                score: Some(Score::Number(0.5)),
                feedback_id: None,
                comment: Some("good".into()),
            })
            .await
            .unwrap();

        client
            .update_feedback(&FeedbackUpdate {
                feedback_id: id,
                score: None,
                comment: Some("better".into()),
            })
            .await
            .unwrap();

        let bodies = mock.bodies.lock().unwrap();
        assert_eq!(bodies[0]["id"], id.to_string());
        assert_eq!(bodies[0]["run_id"], run_id.to_string());
        assert_eq!(bodies[0]["score"], 0.5);
        assert_eq!(bodies[1], json!({ "comment": "better" }));
    }
}
