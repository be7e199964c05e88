//! HTTP client for the mini-rollup REST surface.
//!
//! Commands are queued with `POST /send` and processed asynchronously; the
//! returned job id is polled on `GET /job/{id}` until the job finishes or
//! fails. Account state comes back from `POST /query` as a JSON string.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{RollupRpc, RpcError};
use crate::{command::Command, identity::ProcessingKey, signature};

/// How long to wait for a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolling {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for JobPolling {
    fn default() -> Self {
        Self { attempts: 60, interval: Duration::from_millis(500) }
    }
}

#[derive(Serialize)]
struct QueryRequest {
    pkx: String,
}

/// Envelope shared by `/send`, `/query` and `/config`.
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    jobid: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Job record returned by `/job/{id}`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    finished_on: Option<Value>,
    #[serde(default)]
    returnvalue: Option<Value>,
    #[serde(default)]
    failed_reason: Option<String>,
}

/// Client for the rollup's REST API.
#[derive(Debug, Clone)]
pub struct HttpRollupRpc {
    client: Client,
    url: String,
    polling: JobPolling,
}

impl HttpRollupRpc {
    /// Create a new client rooted at `url`.
    pub fn new(url: &Url) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RpcError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: url.as_str().trim_end_matches('/').to_string(),
            polling: JobPolling::default(),
        })
    }

    pub const fn with_polling(mut self, polling: JobPolling) -> Self {
        self.polling = polling;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, RpcError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<ApiResponse, RpcError> {
        if !response.status().is_success() {
            return Err(RpcError::Http(response.status().as_u16()));
        }

        let body: ApiResponse =
            response.json().await.map_err(|e| RpcError::Parse(e.to_string()))?;

        if !body.success {
            let reason = body.error.map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return Err(RpcError::Rejected(reason.unwrap_or_else(|| "unsuccessful".to_string())));
        }
        Ok(body)
    }

    /// `POST /query`, with the `data` string decoded.
    async fn query(&self, key: &ProcessingKey) -> Result<Value, RpcError> {
        let pk = key.public_key().map_err(|e| RpcError::Key(e.to_string()))?;
        let body = self.post("query", &QueryRequest { pkx: pk.pkx_le_hex() }).await?;
        unwrap_data(body.data)
    }

    async fn job(&self, id: &str) -> Result<JobStatus, RpcError> {
        let response = self
            .client
            .get(self.endpoint(&format!("job/{id}")))
            .send()
            .await
            .map_err(|e| RpcError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Http(response.status().as_u16()));
        }
        response.json().await.map_err(|e| RpcError::Parse(e.to_string()))
    }

    /// Polls `id` until it finishes, fails, or the polling budget runs out.
    async fn wait_for_job(&self, id: &str) -> Result<Value, RpcError> {
        for attempt in 0..self.polling.attempts {
            let status = self.job(id).await?;
            if let Some(reason) = status.failed_reason {
                return Err(RpcError::Rejected(reason));
            }
            if status.finished_on.is_some_and(|v| !v.is_null()) {
                return Ok(status.returnvalue.unwrap_or(Value::Null));
            }
            debug!(job = id, attempt, "job still pending");
            tokio::time::sleep(self.polling.interval).await;
        }
        Err(RpcError::JobTimeout(id.to_string()))
    }
}

/// `data` is either inline JSON or a JSON document encoded as a string.
fn unwrap_data(data: Option<Value>) -> Result<Value, RpcError> {
    match data {
        Some(Value::String(s)) => {
            serde_json::from_str(&s).map_err(|e| RpcError::Parse(e.to_string()))
        }
        Some(v) => Ok(v),
        None => Err(RpcError::Parse("missing data field".to_string())),
    }
}

/// Reads `player.nonce` out of a decoded account state.
fn nonce_of(state: &Value) -> Result<u64, RpcError> {
    let nonce = state
        .get("player")
        .and_then(|p| p.get("nonce"))
        .ok_or_else(|| RpcError::Parse("missing player.nonce".to_string()))?;

    match nonce {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| RpcError::Parse(format!("invalid nonce: {nonce}")))
}

#[async_trait]
impl RollupRpc for HttpRollupRpc {
    async fn nonce(&self, key: &ProcessingKey) -> Result<u64, RpcError> {
        nonce_of(&self.query(key).await?)
    }

    async fn state(&self, key: &ProcessingKey) -> Result<Value, RpcError> {
        self.query(key).await
    }

    async fn config(&self) -> Result<Value, RpcError> {
        let body = self.post("config", &serde_json::json!({})).await?;
        unwrap_data(body.data)
    }

    async fn send_transaction(
        &self,
        command: &Command,
        key: &ProcessingKey,
    ) -> Result<Value, RpcError> {
        let signed = signature::sign(command, key).map_err(|e| RpcError::Key(e.to_string()))?;
        let body = self.post("send", &signed).await?;

        let job = match body.jobid {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RpcError::Parse("missing jobid".to_string())),
        };
        debug!(job = %job, opcode = %command.opcode, nonce = command.nonce, "command queued");

        self.wait_for_job(&job).await
    }
}
