use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use tempo_core::config::ExecutorConfig;

use crate::error::{DispatchError, Result};
use crate::signal::{ExecutorAck, ExecutorSignal};

/// Wire shape of the executor control endpoint's JSON answer.
#[derive(Debug, Deserialize)]
struct AckBody {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Signals the executor over its HTTP control endpoint:
/// `GET {base}/run_immediate?job_id=<id>` with the shared token in `X-Token`.
pub struct HttpExecutorClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpExecutorClient {
    pub fn new(cfg: &ExecutorConfig) -> Self {
        Self {
            base_url: cfg.control_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ExecutorSignal for HttpExecutorClient {
    async fn run_now(&self, job_id: &str) -> Result<ExecutorAck> {
        let url = format!("{}/run_immediate", self.base_url);
        let mut req = self.http.get(&url).query(&[("job_id", job_id)]);
        if let Some(token) = &self.token {
            req = req.header("X-Token", token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();

        let body: AckBody = resp
            .json()
            .await
            .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;

        if body.ok {
            info!(%job_id, "immediate run queued");
        } else {
            warn!(
                %job_id,
                status,
                reason = body.error.as_deref().unwrap_or("unspecified"),
                "executor refused immediate run"
            );
        }
        Ok(ExecutorAck { ok: body.ok, status })
    }
}
