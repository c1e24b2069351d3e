use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::LlmGateway;
use crate::repair::JsonRepairer;
use crate::response::{self, JsonObject, ResponseError};
use crate::state::PipelineState;

/// A generative pipeline step. Failures are recorded on the state, never
/// returned, so the orchestrator can keep going with whatever is left.
/// `attempt` is 0 on the first run and counts re-runs of the same stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn process(&self, state: &mut PipelineState, attempt: usize);
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0:#}")]
    Gateway(anyhow::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl StageError {
    /// Transport problems read as exceptions, bad payloads as failures.
    pub fn describe(&self, stage_label: &str) -> String {
        match self {
            StageError::Gateway(_) | StageError::Timeout(_) => {
                format!("{} exception: {}", stage_label, self)
            }
            StageError::Response(_) => format!("{} failed: {}", stage_label, self),
        }
    }
}

/// What every generative stage needs to talk to the model.
#[derive(Clone)]
pub struct StageContext {
    gateway: Arc<dyn LlmGateway>,
    repairer: Option<JsonRepairer>,
    call_timeout: Option<Duration>,
}

impl StageContext {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            repairer: None,
            call_timeout: None,
        }
    }

    pub fn with_repair(mut self, enabled: bool) -> Self {
        self.repairer = enabled
            .then(|| JsonRepairer::new(self.gateway.clone()).with_call_timeout(self.call_timeout));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self.repairer = self.repairer.take().map(|r| r.with_call_timeout(timeout));
        self
    }

    /// One model call, bounded by the call timeout. Re-attempts (`attempt > 0`)
    /// bypass any reply the gateway remembers for the same prompt.
    pub async fn complete(&self, prompt: &str, attempt: usize) -> Result<String, StageError> {
        let call = if attempt > 0 {
            self.gateway.refresh(prompt)
        } else {
            self.gateway.complete(prompt)
        };
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StageError::Timeout(limit))?,
            None => call.await,
        };
        result.map_err(StageError::Gateway)
    }

    /// Call the model and pull a JSON object out of its reply, repairing it
    /// first when repair is enabled and plain parsing came up empty.
    pub async fn complete_json(
        &self,
        stage: &'static str,
        prompt: &str,
        attempt: usize,
    ) -> Result<JsonObject, StageError> {
        debug!(stage, attempt, prompt_len = prompt.len(), "sending stage prompt");
        let raw = self.complete(prompt, attempt).await?;
        debug!(stage, response = %raw, "stage response");

        let parsed = response::extract_json_object(&raw);
        if !parsed.is_empty() || raw.trim().is_empty() {
            return Ok(parsed);
        }

        let Some(repairer) = &self.repairer else {
            return Ok(parsed);
        };
        match repairer.repair(&raw, attempt > 0).await {
            Ok(repaired) => Ok(repaired),
            Err(e) => {
                warn!(stage, error = %e, "JSON repair failed");
                Ok(parsed)
            }
        }
    }
}
