use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm::LlmGateway;
use crate::prompt;
use crate::response::JsonObject;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("LLM repair call failed: {0:#}")]
    Gateway(anyhow::Error),
    #[error("LLM repair call timed out after {0:?}")]
    Timeout(Duration),
    #[error("LLM repair failed to produce valid JSON")]
    Unrepairable,
}

fn outer_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^[^{]*(\{.*\})[^}]*$").expect("valid outer object pattern"))
}

fn bare_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("valid bare key pattern")
    })
}

fn first_object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(\{.*\})").expect("valid object span pattern"))
}

/// Cheap local fixes: trim to the outermost braces and quote bare keys.
pub fn basic_clean(text: &str) -> String {
    let trimmed = outer_object().replace(text, "$1");
    let trimmed = trimmed.trim();
    bare_key().replace_all(trimmed, r#"${1}"${2}":"#).into_owned()
}

fn parse_object(text: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Repairs malformed JSON, first locally and then by asking the model.
#[derive(Clone)]
pub struct JsonRepairer {
    gateway: Arc<dyn LlmGateway>,
    call_timeout: Option<Duration>,
}

impl JsonRepairer {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// `fresh` skips any remembered reply to the repair prompt.
    pub async fn repair(&self, malformed: &str, fresh: bool) -> Result<JsonObject, RepairError> {
        if let Some(map) = parse_object(&basic_clean(malformed)) {
            debug!("malformed JSON fixed by local cleanup");
            return Ok(map);
        }

        let prompt = prompt::build_repair_prompt(malformed);
        let call = if fresh {
            self.gateway.refresh(&prompt)
        } else {
            self.gateway.complete(&prompt)
        };
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RepairError::Timeout(limit))?,
            None => call.await,
        };
        let response = result.map_err(RepairError::Gateway)?;

        first_object_span()
            .captures(&response)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_object(m.as_str()))
            .or_else(|| parse_object(response.trim()))
            .ok_or(RepairError::Unrepairable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGateway {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmGateway for FixedGateway {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    fn gateway(reply: &'static str) -> Arc<FixedGateway> {
        Arc::new(FixedGateway {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn quotes_bare_keys_and_strips_prose() {
        let cleaned = basic_clean("Sure! {triplets: [], quality_score: 0.5} hope it helps");
        assert_eq!(cleaned, r#"{"triplets": [], "quality_score": 0.5}"#);
    }

    #[tokio::test]
    async fn local_cleanup_skips_the_model() {
        let llm = gateway("{}");
        let repairer = JsonRepairer::new(llm.clone());

        let map = repairer.repair("{feedback: \"ok\"}", false).await.unwrap();

        assert_eq!(map["feedback"], "ok");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_model_repair() {
        let llm = gateway("Repaired: {\"triplets\": [[\"a\", \"b\", \"c\"]]}");
        let repairer = JsonRepairer::new(llm.clone());

        let map = repairer.repair("{'triplets': [['a', 'b', 'c']", false).await.unwrap();

        assert!(map.contains_key("triplets"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrepairable_is_an_error() {
        let repairer = JsonRepairer::new(gateway("I cannot help with that"));
        let err = repairer.repair("{{{", false).await.unwrap_err();
        assert!(matches!(err, RepairError::Unrepairable));
    }

    struct HangingGateway;

    #[async_trait]
    impl LlmGateway for HangingGateway {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn model_repair_respects_call_timeout() {
        let repairer = JsonRepairer::new(Arc::new(HangingGateway))
            .with_call_timeout(Some(Duration::from_millis(20)));

        let err = repairer.repair("no braces here", false).await.unwrap_err();

        assert!(matches!(err, RepairError::Timeout(_)));
    }
}
