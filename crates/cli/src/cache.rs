use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use extract::LlmGateway;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

struct CachedResponse {
    response: String,
    stored_at: Instant,
}

/// Gateway wrapper that remembers successful completions by prompt. A reply
/// that parses badly is still remembered; stage re-attempts call `refresh`,
/// which replaces it.
pub struct CachedGateway {
    inner: Arc<dyn LlmGateway>,
    llm_responses: DashMap<String, CachedResponse>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedGateway {
    pub fn new(inner: Arc<dyn LlmGateway>, max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner,
            llm_responses: DashMap::new(),
            max_entries,
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get_llm_response(&self, prompt: &str) -> Option<String> {
        let key = self.hash_text(prompt);
        self.llm_responses
            .get(&key)
            .and_then(|entry| (entry.stored_at.elapsed() < self.ttl).then(|| entry.response.clone()))
    }

    pub fn set_llm_response(&self, prompt: &str, response: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.llm_responses.len() >= self.max_entries {
            self.llm_responses
                .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        }
        if self.llm_responses.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .llm_responses
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.llm_responses.remove(&key);
            }
        }
        let key = self.hash_text(prompt);
        self.llm_responses.insert(
            key,
            CachedResponse {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    fn hash_text(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            llm_responses_cached: self.llm_responses.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl LlmGateway for CachedGateway {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Some(response) = self.get_llm_response(prompt) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("LLM cache hit");
            return Ok(response);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.inner.complete(prompt).await?;
        self.set_llm_response(prompt, response.clone());
        Ok(response)
    }

    /// Goes to the model even on a hit, then replaces the remembered reply.
    async fn refresh(&self, prompt: &str) -> Result<String> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.inner.refresh(prompt).await?;
        self.set_llm_response(prompt, response.clone());
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub llm_responses_cached: usize,
    pub hits: usize,
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{OrchestratorConfig, Triplet, TripletOrchestrator};

    struct CountingGateway {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingGateway {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl LlmGateway for CountingGateway {
        async fn complete(&self, prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("gateway down");
            }
            Ok(format!("{}#{}", prompt, n))
        }
    }

    #[tokio::test]
    async fn repeated_prompt_is_served_from_cache() {
        let inner = CountingGateway::new(false);
        let cache = CachedGateway::new(inner.clone(), 10, Duration::from_secs(60));

        let first = cache.complete("hello").await.unwrap();
        let second = cache.complete("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let inner = CountingGateway::new(false);
        let cache = CachedGateway::new(inner.clone(), 10, Duration::ZERO);

        cache.complete("hello").await.unwrap();
        cache.complete("hello").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = CountingGateway::new(true);
        let cache = CachedGateway::new(inner.clone(), 10, Duration::from_secs(60));

        assert!(cache.complete("hello").await.is_err());
        assert!(cache.complete("hello").await.is_err());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().llm_responses_cached, 0);
    }

    #[tokio::test]
    async fn refresh_skips_and_replaces_the_cached_reply() {
        let inner = CountingGateway::new(false);
        let cache = CachedGateway::new(inner.clone(), 10, Duration::from_secs(60));

        assert_eq!(cache.complete("hello").await.unwrap(), "hello#0");
        assert_eq!(cache.refresh("hello").await.unwrap(), "hello#1");
        assert_eq!(cache.complete("hello").await.unwrap(), "hello#1");

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    /// Malformed on the first call, valid JSON for every stage afterwards.
    struct RecoveringGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmGateway for RecoveringGateway {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok("sorry, not json".to_string());
            }
            Ok(r#"{"triplets": [["a", "b", "c"]], "cleaned_triplets": [["a", "b", "c"]],
                "cleaning_actions": [], "validated_triplets": [["a", "b", "c"]],
                "validation_issues": [], "quality_score": 0.9, "feedback": ""}"#
                .to_string())
        }
    }

    #[tokio::test]
    async fn stage_retries_reach_the_model_through_the_cache() {
        let inner = Arc::new(RecoveringGateway {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CachedGateway::new(inner.clone(), 100, Duration::from_secs(60)));
        let orchestrator = TripletOrchestrator::new(cache.clone(), OrchestratorConfig::default());

        let triplets = orchestrator.process_chunk("a b c").await;

        assert_eq!(triplets, vec![Triplet::new("a", "b", "c")]);
        assert!(inner.calls.load(Ordering::SeqCst) > 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn size_stays_bounded() {
        let cache = CachedGateway::new(CountingGateway::new(false), 4, Duration::from_secs(60));
        for i in 0..20 {
            cache.set_llm_response(&format!("prompt {}", i), "ok".to_string());
        }
        assert!(cache.stats().llm_responses_cached <= 4);
        assert!(cache.get_llm_response("prompt 19").is_some());
    }
}
