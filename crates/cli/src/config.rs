use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use extract::{OrchestratorConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,
    Accurate,
    Balanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => anyhow::bail!("Unknown LLM provider: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Falls back to the provider's usual endpoint when unset.
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Sent as the `AI-Resource-Group` header to chat deployments.
    pub resource_group: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_retries: usize,
    pub repair_malformed_json: bool,
    /// Skip the multi-stage pipeline and extract with one call per chunk.
    pub direct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_chunks: usize,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: None,
            model: None,
            api_key: None,
            resource_group: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Balanced: full pipeline with the response cache on. Stage re-attempts
/// bypass the cache, so a cached bad reply is never replayed.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            llm: LlmConfig::default(),
            pipeline: PipelineConfig {
                max_retries: 3,
                repair_malformed_json: false,
                direct: false,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_chunks: 4,
                call_timeout_secs: Some(120),
            },
            retry: RetryConfig {
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
                ttl_secs: 3600,
            },
            chunking: ChunkingConfig::default(),
        }
    }
}

impl AppConfig {
    /// One model call per chunk with a large, long-lived cache. Direct
    /// extraction has no retries, so a cached reply is reused as is.
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            llm: LlmConfig {
                request_timeout_secs: 30,
                ..LlmConfig::default()
            },
            pipeline: PipelineConfig {
                max_retries: 2,
                repair_malformed_json: false,
                direct: true,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_chunks: 8,
                call_timeout_secs: Some(60),
            },
            retry: RetryConfig {
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 50000,
                ttl_secs: 86400,
            },
            chunking: ChunkingConfig::default(),
        }
    }

    /// Full pipeline with JSON repair and a longer call timeout. No cache.
    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            llm: LlmConfig {
                request_timeout_secs: 120,
                ..LlmConfig::default()
            },
            pipeline: PipelineConfig {
                max_retries: 5,
                repair_malformed_json: true,
                direct: false,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_chunks: 2,
                call_timeout_secs: Some(300),
            },
            retry: RetryConfig {
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 0,
                ttl_secs: 0,
            },
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Balanced => Self::default(),
            OperationMode::Accurate => Self::accurate_mode(),
        }
    }

    /// Builds the configuration from the mode preset, with any fields set in
    /// the JSON file at `path` layered on top. `mode` wins over the file's
    /// own `mode` field.
    pub fn load(path: Option<&Path>, mode: Option<OperationMode>) -> Result<Self> {
        let overlay = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                serde_json::from_str::<Value>(&raw)
                    .with_context(|| format!("Invalid JSON in config file {:?}", path))?
            }
            None => Value::Object(Default::default()),
        };
        Self::from_overlay(overlay, mode)
    }

    fn from_overlay(mut overlay: Value, mode: Option<OperationMode>) -> Result<Self> {
        if !overlay.is_object() {
            anyhow::bail!("Config file must contain a JSON object");
        }

        let file_mode = match overlay.get("mode") {
            Some(value) => Some(
                serde_json::from_value::<OperationMode>(value.clone())
                    .context("Invalid mode in config file")?,
            ),
            None => None,
        };
        let mode = mode.or(file_mode).unwrap_or(OperationMode::Balanced);
        if let Some(object) = overlay.as_object_mut() {
            object.insert("mode".to_string(), serde_json::to_value(mode)?);
        }

        let mut merged = serde_json::to_value(Self::for_mode(mode))?;
        merge(&mut merged, overlay);
        serde_json::from_value(merged).context("Invalid config")
    }

    /// Applies `TRIPLETS_LLM_*` values, e.g. `|key| std::env::var(key).ok()`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("TRIPLETS_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(base_url) = lookup("TRIPLETS_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(model) = lookup("TRIPLETS_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(api_key) = lookup("TRIPLETS_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }
        if let Some(group) = lookup("TRIPLETS_LLM_RESOURCE_GROUP") {
            self.llm.resource_group = Some(group);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be greater than 0");
        }
        if self.concurrency.max_concurrent_chunks == 0 {
            anyhow::bail!("concurrency.max_concurrent_chunks must be greater than 0");
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be greater than 0 when the cache is enabled");
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: self.pipeline.max_retries,
            max_concurrent_chunks: self.concurrency.max_concurrent_chunks,
            retry_policy: RetryPolicy::new(self.retry.initial_backoff_ms, self.retry.max_backoff_ms),
            call_timeout: self.concurrency.call_timeout_secs.map(Duration::from_secs),
            repair_malformed_json: self.pipeline.repair_malformed_json,
        }
    }

    pub fn chunker_config(&self) -> ingest::ChunkerConfig {
        ingest::ChunkerConfig {
            chunk_size: self.chunking.chunk_size,
            overlap: self.chunking.overlap,
        }
    }
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, LlmProvider::Ollama) => "http://localhost:11434",
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1",
        }
    }
}

/// Recursively overwrites `base` with every field present in `overlay`.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
