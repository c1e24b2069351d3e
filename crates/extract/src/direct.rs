use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::llm::LlmGateway;
use crate::prompt;
use crate::response;
use crate::schema::Triplet;

/// Single-call extraction: one prompt per chunk, no cleaning or validation.
#[derive(Clone)]
pub struct DirectExtractor {
    gateway: Arc<dyn LlmGateway>,
}

impl DirectExtractor {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    async fn try_extract(&self, text: &str) -> Result<Vec<Triplet>> {
        let raw = self
            .gateway
            .complete(&prompt::build_direct_prompt(text))
            .await
            .context("direct extraction call failed")?;

        let data = response::extract_json_object(&raw);
        match data.get("triplets") {
            Some(value) => Ok(response::parse_triplets(value, "triplets")?),
            None => Ok(Vec::new()),
        }
    }

    /// Triplets for one chunk; any failure yields an empty list.
    pub async fn extract(&self, text: &str) -> Vec<Triplet> {
        match self.try_extract(text).await {
            Ok(triplets) => triplets,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "direct extraction failed");
                Vec::new()
            }
        }
    }

    /// One result per chunk, in input order, at most `concurrency` in flight.
    pub async fn extract_corpus<S>(&self, chunks: &[S], concurrency: usize) -> Vec<Vec<Triplet>>
    where
        S: AsRef<str> + Sync,
    {
        if chunks.is_empty() {
            return Vec::new();
        }
        info!(chunks = chunks.len(), concurrency, "direct extraction over corpus");

        stream::iter(chunks)
            .map(|text| self.extract(text.as_ref()))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
