use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::aggregator::{Aggregator, OVERALL_KEY};
use crate::analyzer::Analyzer;
use crate::cleaner::SemanticCleaner;
use crate::llm::LlmGateway;
use crate::retry::RetryPolicy;
use crate::schema::Triplet;
use crate::stage::{Stage, StageContext};
use crate::state::{DEFAULT_MAX_RETRIES, PipelineState, ProcessingState};
use crate::validator::TripletValidator;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Re-attempt budget per chunk, shared by all stages. Also the error
    /// count past which remaining stages are skipped.
    pub max_retries: usize,
    /// Chunks processed at once. 1 runs the corpus strictly in order.
    pub max_concurrent_chunks: usize,
    pub retry_policy: RetryPolicy,
    pub call_timeout: Option<Duration>,
    pub repair_malformed_json: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrent_chunks: 1,
            retry_policy: RetryPolicy::immediate(),
            call_timeout: None,
            repair_malformed_json: false,
        }
    }
}

/// What survives of a chunk once its pipeline is done.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub triplets: Vec<Triplet>,
    pub overall_quality: f64,
    pub quality_scores: HashMap<String, f64>,
    pub retry_count: usize,
    pub errors: Vec<String>,
    pub processing_state: ProcessingState,
    pub panicked: bool,
}

impl ChunkReport {
    fn from_state(state: PipelineState) -> Self {
        Self {
            overall_quality: state.quality_scores.get(OVERALL_KEY).copied().unwrap_or(0.0),
            retry_count: state.retry_count,
            errors: state.error_messages().to_vec(),
            processing_state: state.processing_state(),
            triplets: state.final_triplets,
            quality_scores: state.quality_scores,
            panicked: false,
        }
    }

    /// A report for triplets that came from a single direct call.
    pub(crate) fn direct(triplets: Vec<Triplet>) -> Self {
        Self {
            triplets,
            overall_quality: 0.0,
            quality_scores: HashMap::new(),
            retry_count: 0,
            errors: Vec::new(),
            processing_state: ProcessingState::Completed,
            panicked: false,
        }
    }

    fn panicked(message: String) -> Self {
        Self {
            triplets: Vec::new(),
            overall_quality: 0.0,
            quality_scores: HashMap::new(),
            retry_count: 0,
            errors: vec![format!("Orchestrator exception: {}", message)],
            processing_state: ProcessingState::Initial,
            panicked: true,
        }
    }
}

/// Runs text chunks through analyze, clean, validate and aggregate.
pub struct TripletOrchestrator {
    analyzer: Analyzer,
    cleaner: SemanticCleaner,
    validator: TripletValidator,
    aggregator: Aggregator,
    config: OrchestratorConfig,
}

impl TripletOrchestrator {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: OrchestratorConfig) -> Self {
        let ctx = StageContext::new(gateway)
            .with_repair(config.repair_malformed_json)
            .with_call_timeout(config.call_timeout);

        Self {
            analyzer: Analyzer::new(ctx.clone()),
            cleaner: SemanticCleaner::new(ctx.clone()),
            validator: TripletValidator::new(ctx),
            aggregator: Aggregator,
            config,
        }
    }

    /// Triplets for one chunk. Never fails; a broken pipeline yields `[]`.
    pub async fn process_chunk(&self, text: &str) -> Vec<Triplet> {
        self.guarded_chunk(0, text).await.triplets
    }

    pub async fn process_chunk_report(&self, text: &str) -> ChunkReport {
        self.guarded_chunk(0, text).await
    }

    /// One result per input chunk, in input order.
    pub async fn process_corpus<S>(&self, chunks: &[S]) -> Vec<Vec<Triplet>>
    where
        S: AsRef<str> + Sync,
    {
        self.process_corpus_reports(chunks)
            .await
            .into_iter()
            .map(|report| report.triplets)
            .collect()
    }

    pub async fn process_corpus_reports<S>(&self, chunks: &[S]) -> Vec<ChunkReport>
    where
        S: AsRef<str> + Sync,
    {
        if chunks.is_empty() {
            return Vec::new();
        }

        let total = chunks.len();
        let concurrency = self.config.max_concurrent_chunks.max(1);
        info!(chunks = total, concurrency, "processing corpus");

        stream::iter(chunks.iter().enumerate())
            .map(|(index, text)| {
                info!("processing chunk {}/{}", index + 1, total);
                self.guarded_chunk(index, text.as_ref())
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn guarded_chunk(&self, index: usize, text: &str) -> ChunkReport {
        let run = AssertUnwindSafe(self.run_pipeline(text))
            .catch_unwind()
            .instrument(info_span!("chunk", index));

        match run.await {
            Ok(state) => ChunkReport::from_state(state),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(chunk = index, panic = %message, "chunk pipeline panicked");
                ChunkReport::panicked(message)
            }
        }
    }

    async fn run_pipeline(&self, text: &str) -> PipelineState {
        let mut state = PipelineState::with_max_retries(text, self.config.max_retries);

        self.run_stage(&self.analyzer, &mut state).await;

        if !state.initial_triplets.is_empty() && !state.has_critical_errors() {
            self.run_stage(&self.cleaner, &mut state).await;
        }

        if !state.best_pre_validation().is_empty() && !state.has_critical_errors() {
            self.run_stage(&self.validator, &mut state).await;
        }

        self.aggregator.process(&mut state);

        if !state.error_messages().is_empty() {
            info!(
                errors = state.error_messages().len(),
                retries = state.retry_count,
                "chunk finished with errors"
            );
        }
        state
    }

    /// Runs a stage, then re-runs it while the retry condition holds. The
    /// condition looks at the whole error log, not just this stage's errors.
    async fn run_stage(&self, stage: &dyn Stage, state: &mut PipelineState) {
        let mut attempt = 0;
        loop {
            stage.process(state, attempt).await;
            if !Self::should_retry(state) {
                break;
            }
            attempt += 1;
            state.retry_count += 1;
            warn!(
                stage = stage.name(),
                attempt,
                retries = state.retry_count,
                max_retries = state.max_retries,
                "retrying stage"
            );
            self.config.retry_policy.wait(stage.name(), state.retry_count).await;
        }
    }

    fn should_retry(state: &PipelineState) -> bool {
        state.retry_count < state.max_retries
            && state.final_triplets.is_empty()
            && !state.error_messages().is_empty()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
