pub mod aggregator;
pub mod analyzer;
pub mod cleaner;
pub mod direct;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod repair;
pub mod response;
pub mod retry;
pub mod schema;
pub mod sink;
pub mod stage;
pub mod state;
pub mod validator;

pub use direct::DirectExtractor;
pub use llm::{ChatCompletionClient, LlmGateway, OllamaClient};
pub use orchestrator::{ChunkReport, OrchestratorConfig, TripletOrchestrator};
pub use retry::RetryPolicy;
pub use schema::{Triplet, TripletRecord};
pub use sink::{JsonlSink, TripletSink};
pub use state::{PipelineState, ProcessingState};

use std::sync::Arc;

/// Either the full multi-stage pipeline or one model call per chunk.
pub enum Extractor {
    Orchestrated(TripletOrchestrator),
    Direct {
        extractor: DirectExtractor,
        concurrency: usize,
    },
}

impl Extractor {
    pub fn orchestrated(gateway: Arc<dyn LlmGateway>, config: OrchestratorConfig) -> Self {
        Self::Orchestrated(TripletOrchestrator::new(gateway, config))
    }

    pub fn direct(gateway: Arc<dyn LlmGateway>, concurrency: usize) -> Self {
        Self::Direct {
            extractor: DirectExtractor::new(gateway),
            concurrency,
        }
    }

    /// One report per chunk, in input order.
    pub async fn extract_reports<S>(&self, chunks: &[S]) -> Vec<ChunkReport>
    where
        S: AsRef<str> + Sync,
    {
        match self {
            Self::Orchestrated(orchestrator) => orchestrator.process_corpus_reports(chunks).await,
            Self::Direct { extractor, concurrency } => extractor
                .extract_corpus(chunks, *concurrency)
                .await
                .into_iter()
                .map(ChunkReport::direct)
                .collect(),
        }
    }

    pub async fn extract_corpus<S>(&self, chunks: &[S]) -> Vec<Vec<Triplet>>
    where
        S: AsRef<str> + Sync,
    {
        self.extract_reports(chunks)
            .await
            .into_iter()
            .map(|report| report.triplets)
            .collect()
    }
}
