use async_trait::async_trait;
use tracing::{debug, warn};

use crate::prompt;
use crate::response::{self, StagePayload};
use crate::stage::{Stage, StageContext, StageError};
use crate::state::{PipelineState, ProcessingState};

/// Extracts the first set of triplets from raw text, with a self-reported
/// quality score.
pub struct Analyzer {
    ctx: StageContext,
}

impl Analyzer {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn analyze(&self, text: &str, attempt: usize) -> Result<StagePayload, StageError> {
        let data = self
            .ctx
            .complete_json(self.name(), &prompt::build_analysis_prompt(text), attempt)
            .await?;
        Ok(response::parse_stage_payload(&data, "analyzer", "triplets", None)?)
    }
}

#[async_trait]
impl Stage for Analyzer {
    fn name(&self) -> &'static str {
        "analyzer"
    }

    async fn process(&self, state: &mut PipelineState, attempt: usize) {
        let result = self.analyze(state.raw_text(), attempt).await;
        match result {
            Ok(payload) => {
                debug!(triplets = payload.triplets.len(), score = payload.quality_score, "analysis done");
                state.initial_triplets = payload.triplets;
                state.quality_scores.insert("analyzer".to_string(), payload.quality_score);
                state.analyzer_feedback = payload.feedback;
                state.advance(ProcessingState::Analyzed);
            }
            Err(e) => {
                warn!(stage = "analyzer", error = %e, "analysis failed");
                state.record_error(e.describe("Analyzer"));
            }
        }
    }
}
