use async_trait::async_trait;
use tracing::{debug, warn};

use crate::prompt;
use crate::response::{self, StagePayload};
use crate::schema::Triplet;
use crate::stage::{Stage, StageContext, StageError};
use crate::state::{PipelineState, ProcessingState};

/// Checks triplets against the source text. May drop wrong triplets or add
/// missing ones; on failure its input passes through unchanged.
pub struct TripletValidator {
    ctx: StageContext,
}

impl TripletValidator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn validate(
        &self,
        triplets: &[Triplet],
        source: &str,
        attempt: usize,
    ) -> Result<StagePayload, StageError> {
        let data = self
            .ctx
            .complete_json(self.name(), &prompt::build_validation_prompt(triplets, source), attempt)
            .await?;
        Ok(response::parse_stage_payload(
            &data,
            "validator",
            "validated_triplets",
            Some("validation_issues"),
        )?)
    }
}

#[async_trait]
impl Stage for TripletValidator {
    fn name(&self) -> &'static str {
        "validator"
    }

    async fn process(&self, state: &mut PipelineState, attempt: usize) {
        let input = state.best_pre_validation().to_vec();
        if input.is_empty() {
            state.record_error("No triplets to validate.");
            return;
        }

        let result = self.validate(&input, state.raw_text(), attempt).await;
        match result {
            Ok(payload) => {
                debug!(
                    before = input.len(),
                    after = payload.triplets.len(),
                    issues = payload.notes.len(),
                    "validation done"
                );
                state.validated_triplets = payload.triplets;
                state.validation_issues = payload.notes;
                state.quality_scores.insert("validator".to_string(), payload.quality_score);
                state.validator_feedback = payload.feedback;
                state.advance(ProcessingState::Validated);
            }
            Err(e) => {
                warn!(stage = "validator", error = %e, "validation failed, keeping input triplets");
                state.record_error(e.describe("Validator"));
                state.validated_triplets = input;
            }
        }
    }
}
