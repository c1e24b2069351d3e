use async_trait::async_trait;
use tracing::{debug, warn};

use crate::prompt;
use crate::response::{self, StagePayload};
use crate::schema::Triplet;
use crate::stage::{Stage, StageContext, StageError};
use crate::state::{PipelineState, ProcessingState};

/// Normalizes entity names and predicates and drops duplicates. Falls back to
/// the analyzer's triplets when the model gives nothing usable.
pub struct SemanticCleaner {
    ctx: StageContext,
}

impl SemanticCleaner {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn clean(&self, triplets: &[Triplet], attempt: usize) -> Result<StagePayload, StageError> {
        let data = self
            .ctx
            .complete_json(self.name(), &prompt::build_cleaning_prompt(triplets), attempt)
            .await?;
        Ok(response::parse_stage_payload(
            &data,
            "cleaner",
            "cleaned_triplets",
            Some("cleaning_actions"),
        )?)
    }
}

#[async_trait]
impl Stage for SemanticCleaner {
    fn name(&self) -> &'static str {
        "cleaner"
    }

    async fn process(&self, state: &mut PipelineState, attempt: usize) {
        if state.initial_triplets.is_empty() {
            state.record_error("No initial triplets to clean.");
            return;
        }

        let result = self.clean(&state.initial_triplets, attempt).await;
        match result {
            Ok(payload) => {
                debug!(
                    before = state.initial_triplets.len(),
                    after = payload.triplets.len(),
                    actions = payload.notes.len(),
                    "cleaning done"
                );
                state.cleaned_triplets = payload.triplets;
                state.cleaning_actions = payload.notes;
                state.quality_scores.insert("cleaner".to_string(), payload.quality_score);
                state.cleaner_feedback = payload.feedback;
                state.advance(ProcessingState::Cleaned);
            }
            Err(e) => {
                warn!(stage = "cleaner", error = %e, "cleaning failed, keeping analyzer output");
                state.record_error(e.describe("Cleaner"));
                state.cleaned_triplets = state.initial_triplets.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmGateway;
    use anyhow::Result;
    use std::sync::Arc;

    struct Reply(&'static str);

    #[async_trait]
    impl LlmGateway for Reply {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn cleaner(reply: &'static str) -> SemanticCleaner {
        SemanticCleaner::new(StageContext::new(Arc::new(Reply(reply))))
    }

    fn analyzed_state() -> PipelineState {
        let mut state = PipelineState::new("Apple was founded by Steve Jobs.");
        state.initial_triplets = vec![
            Triplet::new("apple ", "Founded By", "Steve Jobs"),
            Triplet::new("Apple", "founded_by", "Steve Jobs"),
        ];
        state.advance(ProcessingState::Analyzed);
        state
    }

    #[tokio::test]
    async fn accepts_fenced_reply() {
        let stage = cleaner(
            "```json\n{\"cleaned_triplets\": [[\"Apple\", \"founded_by\", \"Steve Jobs\"]], \"cleaning_actions\": [\"merged duplicates\"], \"quality_score\": 0.9, \"feedback\": \"deduplicated\"}\n```",
        );
        let mut state = analyzed_state();

        stage.process(&mut state, 0).await;

        assert_eq!(state.cleaned_triplets, vec![Triplet::new("Apple", "founded_by", "Steve Jobs")]);
        assert_eq!(state.cleaning_actions, vec!["merged duplicates".to_string()]);
        assert_eq!(state.quality_scores["cleaner"], 0.9);
        assert_eq!(state.processing_state(), ProcessingState::Cleaned);
    }

    #[tokio::test]
    async fn garbage_falls_back_to_initial() {
        let stage = cleaner("I could not do that, sorry.");
        let mut state = analyzed_state();

        stage.process(&mut state, 0).await;

        assert_eq!(state.cleaned_triplets, state.initial_triplets);
        assert_eq!(state.processing_state(), ProcessingState::Analyzed);
        assert!(state.error_messages()[0].starts_with("Cleaner failed"));
        assert!(!state.quality_scores.contains_key("cleaner"));
    }

    #[tokio::test]
    async fn skips_without_input() {
        let stage = cleaner("{}");
        let mut state = PipelineState::new("text");

        stage.process(&mut state, 0).await;

        assert!(state.cleaned_triplets.is_empty());
        assert_eq!(state.error_messages(), ["No initial triplets to clean.".to_string()]);
    }
}
