use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::schema::Triplet;
use crate::state::{PipelineState, ProcessingState};

/// Per-stage weights for the overall score.
pub const STAGE_WEIGHTS: [(&str, f64); 3] = [("analyzer", 0.3), ("cleaner", 0.3), ("validator", 0.4)];

pub const OVERALL_KEY: &str = "overall";

#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("overall quality is not a finite number ({0})")]
    NonFiniteScore(f64),
}

/// Most-processed non-empty triplet set: validated, then cleaned, then initial.
pub fn select_best_triplets(state: &PipelineState) -> Vec<Triplet> {
    [
        &state.validated_triplets,
        &state.cleaned_triplets,
        &state.initial_triplets,
    ]
    .into_iter()
    .find(|triplets| !triplets.is_empty())
    .cloned()
    .unwrap_or_default()
}

/// Weighted mean over the stage scores that are present, normalized by the
/// weights actually used. No scores means 0.0.
pub fn overall_quality(scores: &HashMap<String, f64>) -> Result<f64, AggregateError> {
    let (weighted_sum, total_weight) = STAGE_WEIGHTS
        .iter()
        .filter_map(|(stage, weight)| scores.get(*stage).map(|score| (score * weight, *weight)))
        .fold((0.0, 0.0), |(sum, total), (value, weight)| (sum + value, total + weight));

    if total_weight == 0.0 {
        return Ok(0.0);
    }

    let overall = weighted_sum / total_weight;
    if overall.is_finite() {
        Ok(overall)
    } else {
        Err(AggregateError::NonFiniteScore(overall))
    }
}

/// Final, deterministic step. Never calls the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    pub fn process(&self, state: &mut PipelineState) {
        match overall_quality(&state.quality_scores) {
            Ok(overall) => {
                state.final_triplets = select_best_triplets(state);
                state.quality_scores.insert(OVERALL_KEY.to_string(), overall);
                state.advance(ProcessingState::Completed);
                info!(
                    triplets = state.final_triplets.len(),
                    overall_quality = overall,
                    "aggregation done"
                );
            }
            Err(e) => {
                warn!(error = %e, "aggregation failed, using best available triplets");
                state.record_error(format!("Aggregator exception: {}", e));
                state.final_triplets = select_best_triplets(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weighted_average_of_all_stages() {
        let overall =
            overall_quality(&scores(&[("analyzer", 0.8), ("cleaner", 0.6), ("validator", 0.9)])).unwrap();
        assert!((overall - 0.78).abs() < 1e-9);
    }

    #[test]
    fn single_score_is_normalized() {
        let overall = overall_quality(&scores(&[("analyzer", 0.5)])).unwrap();
        assert!((overall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_scores_is_zero() {
        assert_eq!(overall_quality(&HashMap::new()).unwrap(), 0.0);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let overall = overall_quality(&scores(&[("overall", 0.1), ("validator", 0.6)])).unwrap();
        assert!((overall - 0.6).abs() < 1e-9);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        assert!(overall_quality(&scores(&[("cleaner", f64::NAN)])).is_err());
    }

    #[test]
    fn selection_prefers_most_processed() {
        let a = Triplet::new("a", "p", "b");
        let c = Triplet::new("c", "p", "d");
        let v = Triplet::new("v", "p", "w");

        let mut state = PipelineState::new("text");
        assert!(select_best_triplets(&state).is_empty());

        state.initial_triplets = vec![a.clone()];
        assert_eq!(select_best_triplets(&state), vec![a.clone()]);

        state.cleaned_triplets = vec![c.clone()];
        assert_eq!(select_best_triplets(&state), vec![c.clone()]);

        state.validated_triplets = vec![v.clone()];
        assert_eq!(select_best_triplets(&state), vec![v]);

        state.validated_triplets.clear();
        state.record_error("Validator failed: whatever");
        assert_eq!(select_best_triplets(&state), vec![c]);
    }

    #[test]
    fn completes_state_with_overall_score() {
        let mut state = PipelineState::new("text");
        state.initial_triplets = vec![Triplet::new("a", "p", "b")];
        state.quality_scores.insert("analyzer".to_string(), 0.5);

        Aggregator.process(&mut state);

        assert_eq!(state.final_triplets, state.initial_triplets);
        assert_eq!(state.quality_scores[OVERALL_KEY], 0.5);
        assert_eq!(state.processing_state(), ProcessingState::Completed);
    }

    #[test]
    fn failure_still_selects_triplets() {
        let mut state = PipelineState::new("text");
        state.cleaned_triplets = vec![Triplet::new("a", "p", "b")];
        state.quality_scores.insert("cleaner".to_string(), f64::INFINITY);

        Aggregator.process(&mut state);

        assert_eq!(state.final_triplets, state.cleaned_triplets);
        assert!(state.error_messages()[0].starts_with("Aggregator exception"));
        assert!(!state.quality_scores.contains_key(OVERALL_KEY));
    }
}
