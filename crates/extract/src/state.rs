use std::collections::HashMap;

use serde::Serialize;

use crate::schema::Triplet;

pub const DEFAULT_MAX_RETRIES: usize = 3;

/// How far a chunk has progressed. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    #[default]
    Initial,
    Analyzed,
    Cleaned,
    Validated,
    Completed,
}

/// Working state for a single text chunk as it moves through the stages.
#[derive(Debug, Clone)]
pub struct PipelineState {
    raw_text: String,
    pub initial_triplets: Vec<Triplet>,
    pub cleaned_triplets: Vec<Triplet>,
    pub validated_triplets: Vec<Triplet>,
    pub final_triplets: Vec<Triplet>,

    pub quality_scores: HashMap<String, f64>,
    error_messages: Vec<String>,
    pub retry_count: usize,
    pub max_retries: usize,
    processing_state: ProcessingState,

    pub analyzer_feedback: Option<String>,
    pub cleaner_feedback: Option<String>,
    pub validator_feedback: Option<String>,
    pub cleaning_actions: Vec<String>,
    pub validation_issues: Vec<String>,
}

impl PipelineState {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self::with_max_retries(raw_text, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(raw_text: impl Into<String>, max_retries: usize) -> Self {
        Self {
            raw_text: raw_text.into(),
            initial_triplets: Vec::new(),
            cleaned_triplets: Vec::new(),
            validated_triplets: Vec::new(),
            final_triplets: Vec::new(),
            quality_scores: HashMap::new(),
            error_messages: Vec::new(),
            retry_count: 0,
            max_retries,
            processing_state: ProcessingState::Initial,
            analyzer_feedback: None,
            cleaner_feedback: None,
            validator_feedback: None,
            cleaning_actions: Vec::new(),
            validation_issues: Vec::new(),
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.processing_state
    }

    /// Move to `next` if it is further along; never moves backwards.
    pub fn advance(&mut self, next: ProcessingState) {
        if next > self.processing_state {
            self.processing_state = next;
        }
    }

    /// Accumulated errors exceed the retry budget.
    pub fn has_critical_errors(&self) -> bool {
        self.error_messages.len() > self.max_retries
    }

    /// Cleaned triplets if any, otherwise the analyzer's output.
    pub fn best_pre_validation(&self) -> &[Triplet] {
        if self.cleaned_triplets.is_empty() {
            &self.initial_triplets
        } else {
            &self.cleaned_triplets
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotonic() {
        let mut state = PipelineState::new("text");
        state.advance(ProcessingState::Cleaned);
        state.advance(ProcessingState::Analyzed);
        assert_eq!(state.processing_state(), ProcessingState::Cleaned);
    }

    #[test]
    fn circuit_breaker_trips_past_max_retries() {
        let mut state = PipelineState::with_max_retries("text", 2);
        state.record_error("one");
        state.record_error("two");
        assert!(!state.has_critical_errors());
        state.record_error("three");
        assert!(state.has_critical_errors());
    }
}
