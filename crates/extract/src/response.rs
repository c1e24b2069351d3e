//! Pulling JSON out of free-form model output and checking stage payloads.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::Triplet;

pub type JsonObject = Map<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum ResponseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("Missing required fields in {stage} response: {missing}")]
    MissingFields { stage: &'static str, missing: String },
    #[error("{field} should be a list")]
    NotAList { field: &'static str },
    #[error("Invalid triplet format: {0}")]
    InvalidTriplet(String),
    #[error("Invalid quality score: {0}")]
    InvalidScore(String),
}

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json(.*?)```").expect("valid fenced json pattern"))
}

/// Best-effort extraction of a JSON object from model output.
///
/// Tries a ```json fenced block first, then the whole text. Anything that is
/// not a JSON object comes back as an empty map.
pub fn extract_json_object(raw: &str) -> JsonObject {
    if let Some(captures) = fenced_json().captures(raw) {
        if let Some(Value::Object(map)) = captures
            .get(1)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
        {
            return map;
        }
    }

    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

pub fn require_fields(
    data: &JsonObject,
    stage: &'static str,
    fields: &[&str],
) -> Result<(), ResponseError> {
    if data.is_empty() {
        return Err(ResponseError::NoJson);
    }
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| !data.contains_key(*field))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ResponseError::MissingFields {
            stage,
            missing: missing.join(", "),
        })
    }
}

/// Every element must be an array of exactly three strings.
pub fn parse_triplets(value: &Value, field: &'static str) -> Result<Vec<Triplet>, ResponseError> {
    let items = value.as_array().ok_or(ResponseError::NotAList { field })?;

    items
        .iter()
        .map(|item| match item.as_array().map(Vec::as_slice) {
            Some([Value::String(s), Value::String(p), Value::String(o)]) => {
                Ok(Triplet::new(s.clone(), p.clone(), o.clone()))
            }
            _ => Err(ResponseError::InvalidTriplet(item.to_string())),
        })
        .collect()
}

/// Accepts a number or a numeric string, clamped into [0, 1].
pub fn parse_quality_score(value: &Value) -> Result<f64, ResponseError> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match score {
        Some(score) if score.is_finite() => Ok(score.clamp(0.0, 1.0)),
        _ => Err(ResponseError::InvalidScore(value.to_string())),
    }
}

/// Optional list of strings; non-string entries are rendered as JSON text.
pub fn parse_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn parse_feedback(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// The common shape returned by every generative stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePayload {
    pub triplets: Vec<Triplet>,
    pub quality_score: f64,
    pub feedback: Option<String>,
    pub notes: Vec<String>,
}

/// Validate a stage response. `notes_field` names the extra list
/// (`cleaning_actions`, `validation_issues`) a stage requires, if any.
pub fn parse_stage_payload(
    data: &JsonObject,
    stage: &'static str,
    triplets_field: &'static str,
    notes_field: Option<&'static str>,
) -> Result<StagePayload, ResponseError> {
    let mut required = vec![triplets_field, "quality_score", "feedback"];
    if let Some(notes) = notes_field {
        required.insert(1, notes);
    }
    require_fields(data, stage, &required)?;

    let triplets = parse_triplets(&data[triplets_field], triplets_field)?;
    let quality_score = parse_quality_score(&data["quality_score"])?;

    Ok(StagePayload {
        triplets,
        quality_score,
        feedback: parse_feedback(data.get("feedback")),
        notes: parse_string_list(notes_field.and_then(|f| data.get(f))),
    })
}
