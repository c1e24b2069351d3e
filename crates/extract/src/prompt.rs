use crate::schema::Triplet;

fn triplets_json(triplets: &[Triplet]) -> String {
    serde_json::to_string(triplets).unwrap_or_else(|_| "[]".to_string())
}

pub fn build_analysis_prompt(chunk_text: &str) -> String {
    format!(
        r#"Analyze the following text and extract RDF triplets. Also provide a quality assessment.

REQUIREMENTS:
1. Extract factual statements as [subject, predicate, object] triplets
2. Use clear, specific predicates (e.g., "is_located_in", "has_property", "works_for")
3. Ensure subjects and objects are meaningful entities
4. Provide a quality score (0-1) based on clarity and factual content
5. Return valid JSON with this structure:
{{
  "triplets": [["subject", "predicate", "object"]],
  "quality_score": 0.8,
  "feedback": "Assessment of triplet quality and text complexity"
}}

Text: "{}"

JSON Response:"#,
        chunk_text
    )
}

pub fn build_cleaning_prompt(triplets: &[Triplet]) -> String {
    format!(
        r#"Clean and standardize the following triplets for better semantic consistency.

CLEANING TASKS:
1. Normalize entity names (remove extra spaces, fix capitalization)
2. Standardize predicates (use consistent naming like "is_a", "has_property", "located_in")
3. Remove duplicate or very similar triplets
4. Fix obvious semantic issues
5. Ensure subjects and objects are meaningful entities

REQUIREMENTS:
- Maintain factual accuracy
- Use snake_case for predicates
- Remove triplets with generic or meaningless entities
- Return valid JSON with this structure:
{{
  "cleaned_triplets": [["subject", "predicate", "object"]],
  "cleaning_actions": ["List of actions taken"],
  "quality_score": 0.9,
  "feedback": "Summary of cleaning performed"
}}

Original triplets: {}

JSON Response:"#,
        triplets_json(triplets)
    )
}

pub fn build_validation_prompt(triplets: &[Triplet], original_text: &str) -> String {
    format!(
        r#"Validate the following triplets against the original text for factual accuracy and semantic correctness.

VALIDATION CRITERIA:
1. Factual accuracy: Are the relationships stated correctly?
2. Semantic validity: Do the predicates make sense between subject and object?
3. Completeness: Are important facts missing?
4. Consistency: Are there contradictions?
5. Relevance: Are all triplets relevant to the source text?

TASKS:
- Remove factually incorrect triplets
- Fix semantic issues if possible
- Add missing important relationships if evident
- Ensure consistency across all triplets

Original text: "{}"

Triplets to validate: {}

Return JSON with this structure:
{{
  "validated_triplets": [["subject", "predicate", "object"]],
  "validation_issues": ["List of issues found and fixed"],
  "quality_score": 0.85,
  "feedback": "Summary of validation process"
}}

JSON Response:"#,
        original_text,
        triplets_json(triplets)
    )
}

pub fn build_direct_prompt(chunk_text: &str) -> String {
    format!(
        r#"Extract key factual statements from the text as RDF triplets.

STRICT REQUIREMENTS:
1. Return ONLY a valid JSON object
2. Use exactly this format: {{"triplets": [["subject", "predicate", "object"]]}}
3. Each triplet must have exactly 3 elements
4. Use clear, concise predicates (e.g., "is", "has", "uses", "located_in")
5. Maximum 15 triplets per response
6. No explanations, no extra text outside JSON

Text: "{}"

JSON:"#,
        chunk_text
    )
}

pub fn build_repair_prompt(malformed_json: &str) -> String {
    format!(
        r#"The following JSON is malformed. Please repair it and return only the valid JSON:

Malformed JSON:
{}

Requirements:
- Fix syntax errors
- Ensure proper quotes and brackets
- Maintain the original data structure and content
- Return only the repaired JSON, no markdown formatting, no explanations

Repaired JSON:"#,
        malformed_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_prompt_embeds_triplets_as_json() {
        let prompt = build_cleaning_prompt(&[Triplet::new("Paris", "capital_of", "France")]);
        assert!(prompt.contains(r#"[["Paris","capital_of","France"]]"#));
    }

    #[test]
    fn validation_prompt_carries_source_text() {
        let prompt = build_validation_prompt(&[], "Paris is in France.");
        assert!(prompt.contains("Original text: \"Paris is in France.\""));
        assert!(prompt.contains("Triplets to validate: []"));
    }
}
