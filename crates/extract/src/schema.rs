use serde::{Deserialize, Serialize};

/// A (subject, predicate, object) statement. Serializes as a 3-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet(pub String, pub String, pub String);

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self(subject.into(), predicate.into(), object.into())
    }

    pub fn subject(&self) -> &str {
        &self.0
    }

    pub fn predicate(&self) -> &str {
        &self.1
    }

    pub fn object(&self) -> &str {
        &self.2
    }
}

/// One persisted triplet, tagged with the document and chunk it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripletRecord {
    pub ref_id: String,
    pub chunk_index: usize,
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl TripletRecord {
    pub fn new(ref_id: &str, chunk_index: usize, triplet: &Triplet) -> Self {
        Self {
            ref_id: ref_id.to_string(),
            chunk_index,
            subject: triplet.subject().to_string(),
            predicate: triplet.predicate().to_string(),
            object: triplet.object().to_string(),
        }
    }

    /// Flatten `(chunk_index, triplets)` pairs into records.
    pub fn from_chunk_results<'a, I>(ref_id: &str, results: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (usize, &'a [Triplet])>,
    {
        results
            .into_iter()
            .flat_map(|(chunk_index, triplets)| {
                triplets
                    .iter()
                    .map(move |triplet| Self::new(ref_id, chunk_index, triplet))
            })
            .collect()
    }
}
