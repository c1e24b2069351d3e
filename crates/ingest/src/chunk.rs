use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Id of the document the chunk came from.
    pub ref_id: String,
    /// Position of the chunk within its document, from 0.
    pub chunk_index: usize,
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub offset: (usize, usize), // [start, end) character positions
}

impl Chunk {
    pub fn new(
        ref_id: String,
        chunk_index: usize,
        text: String,
        source: String,
        offset: (usize, usize),
    ) -> Self {
        let chunk_id = Self::generate_chunk_id(&ref_id, &text, offset);

        Self {
            ref_id,
            chunk_index,
            chunk_id,
            text,
            source,
            offset,
        }
    }

    fn generate_chunk_id(ref_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ref_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}
