use crate::chunk::Chunk;

/// Character-window chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Splits text into overlapping windows of `chunk_size` characters, each
/// starting `chunk_size - overlap` characters after the previous one.
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            overlap: config.overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_text(&self, ref_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let cleaned = collapse_whitespace(&window);

            if !cleaned.is_empty() {
                chunks.push(Chunk::new(
                    ref_id.to_string(),
                    chunks.len(),
                    cleaned,
                    source.to_string(),
                    (start, end),
                ));
            }

            // The rest of the text is already inside this window.
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
