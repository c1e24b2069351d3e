pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig};
pub use reader::FileReader;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A source document split into chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub ref_id: String,
    pub source: String,
    pub chunks: Vec<Chunk>,
}

impl Document {
    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Generate a stable document ID from file path
pub fn generate_ref_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

fn document(chunker: &Chunker, source: String, content: &str) -> Document {
    let ref_id = generate_ref_id(&source);
    let chunks = chunker.chunk_text(&ref_id, content, &source);
    Document {
        ref_id,
        source,
        chunks,
    }
}

pub async fn ingest_file(file_path: &Path, chunker: &Chunker) -> Result<Document> {
    let content = FileReader::read_file(file_path).await?;
    let source = file_path.to_string_lossy().to_string();
    Ok(document(chunker, source, &content))
}

pub async fn ingest_directory(dir_path: &Path, chunker: &Chunker) -> Result<Vec<Document>> {
    let files = FileReader::read_directory(dir_path).await?;
    Ok(files
        .into_iter()
        .map(|(source, content)| document(chunker, source, &content))
        .collect())
}

/// A single file or every supported file under a directory.
pub async fn ingest_path(path: &Path, config: ChunkerConfig) -> Result<Vec<Document>> {
    let chunker = Chunker::new(config);
    if path.is_dir() {
        ingest_directory(path, &chunker).await
    } else if path.is_file() {
        Ok(vec![ingest_file(path, &chunker).await?])
    } else {
        anyhow::bail!("Input path does not exist: {:?}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingests_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Ada Lovelace   wrote\nthe first program.").unwrap();

        let documents = ingest_path(&path, ChunkerConfig::default()).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].texts(), vec!["Ada Lovelace wrote the first program."]);
        assert_eq!(documents[0].ref_id, generate_ref_id(&path.to_string_lossy()));
        assert_eq!(documents[0].chunks[0].ref_id, documents[0].ref_id);
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ingest_path(&dir.path().join("nope"), ChunkerConfig::default()).await.is_err());
    }
}
