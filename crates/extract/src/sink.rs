use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::schema::TripletRecord;

/// Destination for extracted triplets, e.g. a triple store.
#[async_trait]
pub trait TripletSink: Send + Sync {
    async fn write(&self, records: &[TripletRecord]) -> Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TripletSink for JsonlSink {
    async fn write(&self, records: &[TripletRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        file.write_all(buffer.as_bytes())
            .await
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Triplet;

    #[tokio::test]
    async fn appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("out/triplets.jsonl"));

        let first = TripletRecord::from_chunk_results("doc-a", [(0, &[Triplet::new("a", "b", "c")][..])]);
        let second = TripletRecord::from_chunk_results(
            "doc-b",
            [(0, &[][..]), (1, &[Triplet::new("d", "e", "f")][..])],
        );
        sink.write(&first).await.unwrap();
        sink.write(&second).await.unwrap();
        sink.write(&[]).await.unwrap();

        let written = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<TripletRecord> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].ref_id, "doc-a");
        assert_eq!(lines[1].chunk_index, 1);
        assert_eq!(lines[1].object, "f");
    }
}
