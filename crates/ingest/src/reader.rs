use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct FileReader;

impl FileReader {
    pub async fn read_file(path: &Path) -> Result<String> {
        if !is_supported(path) {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            anyhow::bail!("Unsupported file format: {:?} ({})", path, extension);
        }

        fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))
    }

    /// Supported files anywhere under `dir`, sorted by path.
    pub async fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
        let root = dir.to_path_buf();
        let mut files = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).follow_links(true) {
                let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Ok(files)
        })
        .await
        .context("Directory walk task failed")??;

        files.sort();
        Ok(files)
    }

    pub async fn read_directory(dir: &Path) -> Result<Vec<(String, String)>> {
        let mut documents = Vec::new();
        for path in Self::list_directory(dir).await? {
            let content = Self::read_file(&path).await?;
            documents.push((path.to_string_lossy().to_string(), content));
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walks_nested_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "bee").unwrap();
        std::fs::write(dir.path().join("a.md"), "# aye").unwrap();
        std::fs::write(dir.path().join("nested/c.TXT"), "sea").unwrap();
        std::fs::write(dir.path().join("skip.pdf"), "binary").unwrap();

        let documents = FileReader::read_directory(dir.path()).await.unwrap();
        let contents: Vec<&str> = documents.iter().map(|(_, c)| c.as_str()).collect();

        assert_eq!(contents, vec!["# aye", "bee", "sea"]);
    }

    #[tokio::test]
    async fn rejects_unsupported_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        std::fs::write(&path, "x").unwrap();

        assert!(FileReader::read_file(&path).await.is_err());
    }
}
