//! File Loader: reads declared resource files from hydrated output if
//! present, else raw source.

use crate::errors::FileLoadError;
use crate::state::{Files, SyncDir};
use async_trait::async_trait;

#[async_trait]
pub trait FileLoader: Send + Sync {
    async fn load(&self, dir: &SyncDir) -> Result<Files, FileLoadError>;
}

/// Reads every regular file under `dir` recursively, keyed by its path
/// relative to `dir`. Read/enumeration errors are treated as non-transient;
/// callers decide transience from the `SyncDir` presence check that precedes
/// this call, distinguishing "not yet populated" from "populated but
/// unreadable".
pub struct FsFileLoader;

#[async_trait]
impl FileLoader for FsFileLoader {
    async fn load(&self, dir: &SyncDir) -> Result<Files, FileLoadError> {
        let root = dir.0.clone();
        tokio::task::spawn_blocking(move || read_dir_recursive(&root))
            .await
            .map_err(|e| FileLoadError::Permanent(format!("loader task panicked: {e}")))?
    }
}

fn read_dir_recursive(root: &std::path::Path) -> Result<Files, FileLoadError> {
    if !root.is_dir() {
        return Err(FileLoadError::Transient(format!("{} does not exist yet", root.display())));
    }
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| FileLoadError::Permanent(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| FileLoadError::Permanent(e.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let contents = std::fs::read_to_string(&path).map_err(|e| FileLoadError::Permanent(e.to_string()))?;
                let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                out.push((rel, contents));
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Files(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_dir_is_transient() {
        let dir = SyncDir(std::path::PathBuf::from("/nonexistent/for/sure/xyz"));
        let err = FsFileLoader.load(&dir).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn reads_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("a.yaml"), "a: 1").unwrap();
        std::fs::write(tmp.path().join("nested/b.yaml"), "b: 2").unwrap();
        let dir = SyncDir(tmp.path().to_path_buf());
        let files = FsFileLoader.load(&dir).await.unwrap();
        assert_eq!(files.0.len(), 2);
    }
}
