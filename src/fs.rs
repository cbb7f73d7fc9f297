//! Filesystem capability injected into checks and fix strategies.
//!
//! `OsFileSystem` puts an explicit timeout on every operation. `MemoryFileSystem`
//! keeps everything in a map so the pipeline can be exercised without touching disk.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Directory names never descended into when listing.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".next", ".git", "dist", "build", "coverage"];

#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{op} on {path} timed out after {timeout:?}")]
    Timeout {
        op: &'static str,
        path: PathBuf,
        timeout: Duration,
    },
}

impl FsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError>;

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError>;

    /// All regular files below `dir`, recursively, in sorted order.
    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;

    async fn exists(&self, path: &Path) -> bool;
}

/// Real filesystem backed by `tokio::fs`.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    timeout: Duration,
}

impl OsFileSystem {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, path: &Path, fut: F) -> Result<T, FsError>
    where
        F: std::future::Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| FsError::io(path, e)),
            Err(_) => Err(FsError::Timeout {
                op,
                path: path.to_path_buf(),
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        self.bounded("read", path, tokio::fs::read_to_string(path)).await
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.bounded("create_dir", parent, tokio::fs::create_dir_all(parent))
                    .await?;
            }
        }
        self.bounded("write", path, tokio::fs::write(path, contents)).await
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = self
                .bounded("read_dir", &current, tokio::fs::read_dir(&current))
                .await?;
            while let Some(entry) = self
                .bounded("read_dir", &current, entries.next_entry())
                .await?
            {
                let path = entry.path();
                let file_type = self
                    .bounded("stat", &path, entry.file_type())
                    .await?;
                if file_type.is_dir() {
                    let name = entry.file_name();
                    if !SKIPPED_DIRS.iter().any(|s| name == *s) {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        trace!(dir = %dir.display(), files = files.len(), "listed directory");
        Ok(files)
    }

    async fn exists(&self, path: &Path) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, tokio::fs::try_exists(path)).await,
            Ok(Ok(true))
        )
    }
}

/// In-memory filesystem for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let fs = Self::new();
        for (path, contents) in files {
            fs.insert(path, contents);
        }
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.lock().insert(path.into(), contents.into());
    }

    /// Synchronous read, for assertions.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock().get(path.as_ref()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        self.get(path).ok_or_else(|| {
            FsError::io(path, std::io::Error::from(std::io::ErrorKind::NotFound))
        })
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError> {
        self.insert(path, contents);
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        Ok(self
            .lock()
            .keys()
            .filter(|p| p.starts_with(dir) && p.as_path() != dir)
            .filter(|p| {
                !p.strip_prefix(dir)
                    .map(|rel| rel.components().any(|c| SKIPPED_DIRS.iter().any(|s| c.as_os_str() == *s)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.lock().keys().any(|p| p.starts_with(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fs_read_write_list() {
        let fs = MemoryFileSystem::with_files([
            ("/p/src/a.ts", "a"),
            ("/p/src/nested/b.tsx", "b"),
            ("/p/src/node_modules/x/index.js", "x"),
            ("/p/other/c.ts", "c"),
        ]);
        assert_eq!(fs.read_to_string(Path::new("/p/src/a.ts")).await.unwrap(), "a");
        assert!(fs.exists(Path::new("/p/src")).await);
        assert!(!fs.exists(Path::new("/p/app")).await);

        let listed = fs.list(Path::new("/p/src")).await.unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/p/src/a.ts"), PathBuf::from("/p/src/nested/b.tsx")]
        );

        fs.write(Path::new("/p/src/a.ts"), "changed").await.unwrap();
        assert_eq!(fs.get("/p/src/a.ts").as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn test_memory_fs_missing_file_is_not_found() {
        let fs = MemoryFileSystem::new();
        let err = fs.read_to_string(Path::new("/nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_os_fs_lists_sorted_and_skips_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/components")).unwrap();
        std::fs::create_dir_all(root.join("src/node_modules/pkg")).unwrap();
        std::fs::write(root.join("src/b.ts"), "b").unwrap();
        std::fs::write(root.join("src/components/a.tsx"), "a").unwrap();
        std::fs::write(root.join("src/node_modules/pkg/index.js"), "x").unwrap();

        let fs = OsFileSystem::new(Duration::from_secs(5));
        let listed = fs.list(&root.join("src")).await.unwrap();
        assert_eq!(
            listed,
            vec![root.join("src/b.ts"), root.join("src/components/a.tsx")]
        );

        fs.write(&root.join("out/new.txt"), "hello").await.unwrap();
        assert_eq!(fs.read_to_string(&root.join("out/new.txt")).await.unwrap(), "hello");
        assert!(fs.exists(&root.join("out")).await);
    }
}
