//! Storage facility used by the repository and the writer.
//!
//! Paths are workspace-relative and `/`-separated; the empty string addresses
//! the workspace root.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tracing::trace;

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with its modification time
    File {
        /// Last modification time
        modified: SystemTime,
    },
    /// Folder
    Folder,
}

/// A single entry returned by [`Storage::list_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Workspace-relative path
    pub path: String,
    /// Entry kind
    pub kind: EntryKind,
}

/// File storage operations the pipeline depends on.
///
/// Every operation may suspend and may fail with a filesystem error.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads a UTF-8 file.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Lists the direct children of a folder.
    async fn list_folder(&self, path: &str) -> Result<Vec<StorageEntry>>;

    /// Creates a folder and any missing parents.
    async fn create_folder(&self, path: &str) -> Result<()>;

    /// Creates a new file. Fails with [`Error::AlreadyExists`] if it exists.
    async fn create_file(&self, path: &str, content: &str) -> Result<()>;

    /// Returns true if a file exists at `path`.
    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Returns true if a folder exists at `path`.
    async fn folder_exists(&self, path: &str) -> Result<bool>;
}

/// Joins two workspace-relative path segments.
#[must_use]
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = normalize_path(folder);
    let name = name.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Normalizes a workspace-relative path: `\` becomes `/`, and leading,
/// trailing and repeated separators are removed.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Local filesystem storage rooted at a workspace directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates a storage rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }

    fn relative(&self, absolute: &Path) -> String {
        let relative = pathdiff::diff_paths(absolute, &self.root)
            .unwrap_or_else(|| absolute.to_path_buf());
        normalize_path(&relative.to_string_lossy())
    }

    async fn exists_with(&self, path: &str, want_dir: bool) -> Result<bool> {
        let absolute = self.resolve(path);
        match tokio::fs::metadata(&absolute).await {
            Ok(meta) => Ok(meta.is_dir() == want_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(absolute, e)),
        }
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read_file(&self, path: &str) -> Result<String> {
        let absolute = self.resolve(path);
        trace!("Reading {}", absolute.display());
        tokio::fs::read_to_string(&absolute).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                Error::invalid_content(normalize_path(path), "File is not valid UTF-8")
            } else {
                Error::io(&absolute, e)
            }
        })
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<StorageEntry>> {
        let absolute = self.resolve(path);
        let mut reader = tokio::fs::read_dir(&absolute)
            .await
            .map_err(|e| Error::io(&absolute, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::io(&absolute, e))?
        {
            let entry_path = entry.path();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| Error::io(&entry_path, e))?;

            let kind = if meta.is_dir() {
                EntryKind::Folder
            } else if meta.is_file() {
                EntryKind::File {
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                }
            } else {
                continue;
            };

            entries.push(StorageEntry {
                path: self.relative(&entry_path),
                kind,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let absolute = self.resolve(path);
        tokio::fs::create_dir_all(&absolute)
            .await
            .map_err(|e| Error::FileSystem {
                message: e.to_string(),
                path: absolute,
            })
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<()> {
        let absolute = self.resolve(path);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute)
            .await
            .map_err(|e| match Error::io(&absolute, e) {
                Error::AlreadyExists { .. } => Error::already_exists(normalize_path(path)),
                other => other,
            })?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::io(&absolute, e))?;
        file.flush().await.map_err(|e| Error::io(&absolute, e))?;
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.exists_with(path, false).await
    }

    async fn folder_exists(&self, path: &str) -> Result<bool> {
        self.exists_with(path, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_join_and_normalize() {
        assert_eq!(join_path("", "a.md"), "a.md");
        assert_eq!(join_path("Templates/", "a.md"), "Templates/a.md");
        assert_eq!(normalize_path("/Templates//nested/"), "Templates/nested");
        assert_eq!(normalize_path("Templates\\nested"), "Templates/nested");
        assert_eq!(normalize_path("./Templates"), "Templates");
    }

    #[tokio::test]
    async fn test_list_folder() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();
        temp.child("Templates/sub/b.md").write_str("B").unwrap();

        let storage = FsStorage::new(temp.path());
        let entries = storage.list_folder("Templates").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "Templates/a.md");
        assert!(matches!(entries[0].kind, EntryKind::File { .. }));
        assert_eq!(entries[1].path, "Templates/sub");
        assert_eq!(entries[1].kind, EntryKind::Folder);
    }

    #[tokio::test]
    async fn test_create_file_refuses_overwrite() {
        let temp = assert_fs::TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        storage.create_file("note.md", "first").await.unwrap();
        let err = storage.create_file("note.md", "second").await.unwrap_err();

        assert!(err.is_already_exists());
        temp.child("note.md").assert("first");
    }

    #[tokio::test]
    async fn test_exists_checks() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("dir/file.md").write_str("x").unwrap();
        let storage = FsStorage::new(temp.path());

        assert!(storage.file_exists("dir/file.md").await.unwrap());
        assert!(!storage.file_exists("dir").await.unwrap());
        assert!(storage.folder_exists("dir").await.unwrap());
        assert!(storage.folder_exists("").await.unwrap());
        assert!(!storage.folder_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        let err = storage.read_file("missing.md").await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_read_invalid_utf8() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("bad.md").write_binary(&[0x48, 0xff, 0xfe, 0x49]).unwrap();
        let storage = FsStorage::new(temp.path());

        let err = storage.read_file("/bad.md").await.unwrap_err();
        assert!(err.is_invalid_content());
        assert!(err.to_string().contains("bad.md"));
    }

    #[tokio::test]
    async fn test_create_folder_nested() {
        let temp = assert_fs::TempDir::new().unwrap();
        let storage = FsStorage::new(temp.path());

        storage.create_folder("Out/2026").await.unwrap();
        assert!(temp.child("Out/2026").path().is_dir());
    }
}
