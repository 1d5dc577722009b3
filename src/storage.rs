//! File storage behind the media endpoints.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for crate::errors::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(key) => Self::bad_request(format!("invalid file path: {key}")),
            StorageError::Io(err) => Self::internal(format!("storage failure: {err}")),
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Removing a missing file is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Files under a root directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalDisk {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// `media/<dd-mm-yyyy>/<uuid>.<ext>` for an upload named `file_name`.
pub fn media_key(file_name: &str, now: DateTime<Utc>) -> String {
    let ext: String = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(10)
        .collect::<String>()
        .to_ascii_lowercase();

    let stem = format!("media/{}/{}", now.format("%d-%m-%Y"), Uuid::new_v4());
    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn media_keys_are_date_partitioned() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).single().expect("date");
        let key = media_key("Annual Report.PDF", now);
        assert!(key.starts_with("media/07-03-2025/"), "{key}");
        assert!(key.ends_with(".pdf"), "{key}");
        assert!(!media_key("README", now).contains('.'));
    }

    #[tokio::test]
    async fn rejects_escaping_keys_and_round_trips_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let disk = LocalDisk::new(dir.path());

        assert!(matches!(disk.put("../etc/passwd", b"x").await, Err(StorageError::InvalidKey(_))));
        assert!(matches!(disk.put("/abs", b"x").await, Err(StorageError::InvalidKey(_))));

        disk.put("media/01-01-2025/a.txt", b"hello").await.expect("put");
        assert!(disk.exists("media/01-01-2025/a.txt").await.expect("exists"));
        disk.delete("media/01-01-2025/a.txt").await.expect("delete");
        disk.delete("media/01-01-2025/a.txt").await.expect("delete twice");
        assert!(!disk.exists("media/01-01-2025/a.txt").await.expect("exists"));
    }
}
