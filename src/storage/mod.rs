//! Blob storage for case media.
//!
//! Keys are relative slash-separated paths such as `cases/<case>/<media>.jpg`.
//! The store returns the public URL a client fetches the blob from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::AppError;

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Write `bytes` under `key`, replacing anything there, and return its URL.
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>)
        -> Result<String, AppError>;

    /// Remove the blob at `key`. Missing blobs are not an error.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Files under a local directory, served by the HTTP layer at `public_base`.
pub struct LocalMediaStore {
    root: PathBuf,
    public_base: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        if key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(AppError::Internal(format!("Invalid storage key {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(key, size = bytes.len(), content_type, "Stored media blob");
        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
