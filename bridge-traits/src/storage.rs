//! File access for the two state files the core keeps: the job collection
//! and the Spotify token file. Both are small JSON documents that are read
//! and rewritten whole.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write the whole file. Missing parent directories are created.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Replaces `to` if it exists.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Write `<path>.tmp` then rename it over `path`. Readers see either the
    /// old or the new document, never a partial one.
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        let tmp = temp_path(path);
        self.write_file(&tmp, data).await?;
        self.rename(&tmp, path).await
    }
}

/// Sibling used by [`FileSystemAccess::write_file_atomic`].
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
