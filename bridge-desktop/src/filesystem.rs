//! `tokio::fs` implementation of [`FileSystemAccess`].

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::FileSystemAccess};
use bytes::Bytes;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Local disk access. Relative paths are resolved against the data
/// directory; absolute paths are used as given.
#[derive(Debug, Clone)]
pub struct TokioFileSystem {
    root: PathBuf,
}

impl TokioFileSystem {
    pub fn with_data_directory(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn data_directory(&self) -> &Path {
        &self.root
    }

    fn resolve<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        if path.is_absolute() {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(self.root.join(path))
        }
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(self.resolve(path)).await?)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let path = self.resolve(path);
        let data = fs::read(&path).await?;
        debug!(path = %path.display(), bytes = data.len(), "read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        debug!(path = %path.display(), bytes = data.len(), "wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to)).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        let path = self.resolve(path);
        fs::remove_file(&path).await?;
        debug!(path = %path.display(), "deleted file");
        Ok(())
    }
}
