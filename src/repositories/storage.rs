//! Durable object storage on local disk.
//!
//! Objects are sharded beneath `base_path/{shard}/{shard}/{name}` where the
//! shards are the first two bytes of `md5(name)`, keeping directory fan-out
//! small. Writes go to a temp file that is fsynced and renamed into place, so
//! a reader never observes a half-written object.

use super::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_NAME_LEN: usize = 255;

#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// Create or overwrite the object `name`.
    async fn upload_image(&self, name: &str, bytes: Bytes) -> RepositoryResult<()>;

    /// Fails with `NotFound` if the object does not exist.
    async fn download_image(&self, name: &str) -> RepositoryResult<Bytes>;

    /// Removing an absent object succeeds.
    async fn delete_image(&self, name: &str) -> RepositoryResult<()>;
}

#[derive(Clone, Debug)]
pub struct DiskStorage {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Object names are derived internally, but reject anything that could
    /// escape `base_path` anyway.
    fn ensure_name_safe(name: &str) -> RepositoryResult<()> {
        let bad = name.is_empty()
            || name.len() > MAX_OBJECT_NAME_LEN
            || name.contains('/')
            || name.contains("..")
            || name
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if bad {
            return Err(RepositoryError::InvalidKey(name.to_string()));
        }
        Ok(())
    }

    /// First two bytes of `md5(name)` as lowercase hex.
    fn object_shards(name: &str) -> (String, String) {
        let digest = md5::compute(name);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, name: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(name);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }

    async fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        written
    }

    /// Remove empty shard directories up to `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl StorageRepository for DiskStorage {
    async fn upload_image(&self, name: &str, bytes: Bytes) -> RepositoryResult<()> {
        Self::ensure_name_safe(name)?;
        let path = self.object_path(name);
        self.write_atomically(&path, &bytes).await?;
        debug!(object = name, size = bytes.len(), "stored object");
        Ok(())
    }

    async fn download_image(&self, name: &str) -> RepositoryResult<Bytes> {
        Self::ensure_name_safe(name)?;
        match fs::read(self.object_path(name)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(RepositoryError::NotFound(name.to_string()))
            }
            Err(err) => Err(RepositoryError::Io(err)),
        }
    }

    async fn delete_image(&self, name: &str) -> RepositoryResult<()> {
        Self::ensure_name_safe(name)?;
        let path = self.object_path(name);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed object file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object file {} already missing", path.display());
            }
            Err(err) => return Err(RepositoryError::Io(err)),
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}
