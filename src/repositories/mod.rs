//! Collaborator contracts used by the image service, plus the backends the
//! binary wires in.
//!
//! - [`MetadataRepository`] — relational image records (SQLite via `sqlx`)
//! - [`StorageRepository`] — durable object bytes (sharded local disk)
//! - [`CacheRepository`] — ephemeral object bytes with TTL (in-process)

pub mod cache;
pub mod metadata;
pub mod storage;

pub use cache::{CacheRepository, MemoryCache};
pub use metadata::{MetadataRepository, SqliteMetadataRepository};
pub use storage::{DiskStorage, StorageRepository};

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}
