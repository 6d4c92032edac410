//! Transformation pipeline: a fixed worker pool behind a byte-level facade.
//!
//! Callers hand [`ImagePipeline`] raw bytes plus a transformation chain. The
//! facade decodes, validates the chain, queues a [`Job`] on the
//! [`WorkerPool`] and awaits that job's one-shot reply before re-encoding in
//! the source format.

pub mod facade;
pub mod worker_pool;

pub use facade::{ImagePipeline, PreviewConfig};
pub use worker_pool::{Job, JobHandle, PoolConfig, WorkerPool};

use crate::imaging::{CodecError, TransformError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("worker pool is shut down")]
    PoolClosed,
    #[error("job was dropped without a result")]
    WorkerLost,
    #[error("transformation task failed: {0}")]
    WorkerPanicked(String),
}

impl PipelineError {
    /// True when the failure was caused by the caller's bytes or options.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::Codec(err) => err.is_invalid_input(),
            Self::Transform(err) => err.is_invalid_input(),
            Self::PoolClosed | Self::WorkerLost | Self::WorkerPanicked(_) => false,
        }
    }
}
