//! Byte-level entry point to the worker pool.

use super::{Job, PipelineError, WorkerPool};
use crate::imaging::{codec, operation};
use crate::models::transformation::Transformation;
use image::{DynamicImage, ImageFormat};
use std::sync::Arc;
use tracing::debug;

/// Target size of every preview object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
        }
    }
}

/// Decodes, queues, awaits and re-encodes.
#[derive(Clone)]
pub struct ImagePipeline {
    pool: Arc<WorkerPool>,
    preview: PreviewConfig,
}

impl ImagePipeline {
    pub fn new(pool: Arc<WorkerPool>, preview: PreviewConfig) -> Self {
        Self { pool, preview }
    }

    pub fn preview_config(&self) -> PreviewConfig {
        self.preview
    }

    /// Run `transformations` over `bytes`, returning bytes in the source
    /// format.
    ///
    /// Undecodable input and invalid options fail before anything is queued.
    pub async fn apply(
        &self,
        bytes: &[u8],
        transformations: &[Transformation],
    ) -> Result<Vec<u8>, PipelineError> {
        let operations = operation::plan(transformations)?;
        let (image, format) = decode(bytes.to_vec()).await?;

        let (job, handle) = Job::new(image, format, operations);
        self.pool.submit(job).await?;
        let output = handle.result().await?;

        debug!(
            steps = transformations.len(),
            ?format,
            width = output.width(),
            height = output.height(),
            "pipeline applied"
        );
        encode(output, format).await
    }

    /// Downscale `bytes` to the configured preview size.
    pub async fn create_preview(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let resize = Transformation::resize(self.preview.width, self.preview.height);
        self.apply(bytes, std::slice::from_ref(&resize)).await
    }

    pub fn is_accepting(&self) -> bool {
        !self.pool.is_closed()
    }

    /// Drain the pool; used at shutdown.
    pub async fn wait(&self) {
        self.pool.wait().await;
    }
}

async fn decode(bytes: Vec<u8>) -> Result<(DynamicImage, ImageFormat), PipelineError> {
    tokio::task::spawn_blocking(move || codec::decode(&bytes))
        .await
        .map_err(|err| PipelineError::WorkerPanicked(err.to_string()))?
        .map_err(PipelineError::from)
}

async fn encode(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, PipelineError> {
    tokio::task::spawn_blocking(move || codec::encode(&image, format))
        .await
        .map_err(|err| PipelineError::WorkerPanicked(err.to_string()))?
        .map_err(PipelineError::from)
}
