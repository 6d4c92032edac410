//! ImageService — coordinates the metadata repository, durable storage and
//! the cache so that every image keeps a `full-<id>` and a `prev-<id>` object.
//!
//! Reads are cache-aside: the cache is consulted first and repopulated from
//! storage on a miss. Writes are write-through: storage first, then cache.
//!
//! None of the multi-step operations are transactional. Each step's failure is
//! returned immediately and the earlier steps are not rolled back, so a failed
//! `transform` can leave a new full object next to an old preview, and a failed
//! `delete` can leave objects behind a deleted metadata row. The step order in
//! each method is the contract callers retry against.

use crate::{
    models::{
        image::{ImageMetadata, ObjectNames},
        transformation::Transformation,
    },
    pipeline::{ImagePipeline, PipelineError},
    repositories::{
        CacheRepository, MetadataRepository, Page, RepositoryError, StorageRepository,
    },
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_PAGE_LIMIT: u32 = 25;
pub const MAX_TRANSFORMATIONS: usize = 32;

/// Previews fetched concurrently when listing.
const LIST_FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wrap a collaborator failure with the step and key it happened on.
    fn internal(step: &str, key: impl fmt::Display, err: impl fmt::Display) -> Self {
        warn!(step, key = %key, "collaborator failure: {}", err);
        Self::Internal(format!("{step} {key}: {err}"))
    }

    fn from_pipeline(step: &str, key: &str, err: PipelineError) -> Self {
        if err.is_invalid_input() {
            Self::InvalidInput(err.to_string())
        } else {
            Self::internal(step, key, err)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub cache_ttl: Duration,
    pub max_image_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            max_image_size: 10 * 1024 * 1024,
        }
    }
}

/// One listed image with its preview bytes.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub metadata: ImageMetadata,
    pub preview: Bytes,
}

#[derive(Debug, Clone)]
pub struct ImagePage {
    pub items: Vec<ImageEntry>,
    pub total: i64,
}

#[derive(Clone)]
pub struct ImageService {
    metadata: Arc<dyn MetadataRepository>,
    storage: Arc<dyn StorageRepository>,
    cache: Arc<dyn CacheRepository>,
    pipeline: ImagePipeline,
    config: ServiceConfig,
}

impl ImageService {
    pub fn new(
        metadata: Arc<dyn MetadataRepository>,
        storage: Arc<dyn StorageRepository>,
        cache: Arc<dyn CacheRepository>,
        pipeline: ImagePipeline,
        config: ServiceConfig,
    ) -> Self {
        Self {
            metadata,
            storage,
            cache,
            pipeline,
            config,
        }
    }

    pub fn pipeline(&self) -> &ImagePipeline {
        &self.pipeline
    }

    /// Store a new image and its preview.
    ///
    /// The preview is derived before anything is written, so bytes that do
    /// not decode are rejected with no side effects. Writes then go:
    /// metadata row → storage(full) → cache(full) → storage(prev) →
    /// cache(prev).
    pub async fn upload(
        &self,
        user_id: Uuid,
        name: &str,
        description: &str,
        bytes: Bytes,
    ) -> ServiceResult<ImageMetadata> {
        validate_name(name)?;
        validate_description(description)?;
        self.validate_bytes(&bytes)?;

        let preview = Bytes::from(
            self.pipeline
                .create_preview(&bytes)
                .await
                .map_err(|err| ServiceError::from_pipeline("create preview", name, err))?,
        );

        let meta = ImageMetadata::new(user_id, name, description);
        self.metadata
            .create_image_metadata(&meta)
            .await
            .map_err(|err| match err {
                RepositoryError::AlreadyExists(_) => {
                    ServiceError::invalid(format!("image `{name}` already exists"))
                }
                other => ServiceError::internal("create metadata", name, other),
            })?;

        let names = meta.object_names();
        self.write_through(&names.full, bytes).await?;
        self.write_through(&names.preview, preview).await?;

        info!(image = %meta.id, user = %user_id, name, "image uploaded");
        Ok(meta)
    }

    /// Metadata plus full-resolution bytes, cache first.
    pub async fn get(&self, user_id: Uuid, name: &str) -> ServiceResult<(ImageMetadata, Bytes)> {
        let meta = self.find(user_id, name).await?;
        let bytes = self.read_through(&meta.object_names().full).await?;
        Ok((meta, bytes))
    }

    /// A page of a user's images with their previews.
    pub async fn get_all(&self, user_id: Uuid, page: u32, limit: u32) -> ServiceResult<ImagePage> {
        let page = validate_page(page, limit)?;
        let (rows, total) = self
            .metadata
            .get_images_metadata_by_user_id(user_id, page)
            .await
            .map_err(|err| ServiceError::internal("list metadata", user_id, err))?;

        let items = stream::iter(rows)
            .map(|metadata| async move {
                let preview = self.read_through(&metadata.object_names().preview).await?;
                Ok::<_, ServiceError>(ImageEntry { metadata, preview })
            })
            .buffered(LIST_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(ImagePage { items, total })
    }

    /// Apply `transformations` to the stored image and regenerate its preview.
    ///
    /// Steps: read full (cache-aside) → pipeline → storage(full) →
    /// cache(full) → preview → storage(prev) → cache(prev) → touch
    /// `updated_at`.
    pub async fn transform(
        &self,
        user_id: Uuid,
        name: &str,
        transformations: &[Transformation],
    ) -> ServiceResult<(ImageMetadata, Bytes)> {
        if transformations.is_empty() {
            return Err(ServiceError::invalid(
                "at least one transformation is required",
            ));
        }
        if transformations.len() > MAX_TRANSFORMATIONS {
            return Err(ServiceError::invalid(format!(
                "at most {MAX_TRANSFORMATIONS} transformations per request"
            )));
        }

        let meta = self.find(user_id, name).await?;
        let names = meta.object_names();
        let original = self.read_through(&names.full).await?;

        let transformed = Bytes::from(
            self.pipeline
                .apply(&original, transformations)
                .await
                .map_err(|err| ServiceError::from_pipeline("transform", &names.full, err))?,
        );
        self.write_through(&names.full, transformed.clone()).await?;

        let preview = self
            .pipeline
            .create_preview(&transformed)
            .await
            .map_err(|err| ServiceError::from_pipeline("create preview", &names.preview, err))?;
        self.write_through(&names.preview, Bytes::from(preview))
            .await?;

        let meta = self
            .metadata
            .update_image_metadata_updated_at(meta.id)
            .await
            .map_err(|err| ServiceError::internal("touch metadata", meta.id, err))?;

        info!(
            image = %meta.id,
            steps = transformations.len(),
            "image transformed"
        );
        Ok((meta, transformed))
    }

    /// Rename or re-describe an image; `None` keeps the current value.
    /// Objects are keyed by id and stay put.
    pub async fn update_details(
        &self,
        user_id: Uuid,
        name: &str,
        new_name: Option<&str>,
        new_description: Option<&str>,
    ) -> ServiceResult<ImageMetadata> {
        if let Some(new_name) = new_name {
            validate_name(new_name)?;
        }
        if let Some(new_description) = new_description {
            validate_description(new_description)?;
        }
        let meta = self.find(user_id, name).await?;
        let new_name = new_name.unwrap_or(&meta.name);
        let new_description = new_description.unwrap_or(&meta.description);

        self.metadata
            .update_image_metadata_details(meta.id, new_name, new_description)
            .await
            .map_err(|err| match err {
                RepositoryError::AlreadyExists(_) => {
                    ServiceError::invalid(format!("image `{new_name}` already exists"))
                }
                RepositoryError::NotFound(_) => {
                    ServiceError::NotFound(format!("image `{name}` not found"))
                }
                other => ServiceError::internal("update metadata", meta.id, other),
            })
    }

    /// Steps: metadata row → storage(full) → cache(full) → storage(prev) →
    /// cache(prev).
    pub async fn delete(&self, user_id: Uuid, name: &str) -> ServiceResult<()> {
        let meta = self.find(user_id, name).await?;
        self.delete_everywhere(&meta).await
    }

    pub async fn admin_list_all_images(
        &self,
        page: u32,
        limit: u32,
    ) -> ServiceResult<(Vec<ImageMetadata>, i64)> {
        let page = validate_page(page, limit)?;
        self.metadata
            .get_all_images_metadata(page)
            .await
            .map_err(|err| ServiceError::internal("list all metadata", "images", err))
    }

    pub async fn admin_delete_image(&self, image_id: Uuid) -> ServiceResult<()> {
        let meta = self
            .metadata
            .get_image_metadata_by_id(image_id)
            .await
            .map_err(|err| ServiceError::internal("get metadata", image_id, err))?
            .ok_or_else(|| ServiceError::NotFound(format!("image {image_id} not found")))?;
        self.delete_everywhere(&meta).await
    }

    async fn find(&self, user_id: Uuid, name: &str) -> ServiceResult<ImageMetadata> {
        self.metadata
            .get_image_metadata_by_user_id_and_name(user_id, name)
            .await
            .map_err(|err| ServiceError::internal("get metadata", name, err))?
            .ok_or_else(|| ServiceError::NotFound(format!("image `{name}` not found")))
    }

    async fn delete_everywhere(&self, meta: &ImageMetadata) -> ServiceResult<()> {
        self.metadata
            .delete_image_metadata(meta.id)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound(_) => {
                    ServiceError::NotFound(format!("image {} not found", meta.id))
                }
                other => ServiceError::internal("delete metadata", meta.id, other),
            })?;

        let ObjectNames { full, preview } = meta.object_names();
        for key in [&full, &preview] {
            self.storage
                .delete_image(key)
                .await
                .map_err(|err| ServiceError::internal("storage delete", key, err))?;
            self.cache
                .delete_image(key)
                .await
                .map_err(|err| ServiceError::internal("cache delete", key, err))?;
        }

        info!(image = %meta.id, name = %meta.name, "image deleted");
        Ok(())
    }

    /// Storage first, then cache. A cache failure is still an error: readers
    /// trust the cache to mirror storage.
    async fn write_through(&self, key: &str, bytes: Bytes) -> ServiceResult<()> {
        self.storage
            .upload_image(key, bytes.clone())
            .await
            .map_err(|err| ServiceError::internal("storage upload", key, err))?;
        self.cache
            .cache_image(key, bytes, self.config.cache_ttl)
            .await
            .map_err(|err| ServiceError::internal("cache set", key, err))?;
        debug!(key, "wrote object through storage and cache");
        Ok(())
    }

    /// Cache first; on a miss read storage and repopulate the cache.
    async fn read_through(&self, key: &str) -> ServiceResult<Bytes> {
        let cached = self
            .cache
            .get_image(key)
            .await
            .map_err(|err| ServiceError::internal("cache get", key, err))?;
        if let Some(bytes) = cached {
            debug!(key, "cache hit");
            return Ok(bytes);
        }

        debug!(key, "cache miss, reading storage");
        let bytes = self
            .storage
            .download_image(key)
            .await
            .map_err(|err| ServiceError::internal("storage download", key, err))?;
        self.cache
            .cache_image(key, bytes.clone(), self.config.cache_ttl)
            .await
            .map_err(|err| ServiceError::internal("cache set", key, err))?;
        Ok(bytes)
    }

    fn validate_bytes(&self, bytes: &[u8]) -> ServiceResult<()> {
        if bytes.is_empty() {
            return Err(ServiceError::invalid("image is empty"));
        }
        if bytes.len() > self.config.max_image_size {
            return Err(ServiceError::invalid(format!(
                "image is {} bytes, maximum is {}",
                bytes.len(),
                self.config.max_image_size
            )));
        }
        let supported = image::guess_format(bytes)
            .map(crate::imaging::codec::is_supported)
            .unwrap_or(false);
        if !supported {
            return Err(ServiceError::invalid("image must be PNG or JPEG"));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> ServiceResult<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::invalid("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ServiceError::invalid(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(ServiceError::invalid(
            "name must not contain `/` or control characters",
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> ServiceResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ServiceError::invalid(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_page(page: u32, limit: u32) -> ServiceResult<Page> {
    if page < 1 {
        return Err(ServiceError::invalid("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ServiceError::invalid(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(Page { page, limit })
}
