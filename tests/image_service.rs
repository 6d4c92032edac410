//! End-to-end service tests over the real backends: in-memory SQLite,
//! sharded disk storage in a temp dir, and the in-process cache.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use image_vault::{
    imaging::{ImageEngine, codec},
    models::transformation::{Transformation, TransformationKind},
    pipeline::{ImagePipeline, PoolConfig, PreviewConfig, WorkerPool},
    repositories::{
        CacheRepository, DiskStorage, MemoryCache, RepositoryResult, SqliteMetadataRepository,
        StorageRepository,
    },
    services::{ImageService, ServiceConfig, ServiceError},
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use uuid::Uuid;

/// Disk storage that counts downloads.
struct CountingStorage {
    inner: DiskStorage,
    downloads: AtomicUsize,
}

#[async_trait]
impl StorageRepository for CountingStorage {
    async fn upload_image(&self, name: &str, bytes: Bytes) -> RepositoryResult<()> {
        self.inner.upload_image(name, bytes).await
    }

    async fn download_image(&self, name: &str) -> RepositoryResult<Bytes> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.download_image(name).await
    }

    async fn delete_image(&self, name: &str) -> RepositoryResult<()> {
        self.inner.delete_image(name).await
    }
}

struct Harness {
    _dir: TempDir,
    storage_dir: std::path::PathBuf,
    storage: Arc<CountingStorage>,
    cache: Arc<MemoryCache>,
    pipeline: ImagePipeline,
    service: ImageService,
}

async fn harness(pool: PoolConfig, config: ServiceConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage_dir = dir.path().to_path_buf();

    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let metadata = SqliteMetadataRepository::new(Arc::new(db));
    metadata.migrate().await.unwrap();

    let storage = Arc::new(CountingStorage {
        inner: DiskStorage::new(&storage_dir),
        downloads: AtomicUsize::new(0),
    });
    let cache = Arc::new(MemoryCache::new());
    let pipeline = ImagePipeline::new(
        Arc::new(WorkerPool::new(pool, Arc::new(ImageEngine))),
        PreviewConfig {
            width: 24,
            height: 24,
        },
    );
    let service = ImageService::new(
        Arc::new(metadata),
        storage.clone(),
        cache.clone(),
        pipeline.clone(),
        config,
    );

    Harness {
        _dir: dir,
        storage_dir,
        storage,
        cache,
        pipeline,
        service,
    }
}

async fn default_harness() -> Harness {
    harness(
        PoolConfig {
            workers: 2,
            queue_size: 4,
        },
        ServiceConfig::default(),
    )
    .await
}

fn cat_png() -> Bytes {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(50, 50, |x, y| {
        Rgb([(x * 5) as u8, (y * 5) as u8, 200])
    }));
    Bytes::from(codec::encode(&img, ImageFormat::Png).unwrap())
}

/// Every regular file under `dir`, recursively.
fn stored_files(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.is_dir() {
            out.extend(stored_files(&path));
        } else {
            out.push(entry.file_name().into_string().unwrap());
        }
    }
    out.sort();
    out
}

#[tokio::test]
async fn cat_png_resize_and_grayscale() {
    let h = default_harness().await;
    let user = Uuid::new_v4();
    let meta = h
        .service
        .upload(user, "cat.png", "a cat", cat_png())
        .await
        .unwrap();

    let chain = vec![
        Transformation::resize(10, 10),
        Transformation::new(TransformationKind::Grayscale),
    ];
    h.service.transform(user, "cat.png", &chain).await.unwrap();

    let (after, bytes) = h.service.get(user, "cat.png").await.unwrap();
    assert_eq!(after.id, meta.id);
    let (img, format) = codec::decode(&bytes).unwrap();
    assert_eq!(format, ImageFormat::Png);
    assert_eq!(img.dimensions(), (10, 10));
    assert!(img.to_rgb8().pixels().all(|p| p[0] == p[1] && p[1] == p[2]));

    let page = h.service.get_all(user, 1, 10).await.unwrap();
    assert_eq!(page.total, 1);
    let (preview, _) = codec::decode(&page.items[0].preview).unwrap();
    assert!(preview.width() <= 24 && preview.height() <= 24);
    assert!(preview.to_rgb8().pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
}

#[tokio::test]
async fn reads_are_served_from_cache_until_evicted() {
    let h = default_harness().await;
    let user = Uuid::new_v4();
    let meta = h
        .service
        .upload(user, "cat.png", "", cat_png())
        .await
        .unwrap();
    let names = meta.object_names();

    // upload populated both keys
    assert!(h.cache.get_image(&names.full).await.unwrap().is_some());
    assert!(h.cache.get_image(&names.preview).await.unwrap().is_some());

    for _ in 0..3 {
        h.service.get(user, "cat.png").await.unwrap();
    }
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 0);

    h.cache.delete_image(&names.full).await.unwrap();
    let (_, bytes) = h.service.get(user, "cat.png").await.unwrap();
    assert_eq!(bytes, cat_png());
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 1);

    h.service.get(user, "cat.png").await.unwrap();
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn objects_stay_paired_through_transform_and_delete() {
    let h = default_harness().await;
    let user = Uuid::new_v4();
    let meta = h
        .service
        .upload(user, "cat.png", "", cat_png())
        .await
        .unwrap();
    let names = meta.object_names();
    let mut expected = vec![names.full.clone(), names.preview.clone()];
    expected.sort();
    assert_eq!(stored_files(&h.storage_dir), expected);

    let original_preview = h.storage.inner.download_image(&names.preview).await.unwrap();
    h.service
        .transform(
            user,
            "cat.png",
            &[Transformation::new(TransformationKind::Invert)],
        )
        .await
        .unwrap();
    assert_eq!(stored_files(&h.storage_dir), expected);
    let new_preview = h.storage.inner.download_image(&names.preview).await.unwrap();
    assert_ne!(new_preview, original_preview);

    h.service.delete(user, "cat.png").await.unwrap();
    assert!(stored_files(&h.storage_dir).is_empty());
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn rejected_uploads_leave_no_trace() {
    let h = harness(
        PoolConfig {
            workers: 1,
            queue_size: 1,
        },
        ServiceConfig {
            max_image_size: 512,
            ..ServiceConfig::default()
        },
    )
    .await;
    let user = Uuid::new_v4();

    let oversized = h
        .service
        .upload(user, "big.png", "", cat_png())
        .await
        .unwrap_err();
    assert!(matches!(oversized, ServiceError::InvalidInput(_)));

    let unnamed = h
        .service
        .upload(user, "", "", Bytes::from_static(b"\x89PNG"))
        .await
        .unwrap_err();
    assert!(matches!(unnamed, ServiceError::InvalidInput(_)));

    assert!(stored_files(&h.storage_dir).is_empty());
    assert!(h.cache.is_empty().await);
    assert_eq!(h.service.admin_list_all_images(1, 25).await.unwrap().1, 0);
}

#[tokio::test]
async fn missing_option_is_named_in_the_error() {
    let h = default_harness().await;
    let user = Uuid::new_v4();
    h.service
        .upload(user, "cat.png", "", cat_png())
        .await
        .unwrap();

    let err = h
        .service
        .transform(
            user,
            "cat.png",
            &[Transformation::new(TransformationKind::Resize).with("width", 10.0)],
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidInput(msg) => assert!(msg.contains("height"), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_transforms_share_a_small_pool() {
    let h = harness(
        PoolConfig {
            workers: 2,
            queue_size: 1,
        },
        ServiceConfig::default(),
    )
    .await;
    let user = Uuid::new_v4();
    for i in 0..6 {
        h.service
            .upload(user, &format!("img-{i}.png"), "", cat_png())
            .await
            .unwrap();
    }

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .transform(user, &format!("img-{i}.png"), &[Transformation::resize(5, 7)])
                    .await
            })
        })
        .collect();
    for task in tasks {
        let (_, bytes) = task.await.unwrap().unwrap();
        assert_eq!(codec::decode(&bytes).unwrap().0.dimensions(), (5, 7));
    }
}

#[tokio::test]
async fn pipeline_shutdown_fails_new_work_but_keeps_reads() {
    let h = default_harness().await;
    let user = Uuid::new_v4();
    h.service
        .upload(user, "cat.png", "", cat_png())
        .await
        .unwrap();

    h.pipeline.wait().await;

    let err = h
        .service
        .transform(
            user,
            "cat.png",
            &[Transformation::new(TransformationKind::Sepia)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));

    let (_, bytes) = h.service.get(user, "cat.png").await.unwrap();
    assert_eq!(bytes, cat_png());
}
