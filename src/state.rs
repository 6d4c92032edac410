use crate::services::ImageService;
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub images: ImageService,
    /// Probed by `/readyz`.
    pub db: Arc<SqlitePool>,
    pub storage_dir: PathBuf,
}
