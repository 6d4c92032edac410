use crate::{
    pipeline::{PoolConfig, PreviewConfig},
    repositories::cache::DEFAULT_CACHE_CAPACITY,
    services::ServiceConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// CLI flags win over `IMAGE_VAULT_*` environment variables, which win over
/// defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub workers: usize,
    pub queue_size: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_bytes: u64,
    pub max_image_size: usize,
    pub preview_width: u32,
    pub preview_height: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image storage and transformation API")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_VAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_VAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image objects are stored (overrides IMAGE_VAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_VAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Transformation workers (overrides IMAGE_VAULT_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Pending-job queue capacity (overrides IMAGE_VAULT_QUEUE_SIZE)
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Cache entry lifetime in seconds (overrides IMAGE_VAULT_CACHE_TTL_SECS)
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Byte budget of the in-process cache (overrides IMAGE_VAULT_CACHE_MAX_BYTES)
    #[arg(long)]
    pub cache_max_bytes: Option<u64>,

    /// Largest accepted upload in bytes (overrides IMAGE_VAULT_MAX_IMAGE_SIZE)
    #[arg(long)]
    pub max_image_size: Option<usize>,

    /// Preview width (overrides IMAGE_VAULT_PREVIEW_WIDTH)
    #[arg(long)]
    pub preview_width: Option<u32>,

    /// Preview height (overrides IMAGE_VAULT_PREVIEW_HEIGHT)
    #[arg(long)]
    pub preview_height: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |key| env::var(key))?, migrate))
    }

    fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let defaults = PoolConfig::default();
        let service = ServiceConfig::default();
        let preview = PreviewConfig::default();

        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|_| default.into());

        Ok(Self {
            host: args.host.unwrap_or_else(|| text("IMAGE_VAULT_HOST", "0.0.0.0")),
            port: pick(args.port, &lookup, "IMAGE_VAULT_PORT", 3000)?,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| text("IMAGE_VAULT_STORAGE_DIR", "./data/images")),
            database_url: args.database_url.unwrap_or_else(|| {
                text(
                    "IMAGE_VAULT_DATABASE_URL",
                    "sqlite://./data/meta/image_vault.db",
                )
            }),
            workers: pick(args.workers, &lookup, "IMAGE_VAULT_WORKERS", defaults.workers)?,
            queue_size: pick(
                args.queue_size,
                &lookup,
                "IMAGE_VAULT_QUEUE_SIZE",
                defaults.queue_size,
            )?,
            cache_ttl_secs: pick(
                args.cache_ttl_secs,
                &lookup,
                "IMAGE_VAULT_CACHE_TTL_SECS",
                service.cache_ttl.as_secs(),
            )?,
            cache_max_bytes: pick(
                args.cache_max_bytes,
                &lookup,
                "IMAGE_VAULT_CACHE_MAX_BYTES",
                DEFAULT_CACHE_CAPACITY,
            )?,
            max_image_size: pick(
                args.max_image_size,
                &lookup,
                "IMAGE_VAULT_MAX_IMAGE_SIZE",
                service.max_image_size,
            )?,
            preview_width: pick(
                args.preview_width,
                &lookup,
                "IMAGE_VAULT_PREVIEW_WIDTH",
                preview.width,
            )?,
            preview_height: pick(
                args.preview_height,
                &lookup,
                "IMAGE_VAULT_PREVIEW_HEIGHT",
                preview.height,
            )?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_size: self.queue_size,
        }
    }

    pub fn preview(&self) -> PreviewConfig {
        PreviewConfig {
            width: self.preview_width,
            height: self.preview_height,
        }
    }

    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            max_image_size: self.max_image_size,
        }
    }
}

/// CLI value, else parsed env value, else default.
fn pick<T>(
    cli: Option<T>,
    lookup: impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
