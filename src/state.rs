use crate::config::AppConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::storage::{MemoryStorage, Storage, StorageClient};
use crate::store::{DocumentStore, MemoryStore, PgStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?) as Arc<dyn DocumentStore>,
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory document store");
                Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>
            }
        };

        let storage = if config.s3.in_memory {
            tracing::warn!("STORAGE_BACKEND=memory; uploads are not persisted");
            Arc::new(MemoryStorage::new(&config.s3.bucket, &config.s3.region)) as Arc<dyn StorageClient>
        } else {
            if config.s3.access_key.is_none() || config.s3.secret_key.is_none() {
                tracing::warn!("AWS credentials not set explicitly; falling back to the default provider chain");
            }
            Arc::new(Storage::new(&config.s3).await?) as Arc<dyn StorageClient>
        };

        Ok(Self::from_parts(store, config, storage))
    }

    pub fn from_parts(
        store: Arc<dyn DocumentStore>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        ));
        Self {
            store,
            config,
            storage,
            rate_limiter,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_storage(Arc::new(MemoryStorage::new("fake", "us-east-1")))
    }

    #[cfg(test)]
    pub fn fake_with_storage(storage: Arc<dyn StorageClient>) -> Self {
        use crate::config::{JwtConfig, KeyScheme, RateLimitConfig, S3Config, UploadConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            s3: S3Config {
                region: "us-east-1".into(),
                bucket: "fake".into(),
                access_key: None,
                secret_key: None,
                endpoint: None,
                in_memory: true,
            },
            upload: UploadConfig {
                max_bytes: 5 * 1024 * 1024,
                key_scheme: KeyScheme::Timestamp,
                status_poll_secs: 1,
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: 1000,
            },
        });

        Self::from_parts(Arc::new(MemoryStore::new()), config, storage)
    }
}
