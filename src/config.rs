use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Custom endpoint (MinIO, localstack). Switches to path-style URLs.
    pub endpoint: Option<String>,
    pub in_memory: bool,
}

/// How uploaded objects are named inside their folder.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    /// `folder/<unix millis>_<sanitized name>`
    Timestamp,
    /// `folder/<uuid>.<ext>`
    Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub key_scheme: KeyScheme,
    pub status_poll_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub s3: S3Config,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "schoolfund".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "schoolfund-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let in_memory = std::env::var("STORAGE_BACKEND")
            .map(|v| v == "memory")
            .unwrap_or(false);
        let bucket = match std::env::var("AWS_S3_BUCKET_NAME") {
            Ok(b) => b,
            Err(_) if in_memory => "local".into(),
            Err(e) => return Err(anyhow::anyhow!("AWS_S3_BUCKET_NAME: {e}")),
        };
        let s3 = S3Config {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into()),
            bucket,
            access_key: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            in_memory,
        };

        let key_scheme = match std::env::var("UPLOAD_KEY_SCHEME").as_deref() {
            Ok("uuid") => KeyScheme::Uuid,
            _ => KeyScheme::Timestamp,
        };
        let upload = UploadConfig {
            max_bytes: env_or("UPLOAD_MAX_BYTES", 5 * 1024 * 1024),
            key_scheme,
            status_poll_secs: env_or("UPLOAD_STATUS_POLL_SECS", 10),
        };

        let rate_limit = RateLimitConfig {
            window_secs: env_or("RATE_LIMIT_WINDOW_SECS", 60),
            max_requests: env_or("RATE_LIMIT_MAX", 100),
        };

        Ok(Self {
            database_url,
            jwt,
            s3,
            upload,
            rate_limit,
        })
    }
}
