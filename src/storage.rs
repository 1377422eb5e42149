use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    types::ObjectCannedAcl,
    Client,
};
use aws_smithy_types::{byte_stream::ByteStream, date_time::Format};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::config::S3Config;
use crate::store::format_timestamp;

/// What a HEAD request tells us about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// `Ok(None)` when the object does not exist; any other failure is an error.
    async fn head_object(&self, key: &str) -> anyhow::Result<Option<ObjectHead>>;
    fn public_url(&self, key: &str) -> String;

    /// Inverse of [`StorageClient::public_url`].
    fn key_from_url(&self, url: &str) -> Option<String> {
        let base = self.public_url("");
        url.strip_prefix(&base)
            .map(|k| k.split(['?', '#']).next().unwrap_or_default().to_string())
            .filter(|k| !k.is_empty())
    }
}

fn public_base(bucket: &str, region: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(ep) => format!("{}/{}/", ep.trim_end_matches('/'), bucket),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com/"),
    }
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    base_url: String,
}

impl Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let mut loader = defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
        if let (Some(access), Some(secret)) = (&cfg.access_key, &cfg.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access, secret, None, None, "static",
            ));
        }
        if let Some(ep) = &cfg.endpoint {
            loader = loader.endpoint_url(ep);
        }
        let shared = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(ep) = &cfg.endpoint {
            builder = builder.endpoint_url(ep).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            base_url: public_base(&cfg.bucket, &cfg.region, cfg.endpoint.as_deref()),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> anyhow::Result<Option<ObjectHead>> {
        let out = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    return Ok(None);
                }
                return Err(anyhow::Error::new(err).context("s3 head_object"));
            }
        };

        Ok(Some(ObjectHead {
            size: out.content_length().unwrap_or(0).max(0) as u64,
            last_modified: out
                .last_modified()
                .and_then(|d| d.fmt(Format::DateTime).ok()),
            content_type: out.content_type().map(str::to_string),
        }))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.base_url, key)
    }
}

struct MemoryObject {
    body: Bytes,
    content_type: String,
    last_modified: String,
}

/// Object storage kept in process memory, for local runs and tests.
pub struct MemoryStorage {
    objects: DashMap<String, MemoryObject>,
    base_url: String,
}

impl MemoryStorage {
    pub fn new(bucket: &str, region: &str) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: public_base(bucket, region, None),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[cfg(test)]
    pub fn body(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|o| o.body.clone())
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects.insert(
            key.to_string(),
            MemoryObject {
                body,
                content_type: content_type.to_string(),
                last_modified: format_timestamp(time::OffsetDateTime::now_utc()),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> anyhow::Result<Option<ObjectHead>> {
        Ok(self.objects.get(key).map(|o| ObjectHead {
            size: o.body.len() as u64,
            last_modified: Some(o.last_modified.clone()),
            content_type: Some(o.content_type.clone()),
        }))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.base_url, key)
    }
}
