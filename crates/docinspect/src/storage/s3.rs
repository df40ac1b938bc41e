use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use secrecy::ExposeSecret;

use super::ObjectStore;
use crate::config::StorageConfig;
use crate::error::UploadError;
use crate::secrets;

/// S3 or any S3-compatible service (MinIO in local setups).
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    path_style: bool,
    url_base: Option<String>,
}

impl S3Store {
    pub async fn connect(config: &StorageConfig) -> Result<Self, UploadError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        let access = secrets::resolve_ref(&config.access_key)
            .map_err(|e| UploadError::Client(e.to_string()))?;
        let secret = secrets::resolve_ref(&config.secret_key)
            .map_err(|e| UploadError::Client(e.to_string()))?;
        if let (Some(access), Some(secret)) = (access, secret) {
            loader = loader.credentials_provider(Credentials::new(
                access.expose_secret(),
                secret.expose_secret(),
                None,
                None,
                "docinspect-config",
            ));
        }

        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let store = Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            path_style: config.path_style,
            url_base: config
                .public_endpoint
                .clone()
                .or_else(|| config.endpoint.clone()),
        };
        store.ensure_bucket().await;
        Ok(store)
    }

    /// Creates the bucket when it is missing. Failures are logged only; the
    /// first upload reports the real problem.
    async fn ensure_bucket(&self) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return;
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => tracing::info!(bucket = %self.bucket, "Created bucket"),
            Err(e) => tracing::warn!(bucket = %self.bucket, error = %e, "Could not create bucket"),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<String, UploadError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::Request {
                key: key.to_string(),
                message: format!("Failed to open file for streaming: {}", e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::Request {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(self.url_for(key))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, UploadError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| UploadError::Download {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let data = output.body.collect().await.map_err(|e| UploadError::Download {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(data.into_bytes().to_vec())
    }

    fn url_for(&self, key: &str) -> String {
        object_url(
            self.url_base.as_deref(),
            &self.bucket,
            &self.region,
            self.path_style,
            key,
        )
    }
}

/// Public URL of an object.
///
/// With a base endpoint the URL is path-style (`{base}/{bucket}/{key}`) or
/// virtual-hosted (`{scheme}://{bucket}.{host}/{key}`). Without one it points
/// at AWS for the region.
pub fn object_url(base: Option<&str>, bucket: &str, region: &str, path_style: bool, key: &str) -> String {
    match base.map(|b| b.trim_end_matches('/')) {
        Some(base) if path_style => format!("{}/{}/{}", base, bucket, key),
        Some(base) => match base.split_once("://") {
            Some((scheme, host)) => format!("{}://{}.{}/{}", scheme, bucket, host, key),
            None => format!("{}.{}/{}", bucket, base, key),
        },
        None if path_style => format!("https://s3.{}.amazonaws.com/{}/{}", region, bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}
