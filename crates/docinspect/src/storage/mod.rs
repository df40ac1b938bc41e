//! Object storage for per-document artifacts.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::error::UploadError;

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::{object_url, S3Store};

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_PNG: &str = "image/png";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `path` under `key`, replacing any existing object, and
    /// returns the URL clients use to fetch it.
    async fn put_file(&self, key: &str, path: &std::path::Path, content_type: &str) -> Result<String, UploadError>;

    /// Reads an object back in full.
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, UploadError>;

    fn url_for(&self, key: &str) -> String;
}

/// Object keys for one document: `sessions/{sid}/documents/{did}/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKeys {
    prefix: String,
}

impl DocumentKeys {
    pub fn new(session_id: i64, document_id: i64) -> Self {
        Self {
            prefix: format!("sessions/{}/documents/{}", session_id, document_id),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn original_pdf(&self) -> String {
        format!("{}/original.pdf", self.prefix)
    }

    pub fn page(&self, index: u32) -> String {
        format!("{}/pages/page_{}.png", self.prefix, index)
    }

    pub fn labeled_page(&self, index: u32) -> String {
        format!("{}/labeled/page_{}.png", self.prefix, index)
    }

    pub fn labeled_pdf(&self) -> String {
        format!("{}/labeled/labeled.pdf", self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct UploadItem {
    pub key: String,
    pub path: PathBuf,
    pub content_type: &'static str,
}

impl UploadItem {
    pub fn pdf(key: String, path: PathBuf) -> Self {
        Self {
            key,
            path,
            content_type: CONTENT_TYPE_PDF,
        }
    }

    pub fn png(key: String, path: PathBuf) -> Self {
        Self {
            key,
            path,
            content_type: CONTENT_TYPE_PNG,
        }
    }
}

/// Uploads every item with at most `concurrency` requests in flight.
/// Stops at the first failure. Returns key → URL.
pub async fn upload_all(
    store: &dyn ObjectStore,
    items: Vec<UploadItem>,
    concurrency: usize,
) -> Result<HashMap<String, String>, UploadError> {
    let count = items.len();
    let urls: Vec<(String, String)> = stream::iter(items)
        .map(|item| async move {
            let url = store
                .put_file(&item.key, &item.path, item.content_type)
                .await?;
            Ok::<_, UploadError>((item.key, url))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    tracing::debug!(count, "Uploaded artifacts");
    Ok(urls.into_iter().collect())
}
