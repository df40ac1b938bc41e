use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::ObjectStore;
use crate::error::UploadError;

#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    bytes: Vec<u8>,
}

/// Keeps objects in memory. Used in stub mode and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_keys_containing: Option<String>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            fail_keys_containing: None,
        }
    }

    /// Rejects every key containing `pattern`.
    pub fn failing_on(bucket: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            fail_keys_containing: Some(pattern.into()),
            ..Self::new(bucket)
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|o| o.content_type.clone()))
    }

    pub fn size(&self, key: &str) -> Option<usize> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|o| o.bytes.len()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<String, UploadError> {
        if let Some(pattern) = &self.fail_keys_containing {
            if key.contains(pattern.as_str()) {
                return Err(UploadError::Request {
                    key: key.to_string(),
                    message: "rejected by memory store".to_string(),
                });
            }
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut objects = self.objects.lock().map_err(|_| UploadError::Request {
            key: key.to_string(),
            message: "memory store lock poisoned".to_string(),
        })?;
        objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );

        Ok(self.url_for(key))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, UploadError> {
        let objects = self.objects.lock().map_err(|_| UploadError::Download {
            key: key.to_string(),
            message: "memory store lock poisoned".to_string(),
        })?;
        objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| UploadError::Download {
                key: key.to_string(),
                message: "no such object".to_string(),
            })
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }
}
