//! Object storage for uploaded files (profile pictures).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::directory::ResidentId;
use crate::error::{BarangayError, Result};

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Trait for storing uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object, and return the
    /// URL the object can be fetched from.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Fetch an object, `None` if nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<StoredObject>>;

    async fn delete(&self, path: &str) -> Result<()>;
}

/// Storage path of a resident's profile picture.
///
/// The file name must be a single path segment.
pub fn avatar_path(resident_id: ResidentId, file_name: &str) -> Result<String> {
    let file_name = file_name.trim();
    if file_name.is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains("..")
    {
        return Err(BarangayError::Validation(format!(
            "Invalid file name '{}'",
            file_name
        )));
    }
    Ok(format!("profile-pictures/{}/{}", resident_id.0, file_name))
}

/// Guess a content type from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Object store keeping everything in memory. URLs use the `memory://` scheme.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        tracing::debug!(path, size = bytes.len(), "Storing object");
        self.objects.lock().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{}", path))
    }

    async fn get(&self, path: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.lock().get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.lock().remove(path);
        Ok(())
    }
}
