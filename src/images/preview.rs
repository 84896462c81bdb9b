use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::ai::request::ImageInput;

#[derive(Debug, Clone)]
pub struct StoredPreview {
    pub content_type: String,
    pub body: Bytes,
}

/// Displayable copies of uploaded photos, addressable by id while a review is open.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Mutex<HashMap<Uuid, StoredPreview>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `image` and returns the handle that owns the entry.
    pub fn create(&self, image: &ImageInput) -> ImagePreview {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            StoredPreview {
                content_type: image.mime_type.clone(),
                body: image.data.clone(),
            },
        );
        debug!(%id, "image preview created");
        ImagePreview {
            id,
            registry: self.clone(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<StoredPreview> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: Uuid) {
        if self.lock().remove(&id).is_some() {
            debug!(%id, "image preview released");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, StoredPreview>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owning handle to a registered preview. The entry is removed when the handle is
/// released or dropped.
pub struct ImagePreview {
    id: Uuid,
    registry: PreviewRegistry,
}

impl ImagePreview {
    pub fn url(&self) -> String {
        format!("/api/v1/previews/{}", self.id)
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ImagePreview {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for ImagePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePreview").field("id", &self.id).finish()
    }
}
