//! Asset store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::WorkflowError;

/// Reference to an uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub asset_id: String,
    pub url: String,
}

/// Trait for image storage operations.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `bytes` and returns where they can be fetched from.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<StoredAsset, WorkflowError>;

    /// Removes a stored asset.
    async fn delete(&self, asset_id: &str) -> Result<(), WorkflowError>;
}

#[derive(Debug)]
struct StoredFile {
    filename: String,
    content_type: String,
    size: usize,
}

#[derive(Debug, Default)]
struct InMemoryAssetState {
    files: HashMap<String, StoredFile>,
    next_id: u32,
    fail_on_upload: bool,
    fail_on_delete: bool,
}

/// In-memory asset store for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryAssetStore {
    base_url: String,
    state: Arc<RwLock<InMemoryAssetState>>,
}

impl InMemoryAssetStore {
    /// Creates a store that serves assets under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Arc::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryAssetState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryAssetState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail_on_upload(&self, fail: bool) {
        self.write().fail_on_upload = fail;
    }

    pub fn set_fail_on_delete(&self, fail: bool) {
        self.write().fail_on_delete = fail;
    }

    /// Returns the number of stored assets.
    pub fn asset_count(&self) -> usize {
        self.read().files.len()
    }

    /// Returns true if an asset exists with the given ID.
    pub fn has_asset(&self, asset_id: &str) -> bool {
        self.read().files.contains_key(asset_id)
    }

    /// Size and content type of a stored asset.
    pub fn describe(&self, asset_id: &str) -> Option<(String, String, usize)> {
        self.read()
            .files
            .get(asset_id)
            .map(|f| (f.filename.clone(), f.content_type.clone(), f.size))
    }
}

impl Default for InMemoryAssetStore {
    fn default() -> Self {
        Self::new("http://localhost:3000/assets")
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<StoredAsset, WorkflowError> {
        let mut state = self.write();

        if state.fail_on_upload {
            return Err(WorkflowError::AssetStore("Upload failed".to_string()));
        }

        state.next_id += 1;
        let asset_id = format!("storefront/img-{:04}", state.next_id);
        let url = format!("{}/{asset_id}", self.base_url);
        state.files.insert(
            asset_id.clone(),
            StoredFile {
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                size: bytes.len(),
            },
        );

        Ok(StoredAsset { asset_id, url })
    }

    async fn delete(&self, asset_id: &str) -> Result<(), WorkflowError> {
        let mut state = self.write();

        if state.fail_on_delete {
            return Err(WorkflowError::AssetStore("Delete failed".to_string()));
        }

        state.files.remove(asset_id);
        Ok(())
    }
}
