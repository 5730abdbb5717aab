use super::{AssetHandle, AssetStore};
use crate::{Error, Result};
use dashmap::DashMap;
use metatrack_common::AssetId;
use metatrack_media::MuxedAsset;
use std::sync::Arc;

/// In-process store. Assets keep their finalize-time files until removed.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: DashMap<AssetId, Arc<MuxedAsset>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetStore for MemoryAssetStore {
    fn store(&self, asset: MuxedAsset) -> Result<AssetHandle> {
        let id = AssetId::new();
        self.assets.insert(id, Arc::new(asset));
        Ok(AssetHandle::new(id))
    }

    fn fetch(&self, handle: &AssetHandle) -> Result<Arc<MuxedAsset>> {
        self.assets
            .get(&handle.id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::NotFound(handle.id))
    }

    fn list(&self) -> Result<Vec<AssetHandle>> {
        Ok(self.assets.iter().map(|e| AssetHandle::new(*e.key())).collect())
    }

    fn remove(&self, handle: &AssetHandle) -> Result<()> {
        self.assets
            .remove(&handle.id)
            .map(|_| ())
            .ok_or(Error::NotFound(handle.id))
    }
}
