//! Durable storage for finished recordings.
//!
//! Stores are atomic: after `store` either the whole asset is retrievable
//! or nothing changed.

mod directory;
mod memory;

pub use directory::DirectoryAssetStore;
pub use memory::MemoryAssetStore;

use crate::Result;
use metatrack_common::AssetId;
use metatrack_media::MuxedAsset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reference to a stored asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    pub id: AssetId,
}

impl AssetHandle {
    pub fn new(id: AssetId) -> Self {
        Self { id }
    }
}

impl From<AssetId> for AssetHandle {
    fn from(id: AssetId) -> Self {
        Self { id }
    }
}

impl std::fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Persists and retrieves muxed assets.
pub trait AssetStore: Send + Sync {
    /// Take ownership of a finalized asset and make it durable.
    fn store(&self, asset: MuxedAsset) -> Result<AssetHandle>;

    /// Retrieve a stored asset for playback.
    fn fetch(&self, handle: &AssetHandle) -> Result<Arc<MuxedAsset>>;

    /// Handles of every stored asset.
    fn list(&self) -> Result<Vec<AssetHandle>>;

    fn remove(&self, handle: &AssetHandle) -> Result<()>;
}
