use super::{AssetHandle, AssetStore};
use crate::{Error, Result};
use metatrack_common::AssetId;
use metatrack_media::MuxedAsset;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const EXTENSION: &str = "mp4";

/// Keeps each asset as `<id>.mp4` under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    /// Open a store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &AssetId) -> PathBuf {
        self.root.join(format!("{}.{}", id, EXTENSION))
    }

    /// Copy into a temp file under the root, then rename into place.
    fn copy_into_place(&self, asset: &MuxedAsset, dest: &Path) -> Result<()> {
        let tmp = NamedTempFile::new_in(&self.root)?;
        std::fs::copy(asset.path(), tmp.path())?;
        tmp.persist(dest)
            .map_err(|e| Error::store(format!("cannot place {}: {}", dest.display(), e.error)))?;
        Ok(())
    }
}

impl AssetStore for DirectoryAssetStore {
    fn store(&self, mut asset: MuxedAsset) -> Result<AssetHandle> {
        let id = AssetId::new();
        let dest = self.path_for(&id);

        if let Err(e) = asset.persist(&dest) {
            // Rename fails across filesystems.
            debug!(error = %e, "Rename into store failed, copying");
            self.copy_into_place(&asset, &dest)?;
        }

        info!(asset_id = %id, path = %dest.display(), "Stored asset");
        Ok(AssetHandle::new(id))
    }

    fn fetch(&self, handle: &AssetHandle) -> Result<Arc<MuxedAsset>> {
        let path = self.path_for(&handle.id);
        if !path.exists() {
            return Err(Error::NotFound(handle.id));
        }
        Ok(Arc::new(MuxedAsset::open(&path)?))
    }

    fn list(&self) -> Result<Vec<AssetHandle>> {
        let mut handles = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<AssetId>().ok())
            {
                handles.push(AssetHandle::new(id));
            }
        }
        Ok(handles)
    }

    fn remove(&self, handle: &AssetHandle) -> Result<()> {
        match std::fs::remove_file(self.path_for(&handle.id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(handle.id)),
            Err(e) => Err(e.into()),
        }
    }
}
