//! Destination folder resolution
use crate::error::{ExportError, Result};
use crate::models::FolderHandle;
use crate::storage::FileStore;
use std::sync::Arc;
use tracing::info;

/// Resolves folders by name, creating the ones that do not exist yet
///
/// Resolution is idempotent: a second call with the same parent and name
/// returns the folder found by the first. When several folders share a name
/// the first one the store lists wins.
pub struct FolderManager {
    store: Arc<dyn FileStore>,
    root: FolderHandle,
}

impl FolderManager {
    /// Resolves or creates the top-level `root_name` folder
    pub async fn new(store: Arc<dyn FileStore>, root_name: &str) -> Result<Self> {
        let root = Self::resolve_or_create(store.as_ref(), None, root_name).await?;
        Ok(Self { store, root })
    }

    /// The top-level folder this manager was created for
    pub fn root_folder(&self) -> &FolderHandle {
        &self.root
    }

    /// Gets a top-level folder by name, creating it if necessary
    pub async fn resolve_or_create_root(&self, name: &str) -> Result<FolderHandle> {
        Self::resolve_or_create(self.store.as_ref(), None, name).await
    }

    /// Gets a direct child of `parent` by name, creating it if necessary
    pub async fn resolve_or_create_child(
        &self,
        parent: &FolderHandle,
        name: &str,
    ) -> Result<FolderHandle> {
        Self::resolve_or_create(self.store.as_ref(), Some(parent), name).await
    }

    async fn resolve_or_create(
        store: &dyn FileStore,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<FolderHandle> {
        let location = parent
            .map(|p| format!("in \"{}\"", p.name))
            .unwrap_or_else(|| "at the top level".to_string());

        if let Some(existing) = store.find_folders(parent, name).await?.into_iter().next() {
            info!("The folder \"{}\" already exists {}", name, location);
            return Ok(existing);
        }

        let created = store.create_folder(parent, name).await.map_err(|e| {
            ExportError::StorageError(format!("Failed to create folder '{}': {}", name, e))
        })?;
        info!("The folder \"{}\" has been created {}", name, location);
        Ok(created)
    }
}
