//! Hierarchical file storage abstraction and the local-directory backend

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::models::{FileBlob, FolderHandle};

/// Storage operations the exporter needs
///
/// `parent == None` addresses the top level of the store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Folders named exactly `name` directly under `parent`, in provider order
    async fn find_folders(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<Vec<FolderHandle>>;

    /// Create a folder named `name` directly under `parent`
    async fn create_folder(&self, parent: Option<&FolderHandle>, name: &str)
        -> Result<FolderHandle>;

    /// Create a file inside `folder`, returning the provider's file id
    async fn create_file(&self, folder: &FolderHandle, file: FileBlob) -> Result<String>;
}

/// Stores folders as directories below a base path
///
/// Folder ids are paths relative to the base directory. Existing files are
/// overwritten.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base: PathBuf,
}

impl LocalFileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn folder_path(&self, folder: Option<&FolderHandle>) -> PathBuf {
        match folder {
            Some(folder) => self.base.join(&folder.id),
            None => self.base.clone(),
        }
    }

    fn relative_id(parent: Option<&FolderHandle>, name: &str) -> String {
        match parent {
            Some(parent) => format!("{}/{}", parent.id, name),
            None => name.to_string(),
        }
    }
}

/// Reject names that would escape the target directory
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(ExportError::InvalidName(format!(
            "'{}' cannot be used as a local file or folder name",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn find_folders(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<Vec<FolderHandle>> {
        validate_entry_name(name)?;
        let path = self.folder_path(parent).join(name);

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => Ok(vec![FolderHandle {
                id: Self::relative_id(parent, name),
                name: name.to_string(),
            }]),
            Ok(_) => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ExportError::StorageError(format!(
                "Failed to inspect {:?}: {}",
                path, e
            ))),
        }
    }

    async fn create_folder(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<FolderHandle> {
        validate_entry_name(name)?;
        let path = self.folder_path(parent).join(name);

        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            ExportError::StorageError(format!("Failed to create folder {:?}: {}", path, e))
        })?;
        debug!("Created directory {:?}", path);

        Ok(FolderHandle {
            id: Self::relative_id(parent, name),
            name: name.to_string(),
        })
    }

    async fn create_file(&self, folder: &FolderHandle, file: FileBlob) -> Result<String> {
        validate_entry_name(&file.name)?;
        let path = self.folder_path(Some(folder)).join(&file.name);

        tokio::fs::write(&path, &file.data).await.map_err(|e| {
            ExportError::StorageError(format!("Failed to write {:?}: {}", path, e))
        })?;
        debug!("Wrote {} bytes to {:?}", file.data.len(), path);

        Ok(format!("{}/{}", folder.id, file.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_find_missing_folder_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());

        let found = store.find_folders(None, "Exported Emails").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_find_folder() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());

        let root = store.create_folder(None, "Exported Emails").await.unwrap();
        let label = store.create_folder(Some(&root), "Receipts").await.unwrap();

        assert_eq!(label.id, "Exported Emails/Receipts");
        assert!(dir.path().join("Exported Emails").join("Receipts").is_dir());

        let found = store.find_folders(Some(&root), "Receipts").await.unwrap();
        assert_eq!(found, vec![label]);
    }

    #[tokio::test]
    async fn test_file_is_not_a_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Receipts"), b"x").unwrap();
        let store = LocalFileStore::new(dir.path());

        let found = store.find_folders(None, "Receipts").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_create_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());
        let folder = store.create_folder(None, "Attachments").await.unwrap();

        store
            .create_file(&folder, FileBlob::new("a.txt", "text/plain", b"one".to_vec()))
            .await
            .unwrap();
        let id = store
            .create_file(&folder, FileBlob::new("a.txt", "text/plain", b"two".to_vec()))
            .await
            .unwrap();

        assert_eq!(id, "Attachments/a.txt");
        let content = std::fs::read(dir.path().join("Attachments").join("a.txt")).unwrap();
        assert_eq!(content, b"two");
    }

    #[tokio::test]
    async fn test_rejects_traversal_names() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(dir.path());
        let folder = store.create_folder(None, "Attachments").await.unwrap();

        for name in ["..", ".", "", "../escape.txt", "nested/file.txt", r"win\file.txt"] {
            let result = store
                .create_file(&folder, FileBlob::new(name, "text/plain", vec![]))
                .await;
            assert!(
                matches!(result, Err(ExportError::InvalidName(_))),
                "expected {:?} to be rejected",
                name
            );
        }

        assert!(matches!(
            store.create_folder(None, "..").await,
            Err(ExportError::InvalidName(_))
        ));
    }
}
