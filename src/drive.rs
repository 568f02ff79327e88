//! Google Drive storage backend

use async_trait::async_trait;
use google_drive3::{api::File, hyper_rustls, hyper_util, DriveHub};
use std::io::Cursor;
use tracing::debug;

use crate::auth::DRIVE_SCOPE;
use crate::error::{ExportError, Result};
use crate::models::{FileBlob, FolderHandle};
use crate::storage::FileStore;

/// Type alias for the Drive hub to simplify type signatures
pub type DriveHubType =
    DriveHub<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Mime type Drive uses to mark folders
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Alias of the user's My Drive root folder
pub const ROOT_FOLDER_ID: &str = "root";

/// Drive-backed [`FileStore`]
///
/// Lookups return folders in whatever order Drive lists them; when several
/// folders share a name the caller takes the first.
pub struct DriveFileStore {
    hub: DriveHubType,
}

impl DriveFileStore {
    pub fn new(hub: DriveHubType) -> Self {
        Self { hub }
    }
}

/// Escape a value for use inside a single-quoted Drive query literal
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query selecting non-trashed folders named `name` directly under `parent_id`
pub fn folder_query(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
        escape_query_value(name),
        FOLDER_MIME,
        escape_query_value(parent_id)
    )
}

/// Metadata of a folder named `name` under `parent` (My Drive when `None`)
fn folder_metadata(parent: Option<&FolderHandle>, name: &str) -> File {
    File {
        name: Some(name.to_string()),
        mime_type: Some(FOLDER_MIME.to_string()),
        parents: Some(vec![parent_id(parent).to_string()]),
        ..Default::default()
    }
}

/// Folders are created as empty uploads carrying the folder mime type
fn folder_media_type() -> Result<mime::Mime> {
    FOLDER_MIME
        .parse()
        .map_err(|e| ExportError::StorageError(format!("Invalid folder mime type: {}", e)))
}

fn drive_error(error: google_drive3::Error, context: &str) -> ExportError {
    match error {
        google_drive3::Error::Failure(ref response) => {
            ExportError::from_status(response.status(), context)
        }
        google_drive3::Error::HttpError(ref err) => {
            ExportError::NetworkError(format!("{}: connection error: {}", context, err))
        }
        google_drive3::Error::Io(err) => ExportError::NetworkError(format!("{}: {}", context, err)),
        _ => ExportError::StorageError(format!("{}: {}", context, error)),
    }
}

fn parent_id(parent: Option<&FolderHandle>) -> &str {
    parent.map(|p| p.id.as_str()).unwrap_or(ROOT_FOLDER_ID)
}

#[async_trait]
impl FileStore for DriveFileStore {
    async fn find_folders(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<Vec<FolderHandle>> {
        let query = folder_query(parent_id(parent), name);
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .files()
                .list()
                .q(&query)
                .spaces("drive")
                .page_size(100)
                .param("fields", "nextPageToken, files(id, name)");

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call
                .add_scope(DRIVE_SCOPE)
                .doit()
                .await
                .map_err(|e| drive_error(e, "files.list"))?;

            for file in response.files.unwrap_or_default() {
                if let Some(id) = file.id {
                    folders.push(FolderHandle {
                        id,
                        name: file.name.unwrap_or_else(|| name.to_string()),
                    });
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Drive query {:?} matched {} folders", query, folders.len());
        Ok(folders)
    }

    async fn create_folder(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<FolderHandle> {
        let (_, created) = self
            .hub
            .files()
            .create(folder_metadata(parent, name))
            .param("fields", "id, name")
            .add_scope(DRIVE_SCOPE)
            .upload(Cursor::new(Vec::<u8>::new()), folder_media_type()?)
            .await
            .map_err(|e| drive_error(e, "files.create (folder)"))?;

        let id = created
            .id
            .ok_or_else(|| ExportError::StorageError("Created folder has no ID".to_string()))?;

        Ok(FolderHandle {
            id,
            name: name.to_string(),
        })
    }

    async fn create_file(&self, folder: &FolderHandle, file: FileBlob) -> Result<String> {
        let media_type: mime::Mime = file
            .mime_type
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);

        let metadata = File {
            name: Some(file.name.clone()),
            mime_type: Some(file.mime_type.clone()),
            parents: Some(vec![folder.id.clone()]),
            ..Default::default()
        };

        let size = file.data.len();
        let (_, created) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id")
            .add_scope(DRIVE_SCOPE)
            .upload(Cursor::new(file.data), media_type)
            .await
            .map_err(|e| drive_error(e, "files.create (upload)"))?;

        let id = created
            .id
            .ok_or_else(|| ExportError::StorageError("Uploaded file has no ID".to_string()))?;

        debug!("Uploaded {} ({} bytes) as {}", file.name, size, id);
        Ok(id)
    }
}
