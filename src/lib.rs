//! Labeled mail export
//!
//! Exports every thread carrying a mail label into a folder hierarchy:
//! each message is rendered to PDF, archived as its original `.eml`, and its
//! attachments are saved alongside.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed flow shared by the Gmail and Drive hubs
//! - **Mail**: label search and raw message retrieval behind [`MailSource`]
//! - **Storage**: Google Drive or a local directory behind [`FileStore`]
//! - **Rendering**: remote and `cid:` image inlining, HTML to PDF through [`PdfRenderer`]
//! - **Reporting**: per-run [`ExportReport`] with isolated per-message failures
//!
//! # Example Usage
//!
//! ```no_run
//! use mail_export::{auth, config::Config};
//! use mail_export::drive::DriveFileStore;
//! use mail_export::images::HttpImageFetcher;
//! use mail_export::mail::GmailMailSource;
//! use mail_export::pdf::CommandPdfRenderer;
//! use mail_export::processor::{EmailProcessor, ExportOptions, ExportServices};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     config.validate()?;
//!
//!     let hubs = auth::initialize_hubs(
//!         "credentials.json".as_ref(),
//!         ".mail-export/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let services = ExportServices {
//!         mail: Arc::new(GmailMailSource::new(hubs.gmail)),
//!         store: Arc::new(DriveFileStore::new(hubs.drive)),
//!         renderer: Arc::new(CommandPdfRenderer::from_config(&config.pdf)),
//!         fetcher: Arc::new(HttpImageFetcher::new(&config.images.user_agent)?),
//!     };
//!
//!     let processor = EmailProcessor::new(
//!         &config.export.label,
//!         &config.export.root_folder,
//!         services,
//!         ExportOptions::from_config(&config),
//!     )
//!     .await?;
//!
//!     let report = processor.process_emails().await?;
//!     println!("{}", report.to_markdown());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and hub initialization
//! - [`cli`] - Command-line interface and production wiring
//! - [`config`] - Configuration management
//! - [`drive`] - Google Drive storage backend
//! - [`error`] - Error types and result aliases
//! - [`folder_manager`] - Idempotent destination folder resolution
//! - [`images`] - Image fetching and inlining
//! - [`mail`] - Mail source trait and Gmail implementation
//! - [`models`] - Core data structures and RFC 822 parsing
//! - [`naming`] - Output file naming
//! - [`pdf`] - HTML to PDF rendering
//! - [`processor`] - The export pipeline and its report
//! - [`storage`] - Storage trait and local directory backend

pub mod auth;
pub mod cli;
pub mod config;
pub mod drive;
pub mod error;
pub mod folder_manager;
pub mod images;
pub mod mail;
pub mod models;
pub mod naming;
pub mod pdf;
pub mod processor;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{ExportError, Result};

// Core data models
pub use models::{Attachment, FileBlob, FolderHandle, MailMessage, MailThread};

// Config types
pub use config::{Config, ExportConfig, ImageConfig, PdfConfig, StorageBackend, StorageConfig};

// Capability traits and their production implementations
pub use drive::DriveFileStore;
pub use images::{FetchedResource, HttpImageFetcher, ImageFetcher};
pub use mail::{GmailMailSource, MailSource};
pub use pdf::{CommandPdfRenderer, PdfRenderer};
pub use storage::{FileStore, LocalFileStore};

// Pipeline types
pub use folder_manager::FolderManager;
pub use processor::{
    EmailProcessor, ExportOptions, ExportReport, ExportServices, ExportStep, MessageFailure,
};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ExportOverrides, ProgressReporter};
