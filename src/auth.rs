//! OAuth2 authentication for the Gmail and Drive APIs
//!
//! One installed-flow authenticator is shared by both hubs, so a single
//! browser consent covers reading mail and writing to Drive.

use google_drive3::DriveHub;
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::drive::DriveHubType;
use crate::error::{ExportError, Result};
use crate::mail::GmailHub;

/// Read-only access to messages and their raw content
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Full Drive access, needed to find folders this app did not create
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Scopes requested up front so the cached token covers every call
pub const REQUIRED_SCOPES: &[&str] = &[GMAIL_READONLY_SCOPE, DRIVE_SCOPE];

/// Hubs for both Google APIs, sharing one authenticator and HTTP client
pub struct GoogleHubs {
    pub gmail: GmailHub,
    pub drive: DriveHubType,
}

/// Initialize the Gmail and Drive hubs with OAuth2
///
/// This sets up:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk for automatic refresh
/// - An HTTP/1 client with TLS support shared by both hubs
///
/// Credentials come from `credentials_path`, or from the environment when
/// that file does not exist (see [`load_credentials_from_env`]).
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 credentials JSON file
/// * `token_cache_path` - Path where access tokens will be cached
pub async fn initialize_hubs(credentials_path: &Path, token_cache_path: &Path) -> Result<GoogleHubs> {
    let secret = if credentials_path.exists() {
        yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| ExportError::AuthError(format!("Failed to read credentials: {}", e)))?
    } else {
        debug!(
            "{:?} not found, reading OAuth2 client from the environment",
            credentials_path
        );
        load_credentials_from_env().map_err(|e| {
            ExportError::AuthError(format!(
                "No credentials file at {:?} and {}",
                credentials_path, e
            ))
        })?
    };

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| ExportError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries every scope the run needs
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| ExportError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    // HTTP/1 works better with the generated Google clients
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| ExportError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    info!("Authenticated with Gmail and Drive");
    Ok(GoogleHubs {
        gmail: Gmail::new(client.clone(), auth.clone()),
        drive: DriveHub::new(client, auth),
    })
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `MAIL_EXPORT_CLIENT_ID`: OAuth2 client ID
/// - `MAIL_EXPORT_CLIENT_SECRET`: OAuth2 client secret
/// - `MAIL_EXPORT_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("MAIL_EXPORT_CLIENT_ID")
        .map_err(|_| ExportError::ConfigError("MAIL_EXPORT_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("MAIL_EXPORT_CLIENT_SECRET")
        .map_err(|_| ExportError::ConfigError("MAIL_EXPORT_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("MAIL_EXPORT_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the ACLs inherited from the user profile
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
