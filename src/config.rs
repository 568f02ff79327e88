use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub images: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Mail label whose threads are exported
    #[serde(default = "default_label")]
    pub label: String,
    /// Top-level storage folder holding one subfolder per label
    #[serde(default = "default_root_folder")]
    pub root_folder: String,
    /// Abort the whole run on the first failed export step
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            root_folder: default_root_folder(),
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Drive,
    Local,
}

impl std::str::FromStr for StorageBackend {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "drive" => Ok(StorageBackend::Drive),
            "local" => Ok(StorageBackend::Local),
            other => Err(ExportError::ConfigError(format!(
                "Invalid storage backend: '{}'. Must be 'drive' or 'local'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Base directory used by the local backend
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local_root: default_local_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Converter reading HTML on stdin and writing PDF on stdout
    #[serde(default = "default_pdf_command")]
    pub command: String,
    #[serde(default = "default_pdf_args")]
    pub args: Vec<String>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            command: default_pdf_command(),
            args: default_pdf_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Inline remote `<img src="http...">` references as data URIs
    #[serde(default = "default_embed_remote")]
    pub embed_remote: bool,
    /// Inline `cid:` references from the message's own attachments
    #[serde(default)]
    pub embed_cid: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            embed_remote: default_embed_remote(),
            embed_cid: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_label() -> String {
    "YOUR_LABEL".to_string()
}

fn default_root_folder() -> String {
    "Exported Emails".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("exported")
}

fn default_pdf_command() -> String {
    "wkhtmltopdf".to_string()
}

fn default_pdf_args() -> Vec<String> {
    vec![
        "--quiet".to_string(),
        "--encoding".to_string(),
        "utf-8".to_string(),
        "-".to_string(),
        "-".to_string(),
    ]
}

fn default_embed_remote() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("mail-export/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Read the config file. Values are not validated here, call
    /// [`Config::validate`] once command-line overrides are applied.
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ExportError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExportError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ExportError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.export.label.trim().is_empty() {
            return Err(ExportError::ConfigError(
                "export.label cannot be empty".to_string(),
            ));
        }
        // The label doubles as a folder name
        if self.export.label.contains('/') {
            return Err(ExportError::ConfigError(
                "export.label cannot contain '/' character".to_string(),
            ));
        }
        if self.export.root_folder.trim().is_empty() {
            return Err(ExportError::ConfigError(
                "export.root_folder cannot be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Local
            && self.storage.local_root.as_os_str().is_empty()
        {
            return Err(ExportError::ConfigError(
                "storage.local_root cannot be empty for the local backend".to_string(),
            ));
        }

        if self.pdf.command.trim().is_empty() {
            return Err(ExportError::ConfigError(
                "pdf.command cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
