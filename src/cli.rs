//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth;
use crate::config::{Config, StorageBackend};
use crate::drive::DriveFileStore;
use crate::error::Result;
use crate::images::HttpImageFetcher;
use crate::mail::GmailMailSource;
use crate::pdf::CommandPdfRenderer;
use crate::processor::{EmailProcessor, ExportOptions, ExportReport, ExportServices};
use crate::storage::{FileStore, LocalFileStore};

#[derive(Parser, Debug)]
#[command(name = "mail-export")]
#[command(version)]
#[command(about = "Export labeled mail threads to PDF, raw .eml and attachments", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".mail-export/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with the Gmail and Drive APIs
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Export every message carrying the configured label
    Export {
        /// Label to export (overrides export.label)
        #[arg(short, long)]
        label: Option<String>,

        /// Top-level destination folder (overrides export.root_folder)
        #[arg(long)]
        root_folder: Option<String>,

        /// Storage backend: drive or local (overrides storage.backend)
        #[arg(long)]
        backend: Option<StorageBackend>,

        /// Base directory for the local backend (overrides storage.local_root)
        #[arg(long)]
        local_root: Option<PathBuf>,

        /// Abort on the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Write a report here (.json for JSON, Markdown otherwise)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ExportOverrides {
    pub label: Option<String>,
    pub root_folder: Option<String>,
    pub backend: Option<StorageBackend>,
    pub local_root: Option<PathBuf>,
    pub fail_fast: bool,
}

impl ExportOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(label) = &self.label {
            config.export.label = label.clone();
        }
        if let Some(root_folder) = &self.root_folder {
            config.export.root_folder = root_folder.clone();
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(local_root) = &self.local_root {
            config.storage.local_root = local_root.clone();
        }
        if self.fail_fast {
            config.export.fail_fast = true;
        }
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the configuration and apply command-line overrides on top
pub async fn load_config(cli: &Cli, overrides: &ExportOverrides) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Build the production services for `config` and run one export
///
/// Steps:
/// 1. Load configuration and apply overrides
/// 2. Authenticate with Gmail and Drive
/// 3. Resolve the destination folders
/// 4. Export every thread carrying the label
pub async fn run_export(
    cli: &Cli,
    overrides: &ExportOverrides,
    multi: MultiProgress,
) -> Result<ExportReport> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let config = load_config(cli, overrides).await?;
    reporter.finish_spinner(
        &config_spinner,
        &format!(
            "Exporting label \"{}\" into \"{}\" ({:?} storage)",
            config.export.label, config.export.root_folder, config.storage.backend
        ),
    );

    let auth_spinner = reporter.add_spinner("Authenticating with Google APIs...");
    let hubs = auth::initialize_hubs(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&auth_spinner, "Google APIs authenticated");

    let store: Arc<dyn FileStore> = match config.storage.backend {
        StorageBackend::Drive => Arc::new(DriveFileStore::new(hubs.drive)),
        StorageBackend::Local => {
            tracing::info!("Writing to local directory {:?}", config.storage.local_root);
            Arc::new(LocalFileStore::new(&config.storage.local_root))
        }
    };

    let services = ExportServices {
        mail: Arc::new(GmailMailSource::new(hubs.gmail)),
        store,
        renderer: Arc::new(CommandPdfRenderer::from_config(&config.pdf)),
        fetcher: Arc::new(HttpImageFetcher::new(&config.images.user_agent)?),
    };

    let folder_spinner = reporter.add_spinner("Resolving destination folders...");
    let processor = EmailProcessor::new(
        &config.export.label,
        &config.export.root_folder,
        services,
        ExportOptions::from_config(&config),
    )
    .await?;
    reporter.finish_spinner(
        &folder_spinner,
        &format!(
            "Destination folder ready: {}/{}",
            config.export.root_folder, processor.label_folder().name
        ),
    );

    let bar = reporter.add_progress_bar(0, "Exporting threads...");
    let progress_bar = bar.clone();
    let processor = processor.with_progress(Arc::new(move |done: usize, total: usize| {
        progress_bar.set_length(total as u64);
        progress_bar.set_position(done as u64);
    }));

    let result = processor.process_emails().await;
    match &result {
        Ok(report) => bar.finish_with_message(format!(
            "Exported {} messages from {} threads",
            report.messages, report.threads
        )),
        Err(_) => bar.abandon_with_message("Export aborted"),
    }

    result
}
