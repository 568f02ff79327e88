use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use mail_export::cli::{self, Cli, Commands, ExportOverrides};
use mail_export::config::Config;
use mail_export::error::ExportError;
use mail_export::mail::GmailMailSource;
use mail_export::processor::ExportReport;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Buffers one log event and prints it through MultiProgress so it lands above the bars
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            display_error(&e);
            process::exit(1);
        }
    }
}

/// Returns whether the command completed without failures
async fn run() -> Result<bool> {
    // Several dependencies pull in rustls; pick one crypto provider up front.
    // aws-lc-rs needs NASM/CMake on Windows, so ring is used there.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mail_export=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_export=info,warn"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(&multi_progress),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail and Drive...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hubs = mail_export::auth::initialize_hubs(&cli.credentials, &cli.token_cache).await?;

            println!("Successfully authenticated with Gmail and Drive");
            println!("Token cached at: {:?}", cli.token_cache);

            let address = GmailMailSource::new(hubs.gmail).email_address().await?;
            println!("Connected to account: {}", address);

            Ok(true)
        }

        Commands::Export {
            label,
            root_folder,
            backend,
            local_root,
            fail_fast,
            report,
        } => {
            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let overrides = ExportOverrides {
                label: label.clone(),
                root_folder: root_folder.clone(),
                backend: *backend,
                local_root: local_root.clone(),
                fail_fast: *fail_fast,
            };

            let export_report =
                cli::run_export(&cli, &overrides, (*multi_progress).clone()).await?;

            print_summary(&export_report);

            if let Some(path) = report {
                export_report.save(path).await?;
                println!("Report written to {:?}", path);
            }

            Ok(export_report.is_success())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(ExportError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - export.label: The mail label whose threads are exported");
            println!("  - export.root_folder: Top-level destination folder");
            println!("  - storage.backend: 'drive' or 'local'");
            println!("  - pdf.command: HTML to PDF converter reading stdin, writing stdout");

            Ok(true)
        }
    }
}

fn print_summary(report: &ExportReport) {
    println!("\n========================================");
    println!("Export Summary");
    println!("========================================");
    println!("Run ID: {}", report.run_id);
    println!("Label: {}", report.label);
    println!("Duration: {} seconds", report.duration_seconds());
    println!("Threads: {}", report.threads);
    println!("Messages: {}", report.messages);
    println!("PDFs written: {}", report.pdfs_written);
    println!("Raw emails written: {}", report.raw_emails_written);
    println!("Attachments written: {}", report.attachments_written);
    println!(
        "Images embedded: {} ({} failed)",
        report.images_embedded, report.images_failed
    );
    if !report.failures.is_empty() {
        println!("Failures: {}", report.failures.len());
        for failure in &report.failures {
            println!(
                "  - thread {} message {}: {} ({})",
                failure.thread_id,
                failure.message_id.as_deref().unwrap_or("-"),
                failure.error,
                failure.step
            );
        }
    }
    println!("========================================");
}

/// Display error with context and a hint where one helps
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    if let Some(export_err) = error.downcast_ref::<ExportError>() {
        match export_err {
            ExportError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: mail-export auth --force");
            }
            ExportError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: mail-export init-config --force");
            }
            ExportError::PdfError(_) => {
                eprintln!("\nHint: Check that pdf.command is installed and on your PATH.");
            }
            e if e.is_remote() => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again.");
            }
            _ => {}
        }
    }

    eprintln!("\nFor help, run: mail-export --help");
}
