//! Export pipeline: label search, PDF rendering, raw copies and attachments
//!
//! [`EmailProcessor`] resolves its destination folders once at construction
//! and then exports every message of every thread carrying the label:
//!
//! ```text
//! <root>/<label>/<date>_<subject>.pdf
//! <root>/<label>/Original Emails/<date>_<subject>.eml
//! <root>/<label>/Attachments/<date>_<subject>_<attachment name>
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ExportError, Result};
use crate::folder_manager::FolderManager;
use crate::images::{embed_cid_images, embed_images_in_html, ImageFetcher};
use crate::mail::{label_query, MailSource};
use crate::models::{FileBlob, FolderHandle, MailMessage, MailThread};
use crate::naming::{FileStem, PDF_MIME, RFC822_MIME};
use crate::pdf::{wrap_html_document, PdfRenderer};
use crate::storage::FileStore;

/// Name of the label subfolder receiving raw `.eml` copies
pub const RAW_EMAILS_FOLDER: &str = "Original Emails";

/// Name of the label subfolder receiving attachments
pub const ATTACHMENTS_FOLDER: &str = "Attachments";

/// Called after each thread with (threads done, threads total)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// External capabilities the pipeline runs against
#[derive(Clone)]
pub struct ExportServices {
    pub mail: Arc<dyn MailSource>,
    pub store: Arc<dyn FileStore>,
    pub renderer: Arc<dyn PdfRenderer>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Inline remote images before rendering
    pub embed_remote: bool,
    /// Inline `cid:` images from the message's attachments before rendering
    pub embed_cid: bool,
    /// Abort on the first failure instead of recording it and moving on
    pub fail_fast: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            embed_remote: true,
            embed_cid: false,
            fail_fast: false,
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            embed_remote: config.images.embed_remote,
            embed_cid: config.images.embed_cid,
            fail_fast: config.export.fail_fast,
        }
    }
}

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStep {
    /// Listing the messages of a thread
    Thread,
    /// Downloading one message
    Fetch,
    Pdf,
    RawEmail,
    Attachments,
}

impl fmt::Display for ExportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportStep::Thread => "thread",
            ExportStep::Fetch => "fetch",
            ExportStep::Pdf => "pdf",
            ExportStep::RawEmail => "raw email",
            ExportStep::Attachments => "attachments",
        };
        f.write_str(name)
    }
}

/// One recorded failure; message fields are empty for thread-level failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    pub thread_id: String,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub step: ExportStep,
    pub error: String,
}

/// Summary of one export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub run_id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub threads: usize,
    pub messages: usize,
    pub pdfs_written: usize,
    pub raw_emails_written: usize,
    pub attachments_written: usize,
    pub images_embedded: usize,
    pub images_failed: usize,
    pub failures: Vec<MessageFailure>,
}

impl ExportReport {
    fn new(label: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            started_at: now,
            completed_at: now,
            threads: 0,
            messages: 0,
            pdfs_written: 0,
            raw_emails_written: 0,
            attachments_written: 0,
            images_embedded: 0,
            images_failed: 0,
            failures: Vec::new(),
        }
    }

    /// True when no export step failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Mail Export Report\n\n");
        md.push_str(&format!(
            "Generated: {}\n\n",
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!("- **Label:** {}\n", self.label));
        md.push_str(&format!("- **Threads:** {}\n", self.threads));
        md.push_str(&format!("- **Messages:** {}\n", self.messages));
        md.push_str(&format!("- **PDFs written:** {}\n", self.pdfs_written));
        md.push_str(&format!(
            "- **Raw emails written:** {}\n",
            self.raw_emails_written
        ));
        md.push_str(&format!(
            "- **Attachments written:** {}\n",
            self.attachments_written
        ));
        md.push_str(&format!(
            "- **Images embedded:** {} ({} failed)\n",
            self.images_embedded, self.images_failed
        ));
        md.push_str(&format!(
            "- **Processing time:** {} minutes {} seconds\n\n",
            self.duration_seconds() / 60,
            self.duration_seconds() % 60
        ));

        if self.failures.is_empty() {
            md.push_str("All messages were exported without errors.\n");
            return md;
        }

        md.push_str(&format!("## Failures ({})\n\n", self.failures.len()));
        md.push_str("| Thread | Message | Subject | Step | Error |\n");
        md.push_str("|--------|---------|---------|------|-------|\n");
        for failure in &self.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                failure.thread_id,
                failure.message_id.as_deref().unwrap_or("-"),
                escape_cell(failure.subject.as_deref().unwrap_or("-")),
                failure.step,
                escape_cell(&failure.error)
            ));
        }

        md
    }

    /// Save the report; `.json` paths get JSON, anything else Markdown
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => self.to_markdown(),
        };
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn describe_message(message_id: Option<&str>, subject: Option<&str>) -> String {
    match (message_id, subject) {
        (Some(id), Some(subject)) => format!(", message {} (\"{}\")", id, subject),
        (Some(id), None) => format!(", message {}", id),
        _ => String::new(),
    }
}

/// Exports every message carrying one label
pub struct EmailProcessor {
    label: String,
    services: ExportServices,
    options: ExportOptions,
    label_folder: FolderHandle,
    raw_emails_folder: FolderHandle,
    attachments_folder: FolderHandle,
    progress: Option<ProgressCallback>,
}

impl EmailProcessor {
    /// Resolve (or create) `<root_name>/<label>` and its two subfolders.
    ///
    /// Folder resolution failures are returned; nothing is exported yet.
    pub async fn new(
        label: &str,
        root_name: &str,
        services: ExportServices,
        options: ExportOptions,
    ) -> Result<Self> {
        let folders = FolderManager::new(services.store.clone(), root_name).await?;
        let root = folders.root_folder().clone();

        let label_folder = folders.resolve_or_create_child(&root, label).await?;
        let raw_emails_folder = folders
            .resolve_or_create_child(&label_folder, RAW_EMAILS_FOLDER)
            .await?;
        let attachments_folder = folders
            .resolve_or_create_child(&label_folder, ATTACHMENTS_FOLDER)
            .await?;

        Ok(Self {
            label: label.to_string(),
            services,
            options,
            label_folder,
            raw_emails_folder,
            attachments_folder,
            progress: None,
        })
    }

    /// Report progress after every thread
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn label_folder(&self) -> &FolderHandle {
        &self.label_folder
    }

    pub fn raw_emails_folder(&self) -> &FolderHandle {
        &self.raw_emails_folder
    }

    pub fn attachments_folder(&self) -> &FolderHandle {
        &self.attachments_folder
    }

    /// Export every message of every thread carrying the label.
    ///
    /// The search failing is always an error. Past that point failures are
    /// recorded in the report and skipped, unless `fail_fast` is set, in which
    /// case the first one is returned.
    pub async fn process_emails(&self) -> Result<ExportReport> {
        let mut report = ExportReport::new(&self.label);

        let threads = self
            .services
            .mail
            .search_threads(&label_query(&self.label))
            .await?;

        if threads.is_empty() {
            info!("No emails found with the label \"{}\".", self.label);
            report.completed_at = Utc::now();
            return Ok(report);
        }
        info!(
            "Found {} threads with the label \"{}\".",
            threads.len(),
            self.label
        );

        let total = threads.len();
        for (index, thread) in threads.iter().enumerate() {
            info!("Processing thread {} / {}", index + 1, total);
            report.threads += 1;

            match self.services.mail.thread_message_ids(thread).await {
                Ok(ids) => {
                    for (message_index, id) in ids.iter().enumerate() {
                        self.process_message(thread, message_index, id, &mut report)
                            .await?;
                    }
                }
                Err(e) => {
                    self.record_failure(&mut report, thread, None, None, ExportStep::Thread, e)?
                }
            }

            if let Some(progress) = &self.progress {
                progress(index + 1, total);
            }
        }

        report.completed_at = Utc::now();
        if report.is_success() {
            info!("All emails have been processed.");
        } else {
            warn!(
                "Processed all emails with {} failures.",
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Fetch one message and run the three export steps on it.
    ///
    /// Only one message is held in memory at a time.
    async fn process_message(
        &self,
        thread: &MailThread,
        index: usize,
        id: &str,
        report: &mut ExportReport,
    ) -> Result<()> {
        report.messages += 1;

        let fetched = match self.services.mail.fetch_message(id).await {
            Ok(message) => message,
            Err(e) => {
                return self.record_failure(report, thread, Some(id), None, ExportStep::Fetch, e)
            }
        };
        let message = &fetched;
        let id = Some(message.id.as_str());
        let subject = Some(message.subject.as_str());

        let stem = FileStem::new(&message.subject, &message.date);
        info!(
            "Processing message {}, subject: \"{}\", date: {}",
            index + 1,
            stem.subject,
            stem.date
        );

        match self.export_email_to_pdf(message, &stem).await {
            Ok((embedded, failed)) => {
                report.pdfs_written += 1;
                report.images_embedded += embedded;
                report.images_failed += failed;
            }
            Err(e) => self.record_failure(report, thread, id, subject, ExportStep::Pdf, e)?,
        }

        match self.save_raw_email(message, &stem).await {
            Ok(()) => report.raw_emails_written += 1,
            Err(e) => {
                self.record_failure(report, thread, id, subject, ExportStep::RawEmail, e)?
            }
        }

        if let Err(e) = self.save_attachments(message, &stem, report).await {
            self.record_failure(report, thread, id, subject, ExportStep::Attachments, e)?;
        }

        Ok(())
    }

    /// Record a failure, or hand it back when running fail-fast
    fn record_failure(
        &self,
        report: &mut ExportReport,
        thread: &MailThread,
        message_id: Option<&str>,
        subject: Option<&str>,
        step: ExportStep,
        error: ExportError,
    ) -> Result<()> {
        if self.options.fail_fast {
            return Err(error);
        }

        error!(
            "Failed to export {} of thread {}{}: {}",
            step,
            thread.id,
            describe_message(message_id, subject),
            error
        );

        report.failures.push(MessageFailure {
            thread_id: thread.id.clone(),
            message_id: message_id.map(str::to_string),
            subject: subject.map(str::to_string),
            step,
            error: error.to_string(),
        });
        Ok(())
    }

    /// Render the message body to PDF in the label folder.
    ///
    /// Returns the number of images embedded and the number that failed.
    async fn export_email_to_pdf(
        &self,
        message: &MailMessage,
        stem: &FileStem,
    ) -> Result<(usize, usize)> {
        let pdf_name = stem.pdf_name();
        let mut html = message.html_body.clone();
        let mut embedded = 0;
        let mut failed = 0;

        if self.options.embed_cid {
            let result = embed_cid_images(&html, &message.attachments);
            html = result.html;
            embedded += result.embedded;
        }

        if self.options.embed_remote {
            let result = embed_images_in_html(&html, self.services.fetcher.as_ref()).await;
            html = result.html;
            embedded += result.embedded;
            failed += result.failed;
        }

        let document = wrap_html_document(&html, &pdf_name);
        let pdf = self.services.renderer.render(&document).await?;

        self.services
            .store
            .create_file(&self.label_folder, FileBlob::new(&pdf_name, PDF_MIME, pdf))
            .await?;
        info!("Email successfully exported to PDF: \"{}\"", pdf_name);

        Ok((embedded, failed))
    }

    async fn save_raw_email(&self, message: &MailMessage, stem: &FileStem) -> Result<()> {
        let eml_name = stem.eml_name();

        self.services
            .store
            .create_file(
                &self.raw_emails_folder,
                FileBlob::new(&eml_name, RFC822_MIME, message.raw.clone()),
            )
            .await?;
        info!("Raw email successfully saved: \"{}\"", eml_name);

        Ok(())
    }

    async fn save_attachments(
        &self,
        message: &MailMessage,
        stem: &FileStem,
        report: &mut ExportReport,
    ) -> Result<()> {
        info!("Found {} attachments.", message.attachments.len());

        for attachment in &message.attachments {
            let attachment_name = stem.attachment_name(&attachment.name);

            self.services
                .store
                .create_file(
                    &self.attachments_folder,
                    FileBlob::new(
                        &attachment_name,
                        &attachment.content_type,
                        attachment.data.clone(),
                    ),
                )
                .await?;
            report.attachments_written += 1;
            info!("Attachment successfully saved: \"{}\"", attachment_name);
        }

        Ok(())
    }
}
