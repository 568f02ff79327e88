//! HTML to PDF rendering
//!
//! Rendering is delegated to an external converter that reads an HTML
//! document on stdin and writes the PDF to stdout (`wkhtmltopdf - -` by
//! default).

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::PdfConfig;
use crate::error::{ExportError, Result};

/// Trait for converting an HTML document into PDF bytes
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>>;
}

/// Runs an external converter once per document
#[derive(Debug, Clone)]
pub struct CommandPdfRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandPdfRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &PdfConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl PdfRenderer for CommandPdfRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExportError::PdfError(format!("Failed to start '{}': {}", self.program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::PdfError("Converter stdin unavailable".to_string()))?;

        // Feed stdin while stdout is drained so large documents cannot deadlock
        let input = html.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child.wait_with_output().await?;
        let write_result = writer
            .await
            .map_err(|e| ExportError::PdfError(format!("Converter input task failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::PdfError(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        write_result.map_err(|e| {
            ExportError::PdfError(format!("Failed to write HTML to '{}': {}", self.program, e))
        })?;

        if output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::PdfError(format!(
                "'{}' produced no output: {}",
                self.program,
                stderr.trim()
            )));
        }

        debug!(
            "Rendered {} bytes of HTML into {} bytes of PDF",
            html.len(),
            output.stdout.len()
        );
        Ok(output.stdout)
    }
}

/// Wrap a body fragment into a complete UTF-8 document titled `title`.
///
/// Bodies that already contain an `<html` tag are returned unchanged.
pub fn wrap_html_document(html: &str, title: &str) -> String {
    if html.to_ascii_lowercase().contains("<html") {
        return html.to_string();
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>{}</body></html>",
        escape_text(title),
        html
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
