//! Export into a local directory tree from parsed RFC 822 messages

mod common;

use common::*;
use mail_export::models::MailMessage;
use mail_export::processor::{EmailProcessor, ExportServices};
use mail_export::storage::LocalFileStore;
use std::sync::Arc;
use tempfile::TempDir;

const ORDER_EMAIL: &str = "From: Shop <shop@example.com>\r\n\
To: me@example.com\r\n\
Subject: Order: #17 <shipped>\r\n\
Date: Sat, 2 Mar 2024 08:15:00 +0100\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Your order has shipped</p>\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"tracking.txt\"\r\n\
\r\n\
TRACK-123\r\n\
--B--\r\n";

fn parsed_order() -> MailMessage {
    MailMessage::from_rfc822("m1", ORDER_EMAIL.as_bytes().to_vec(), None).unwrap()
}

#[tokio::test]
async fn test_export_writes_directory_tree() {
    let dir = TempDir::new().unwrap();
    let mail = Arc::new(FakeMailSource::new().with_thread("t1", vec![parsed_order()]));
    let renderer = Arc::new(RecordingRenderer::new());

    let services = ExportServices {
        mail,
        store: Arc::new(LocalFileStore::new(dir.path())),
        renderer: renderer.clone(),
        fetcher: Arc::new(FakeFetcher::new()),
    };

    let processor = EmailProcessor::new("Receipts", "Exported Emails", services, isolated_options())
        .await
        .unwrap();
    let report = processor.process_emails().await.unwrap();

    assert!(report.is_success());

    let label_dir = dir.path().join("Exported Emails").join("Receipts");
    let stem = "2024-03-02_Order #17 shipped";

    let pdf = std::fs::read(label_dir.join(format!("{}.pdf", stem))).unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let eml = std::fs::read(label_dir.join("Original Emails").join(format!("{}.eml", stem))).unwrap();
    assert_eq!(eml, ORDER_EMAIL.as_bytes());

    let tracking = std::fs::read_to_string(
        label_dir
            .join("Attachments")
            .join(format!("{}_tracking.txt", stem)),
    )
    .unwrap();
    assert!(tracking.starts_with("TRACK-123"));

    let documents = renderer.documents();
    assert!(documents[0].starts_with("<!DOCTYPE html>"));
    assert!(documents[0].contains("Your order has shipped"));
}

#[tokio::test]
async fn test_existing_directories_are_reused() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("Exported Emails").join("Receipts").join("Attachments"))
        .unwrap();
    std::fs::write(
        dir.path()
            .join("Exported Emails")
            .join("Receipts")
            .join("Attachments")
            .join("keep.txt"),
        b"keep",
    )
    .unwrap();

    let services = ExportServices {
        mail: Arc::new(FakeMailSource::new()),
        store: Arc::new(LocalFileStore::new(dir.path())),
        renderer: Arc::new(RecordingRenderer::new()),
        fetcher: Arc::new(FakeFetcher::new()),
    };

    let processor = EmailProcessor::new("Receipts", "Exported Emails", services, isolated_options())
        .await
        .unwrap();
    processor.process_emails().await.unwrap();

    assert_eq!(processor.attachments_folder().id, "Exported Emails/Receipts/Attachments");
    assert!(dir
        .path()
        .join("Exported Emails/Receipts/Attachments/keep.txt")
        .exists());
    assert!(dir.path().join("Exported Emails/Receipts/Original Emails").is_dir());
}

#[tokio::test]
async fn test_traversal_label_is_rejected_locally() {
    let dir = TempDir::new().unwrap();
    let services = ExportServices {
        mail: Arc::new(FakeMailSource::new()),
        store: Arc::new(LocalFileStore::new(dir.path())),
        renderer: Arc::new(RecordingRenderer::new()),
        fetcher: Arc::new(FakeFetcher::new()),
    };

    let result = EmailProcessor::new("..", "Exported Emails", services, isolated_options()).await;

    assert!(result.is_err());
    assert!(!dir.path().join("Exported Emails").join("..").join("Original Emails").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_external_converter_output_is_stored() {
    use mail_export::pdf::CommandPdfRenderer;

    let dir = TempDir::new().unwrap();
    let services = ExportServices {
        mail: Arc::new(FakeMailSource::new().with_thread("t1", vec![parsed_order()])),
        store: Arc::new(LocalFileStore::new(dir.path())),
        // `cat` stands in for a converter: the stored "PDF" is the document itself
        renderer: Arc::new(CommandPdfRenderer::new("cat", vec![])),
        fetcher: Arc::new(FakeFetcher::new()),
    };

    let processor = EmailProcessor::new("Receipts", "Exported Emails", services, isolated_options())
        .await
        .unwrap();
    let report = processor.process_emails().await.unwrap();

    assert_eq!(report.pdfs_written, 1);
    let stored = std::fs::read_to_string(
        dir.path()
            .join("Exported Emails/Receipts/2024-03-02_Order #17 shipped.pdf"),
    )
    .unwrap();
    assert!(stored.contains("<title>2024-03-02_Order #17 shipped.pdf</title>"));
}
