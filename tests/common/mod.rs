//! Common test utilities and fakes

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::DateTime;
use mail_export::error::{ExportError, Result};
use mail_export::images::{FetchedResource, ImageFetcher};
use mail_export::mail::MailSource;
use mail_export::models::{Attachment, FileBlob, FolderHandle, MailMessage, MailThread};
use mail_export::pdf::PdfRenderer;
use mail_export::processor::{ExportOptions, ExportServices};
use mail_export::storage::FileStore;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Build a message; `date` is RFC 3339 and keeps its offset
pub fn create_test_message(id: &str, subject: &str, date: &str, html: &str) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        subject: subject.to_string(),
        date: DateTime::parse_from_rfc3339(date).unwrap(),
        html_body: html.to_string(),
        raw: format!("Subject: {}\r\n\r\n{}\r\n", subject, html).into_bytes(),
        attachments: Vec::new(),
    }
}

pub fn create_test_attachment(name: &str, content_type: &str, data: &[u8]) -> Attachment {
    Attachment {
        name: name.to_string(),
        content_type: content_type.to_string(),
        content_id: None,
        data: data.to_vec(),
    }
}

/// A file the in-memory store received, with the path of its folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub folder_path: String,
    pub blob: FileBlob,
}

#[derive(Default)]
struct MemoryState {
    /// (parent id, folder) in creation order
    folders: Vec<(Option<String>, FolderHandle)>,
    files: Vec<StoredFile>,
    folder_creations: usize,
    file_creations: usize,
}

/// In-memory [`FileStore`] that tracks folder identity and every write
#[derive(Default)]
pub struct MemoryFileStore {
    state: Mutex<MemoryState>,
    /// File names ending with one of these suffixes fail to upload
    failing_suffixes: Vec<String>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(suffixes: &[&str]) -> Self {
        Self {
            failing_suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn path_of(state: &MemoryState, id: &str) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(current_id) = current {
            match state.folders.iter().find(|(_, f)| f.id == current_id) {
                Some((parent, folder)) => {
                    segments.push(folder.name.clone());
                    current = parent.clone();
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }

    /// Slash-joined paths of every folder, in creation order
    pub fn folder_paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .folders
            .iter()
            .map(|(_, f)| Self::path_of(&state, &f.id))
            .collect()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.state.lock().unwrap().files.clone()
    }

    pub fn files_in(&self, folder_path: &str) -> Vec<FileBlob> {
        self.files()
            .into_iter()
            .filter(|f| f.folder_path == folder_path)
            .map(|f| f.blob)
            .collect()
    }

    pub fn file_names_in(&self, folder_path: &str) -> Vec<String> {
        self.files_in(folder_path)
            .into_iter()
            .map(|blob| blob.name)
            .collect()
    }

    pub fn folder_creations(&self) -> usize {
        self.state.lock().unwrap().folder_creations
    }

    /// Attempted uploads, failed ones included
    pub fn file_creations(&self) -> usize {
        self.state.lock().unwrap().file_creations
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn find_folders(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<Vec<FolderHandle>> {
        let parent_id = parent.map(|p| p.id.clone());
        Ok(self
            .state
            .lock()
            .unwrap()
            .folders
            .iter()
            .filter(|(p, f)| *p == parent_id && f.name == name)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn create_folder(
        &self,
        parent: Option<&FolderHandle>,
        name: &str,
    ) -> Result<FolderHandle> {
        let mut state = self.state.lock().unwrap();
        state.folder_creations += 1;
        let handle = FolderHandle {
            id: format!("folder-{}", state.folder_creations),
            name: name.to_string(),
        };
        state
            .folders
            .push((parent.map(|p| p.id.clone()), handle.clone()));
        Ok(handle)
    }

    async fn create_file(&self, folder: &FolderHandle, file: FileBlob) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.file_creations += 1;

        if self
            .failing_suffixes
            .iter()
            .any(|suffix| file.name.ends_with(suffix.as_str()))
        {
            return Err(ExportError::StorageError(format!(
                "upload of {} rejected",
                file.name
            )));
        }

        let folder_path = Self::path_of(&state, &folder.id);
        state.files.push(StoredFile { folder_path, blob: file });
        Ok(format!("file-{}", state.file_creations))
    }
}

/// Mail source serving fixed threads; some threads or messages can fail
#[derive(Default)]
pub struct FakeMailSource {
    threads: Vec<(MailThread, Vec<MailMessage>)>,
    failing_threads: HashSet<String>,
    failing_messages: HashSet<String>,
    queries: Mutex<Vec<String>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeMailSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread(mut self, id: &str, messages: Vec<MailMessage>) -> Self {
        self.threads.push((MailThread { id: id.to_string() }, messages));
        self
    }

    pub fn with_failing_thread(mut self, id: &str) -> Self {
        self.threads
            .push((MailThread { id: id.to_string() }, Vec::new()));
        self.failing_threads.insert(id.to_string());
        self
    }

    /// Make fetching message `id` fail while it is still listed in its thread
    pub fn with_failing_message(mut self, id: &str) -> Self {
        self.failing_messages.insert(id.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Message ids passed to `fetch_message`, in call order
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for FakeMailSource {
    async fn search_threads(&self, query: &str) -> Result<Vec<MailThread>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.threads.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn thread_message_ids(&self, thread: &MailThread) -> Result<Vec<String>> {
        if self.failing_threads.contains(&thread.id) {
            return Err(ExportError::MailError(format!(
                "thread {} unavailable",
                thread.id
            )));
        }
        self.threads
            .iter()
            .find(|(t, _)| t.id == thread.id)
            .map(|(_, messages)| messages.iter().map(|m| m.id.clone()).collect())
            .ok_or_else(|| ExportError::NotFound(thread.id.clone()))
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage> {
        self.fetches.lock().unwrap().push(id.to_string());
        if self.failing_messages.contains(id) {
            return Err(ExportError::MailError(format!(
                "Message {} has no raw content",
                id
            )));
        }
        self.threads
            .iter()
            .flat_map(|(_, messages)| messages.iter())
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ExportError::NotFound(id.to_string()))
    }
}

/// Fetcher serving canned responses and counting calls per URL
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FetchedResource>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, content_type: Option<&str>, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedResource {
                content_type: content_type.map(str::to_string),
                body: body.to_vec(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| ExportError::NetworkError(format!("connection refused: {}", url)))
    }
}

/// Renderer that records the documents it is given
#[derive(Default)]
pub struct RecordingRenderer {
    documents: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfRenderer for RecordingRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>> {
        self.documents.lock().unwrap().push(html.to_string());
        if self.fail {
            return Err(ExportError::PdfError("converter crashed".to_string()));
        }
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(html.as_bytes());
        Ok(pdf)
    }
}

/// The fakes behind one processor, kept so tests can inspect them afterwards
pub struct TestHarness {
    pub mail: Arc<FakeMailSource>,
    pub store: Arc<MemoryFileStore>,
    pub renderer: Arc<RecordingRenderer>,
    pub fetcher: Arc<FakeFetcher>,
}

impl TestHarness {
    pub fn new(mail: FakeMailSource, fetcher: FakeFetcher) -> Self {
        Self {
            mail: Arc::new(mail),
            store: Arc::new(MemoryFileStore::new()),
            renderer: Arc::new(RecordingRenderer::new()),
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn with_store(mut self, store: MemoryFileStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_renderer(mut self, renderer: RecordingRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn services(&self) -> ExportServices {
        ExportServices {
            mail: self.mail.clone(),
            store: self.store.clone(),
            renderer: self.renderer.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

pub fn isolated_options() -> ExportOptions {
    ExportOptions::default()
}

pub fn fail_fast_options() -> ExportOptions {
    ExportOptions {
        fail_fast: true,
        ..ExportOptions::default()
    }
}

/// Collects formatted log output so tests can assert on what was logged
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Install a subscriber writing into this capture for the current thread
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
