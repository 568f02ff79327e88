//! Mail source abstraction and the Gmail API implementation

use async_trait::async_trait;
use chrono::DateTime;
use google_gmail1::{hyper_rustls, hyper_util, Gmail};
use tracing::debug;

use crate::auth::GMAIL_READONLY_SCOPE as GMAIL_SCOPE;
use crate::error::{ExportError, Result};
use crate::models::{MailMessage, MailThread};

/// Type alias for the Gmail hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Search query selecting every thread carrying `label`
pub fn label_query(label: &str) -> String {
    format!("label:{}", label)
}

/// Trait defining the mail operations the exporter needs, for easier testing
#[async_trait]
pub trait MailSource: Send + Sync {
    /// All threads matching a provider search query
    async fn search_threads(&self, query: &str) -> Result<Vec<MailThread>>;

    /// Message ids of a thread in provider order
    async fn thread_message_ids(&self, thread: &MailThread) -> Result<Vec<String>>;

    /// Download and parse one message
    async fn fetch_message(&self, id: &str) -> Result<MailMessage>;
}

/// Gmail-backed [`MailSource`]
///
/// Messages are fetched in `raw` format and parsed locally, so the `.eml`
/// copy is byte-identical to what Gmail stores.
pub struct GmailMailSource {
    hub: GmailHub,
}

impl GmailMailSource {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Address of the authenticated mailbox
    pub async fn email_address(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await
            .map_err(|e| ExportError::from_google(e, "users.getProfile"))?;

        Ok(profile.email_address.unwrap_or_default())
    }
}

#[async_trait]
impl MailSource for GmailMailSource {
    async fn search_threads(&self, query: &str) -> Result<Vec<MailThread>> {
        let mut threads = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .threads_list("me")
                .q(query)
                .max_results(100);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call
                .add_scope(GMAIL_SCOPE)
                .doit()
                .await
                .map_err(|e| ExportError::from_google(e, "threads.list"))?;

            threads.extend(
                response
                    .threads
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|thread| thread.id)
                    .map(|id| MailThread { id }),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Query {:?} matched {} threads", query, threads.len());
        Ok(threads)
    }

    async fn thread_message_ids(&self, thread: &MailThread) -> Result<Vec<String>> {
        let (_, response) = self
            .hub
            .users()
            .threads_get("me", &thread.id)
            .format("minimal")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await
            .map_err(|e| ExportError::from_google(e, "threads.get"))?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| message.id)
            .collect())
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("raw")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await
            .map_err(|e| ExportError::from_google(e, "messages.get"))?;

        let raw = message.raw.ok_or_else(|| {
            ExportError::MailError(format!("Message {} has no raw content", id))
        })?;
        let internal_date = message.internal_date.and_then(DateTime::from_timestamp_millis);

        MailMessage::from_rfc822(id, raw, internal_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_query() {
        assert_eq!(label_query("Receipts"), "label:Receipts");
        assert_eq!(label_query("my-label"), "label:my-label");
    }
}
