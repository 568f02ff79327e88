use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// A thread returned by a label search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailThread {
    pub id: String,
}

/// One message of a thread, with everything the export needs already loaded
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    /// Timestamp in the offset it was sent with
    pub date: DateTime<FixedOffset>,
    pub html_body: String,
    /// RFC 822 bytes exactly as the provider returned them
    pub raw: Vec<u8>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub content_id: Option<String>,
    pub data: Vec<u8>,
}

/// Opaque reference to a folder in the storage provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderHandle {
    pub id: String,
    pub name: String,
}

/// A named file body handed to the storage provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl MailMessage {
    /// Build a message from its raw RFC 822 form.
    ///
    /// The `Date` header wins over `internal_date` so the message keeps the
    /// offset it was written with; `internal_date` (UTC) is the fallback and
    /// the Unix epoch the last resort.
    pub fn from_rfc822(
        id: impl Into<String>,
        raw: Vec<u8>,
        internal_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let id = id.into();
        let parsed = MessageParser::default().parse(&raw).ok_or_else(|| {
            ExportError::InvalidMessageFormat(format!("Message {} is not valid RFC 822", id))
        })?;

        let subject = parsed.subject().unwrap_or_default().to_string();

        let date = parsed
            .date()
            .and_then(header_date_to_chrono)
            .or_else(|| internal_date.map(|d| d.fixed_offset()))
            .unwrap_or_else(|| DateTime::<Utc>::default().fixed_offset());

        let html_body = parsed
            .body_html(0)
            .map(|body| body.into_owned())
            .unwrap_or_default();

        let attachments = parsed
            .attachments()
            .enumerate()
            .map(|(index, part)| {
                let name = part
                    .attachment_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("attachment-{}", index + 1));
                let content_type = part
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                Attachment {
                    name,
                    content_type,
                    content_id: part.content_id().map(str::to_string),
                    data: part.contents().to_vec(),
                }
            })
            .collect();

        Ok(Self {
            id,
            subject,
            date,
            html_body,
            raw,
            attachments,
        })
    }
}

fn header_date_to_chrono(date: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_secs = (date.tz_hour as i32 * 3600) + (date.tz_minute as i32 * 60);
    let offset = if date.tz_before_gmt {
        FixedOffset::west_opt(offset_secs)?
    } else {
        FixedOffset::east_opt(offset_secs)?
    };

    let naive = NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)?
        .and_hms_opt(date.hour as u32, date.minute as u32, date.second as u32)?;

    offset.from_local_datetime(&naive).single()
}
