//! Output file naming
//!
//! Every file written for a message is prefixed with `<YYYY-MM-DD>_<subject>`.
//! Names are reproduced exactly; no escaping, truncation or collision
//! handling happens beyond stripping the characters below from the subject.

use chrono::{DateTime, TimeZone};

/// Characters removed from subjects before they become part of a file name
pub const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Media type of saved raw messages
pub const RFC822_MIME: &str = "message/rfc822";

/// Media type of exported PDFs
pub const PDF_MIME: &str = "application/pdf";

/// Strip filesystem-illegal characters from a subject
pub fn sanitize_subject(subject: &str) -> String {
    subject
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect()
}

/// Calendar day of the timestamp in its own offset, as `YYYY-MM-DD`
pub fn format_message_date<Tz>(date: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    date.format("%Y-%m-%d").to_string()
}

/// Shared `<date>_<sanitizedSubject>` prefix for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStem {
    pub date: String,
    pub subject: String,
}

impl FileStem {
    pub fn new<Tz>(subject: &str, date: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: format_message_date(date),
            subject: sanitize_subject(subject),
        }
    }

    pub fn pdf_name(&self) -> String {
        format!("{}_{}.pdf", self.date, self.subject)
    }

    pub fn eml_name(&self) -> String {
        format!("{}_{}.eml", self.date, self.subject)
    }

    pub fn attachment_name(&self, original_name: &str) -> String {
        format!("{}_{}_{}", self.date, self.subject, original_name)
    }
}
