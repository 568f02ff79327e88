//! Inlining of images referenced from message HTML
//!
//! HTML is scanned with regular expressions, not parsed. Only double-quoted
//! `src` attributes inside a single `<img ...>` tag are seen; single-quoted
//! or unquoted attributes, and markup irregular enough to confuse the
//! pattern, are left untouched.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::error::{ExportError, Result};
use crate::models::Attachment;

static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]*src="([^"]+)"[^>]*>"#).expect("valid img regex"));

static CID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cid:([\w@.-]+)").expect("valid cid regex"));

/// Body and declared content type of a fetched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP GET capability used to retrieve remote images
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResource>;
}

/// [`ImageFetcher`] backed by reqwest, with the client's default timeouts
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ExportError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(FetchedResource { content_type, body })
    }
}

/// Build a `data:` URI for the given payload
pub fn data_uri(content_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(data))
}

/// Distinct `src` values of `<img>` tags, in first-occurrence order
pub fn image_sources(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMG_SRC_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|src| seen.insert(src.clone()))
        .collect()
}

fn is_remote(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Outcome of [`embed_images_in_html`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedResult {
    pub html: String,
    pub embedded: usize,
    pub failed: usize,
}

/// Replace remote `<img>` sources with data URIs.
///
/// Every distinct http(s) source is fetched once and, when the response is an
/// `image/*`, all textual occurrences of the URL are rewritten. An occurrence
/// that continues into a longer URL (`a.png` inside `a.png?v=2`) is not an
/// occurrence of that URL and is left alone. Failures are
/// logged and leave the URL in place; they never fail the caller.
pub async fn embed_images_in_html(html: &str, fetcher: &dyn ImageFetcher) -> EmbedResult {
    let mut result = EmbedResult {
        html: html.to_string(),
        ..Default::default()
    };

    for url in image_sources(html) {
        if !is_remote(&url) {
            debug!("Skipping non-remote image source {:?}", truncate(&url, 64));
            continue;
        }

        match fetch_as_data_uri(&url, fetcher).await {
            Ok(uri) => {
                result.html = replace_url(&result.html, &url, &uri);
                result.embedded += 1;
                info!("Image successfully embedded: \"{}\"", url);
            }
            Err(e) => {
                result.failed += 1;
                error!("Error embedding image: \"{}\": {}", url, e);
            }
        }
    }

    result
}

async fn fetch_as_data_uri(url: &str, fetcher: &dyn ImageFetcher) -> Result<String> {
    // Attribute values carry HTML-escaped ampersands
    let resource = fetcher.fetch(&url.replace("&amp;", "&")).await?;
    let content_type = resource
        .content_type
        .ok_or_else(|| ExportError::ImageError("response has no Content-Type".to_string()))?;

    if !content_type.starts_with("image/") {
        return Err(ExportError::ImageError(format!(
            "unexpected Content-Type {}",
            content_type
        )));
    }

    Ok(data_uri(&content_type, &resource.body))
}

/// Characters that may continue a URL past a given occurrence
fn continues_url(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~:/?#[]@!$&*+,;=%".contains(c)
}

/// Replace every occurrence of `url` in `html` that is not the prefix of a longer URL
fn replace_url(html: &str, url: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for (start, _) in html.match_indices(url) {
        let end = start + url.len();
        if html[end..].chars().next().is_some_and(continues_url) {
            continue;
        }
        out.push_str(&html[last..start]);
        out.push_str(replacement);
        last = end;
    }

    out.push_str(&html[last..]);
    out
}

/// Replace `cid:` references with data URIs built from the message's attachments.
///
/// An attachment matches when its Content-ID equals the reference or its name
/// contains it; the first match wins. Unmatched references stay as they are.
pub fn embed_cid_images(html: &str, attachments: &[Attachment]) -> EmbedResult {
    let mut result = EmbedResult {
        html: html.to_string(),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    let content_ids: Vec<String> = CID_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|cid| seen.insert(cid.clone()))
        .collect();

    for content_id in content_ids {
        let matching = attachments.iter().find(|attachment| {
            attachment.content_id.as_deref() == Some(content_id.as_str())
                || attachment.name.contains(&content_id)
        });

        match matching {
            Some(attachment) => {
                let uri = data_uri(&attachment.content_type, &attachment.data);
                result.html = result.html.replace(&format!("cid:{}", content_id), &uri);
                result.embedded += 1;
                debug!("Inlined cid:{} from {}", content_id, attachment.name);
            }
            None => {
                result.failed += 1;
                debug!("No attachment matches cid:{}", content_id);
            }
        }
    }

    result
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}
