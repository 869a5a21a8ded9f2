//! Article extraction and content validation.
//!
//! - [`html`] - Default [`ArticleExtractor`] built on `scraper`
//! - [`charset`] - Payload decoding by declared or sniffed charset
//! - [`hash`] - Content checksum and per-language validation

mod charset;
mod hash;
mod html;

pub use charset::{charset_label, decode_html};
pub use hash::{HashCheck, check_hash, hash_document};
pub use html::HtmlArticleExtractor;

use chrono::{DateTime, Utc};

use crate::archive::RawRecord;
use crate::error::Result;
use crate::types::{ArchiveFile, Document};

/// Fields pulled out of a captured HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    /// Page title
    pub title: String,
    /// Article body text
    pub text: String,
    /// Declared publication time
    pub publish_time: Option<DateTime<Utc>>,
}

/// Turns raw HTML into an [`Article`]
pub trait ArticleExtractor: Send + Sync {
    /// Extract title, text and publication time from a decoded HTML page
    fn extract(&self, html: &str) -> Result<Article>;
}

/// Build the output document for a record found in `archive`.
pub fn extract_document(
    extractor: &dyn ArticleExtractor,
    archive: &ArchiveFile,
    record: &RawRecord,
) -> Result<Document> {
    let html = decode_html(&record.payload, record.charset.as_deref());
    let article = extractor.extract(&html)?;
    Ok(Document {
        id: record.id.clone(),
        cc_file: archive.clone(),
        time: article.publish_time,
        title: article.title,
        text: article.text,
        url: record.target_uri.clone().unwrap_or_default(),
    })
}
