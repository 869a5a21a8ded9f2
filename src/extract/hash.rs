//! Document checksum and validation against manifest expectations.

use crate::config::ValidationMode;
use crate::error::{Error, Result};
use crate::types::{Document, Language};

/// Outcome of comparing a document against one language's expected checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    /// The manifest gave no checksum; accepted without validation
    Unchecked,
    /// Checksum matched
    Matched,
    /// Checksum differed but lenient mode keeps the document
    Mismatched {
        /// Checksum from the manifest
        expected: String,
        /// Checksum of the extracted content
        got: String,
    },
}

/// MD5 of the title followed by the text, as lowercase hex.
///
/// Only extracted content takes part, so the value is the same for every
/// language and every attempt that reads the same record.
pub fn hash_document(doc: &Document) -> String {
    let mut context = md5::Context::new();
    context.consume(doc.title.as_bytes());
    context.consume(doc.text.as_bytes());
    format!("{:x}", context.compute())
}

/// Compare `got` against the checksum `lang` expects for `doc`.
///
/// Emits the hash-matched / hash-mismatch log lines. In strict mode a
/// mismatch is an error that fails the archive attempt.
pub fn check_hash(
    doc: &Document,
    lang: &Language,
    expected: Option<&str>,
    got: &str,
    mode: ValidationMode,
) -> Result<HashCheck> {
    let Some(expected) = expected else {
        return Ok(HashCheck::Unchecked);
    };

    if expected == got {
        tracing::info!("[hash-matched] record-id: {}, {}", doc.id, lang);
        return Ok(HashCheck::Matched);
    }

    tracing::warn!(
        "[hash-mismatch] record-id: {}, {}, expecting {} but got {}",
        doc.id,
        lang,
        expected,
        got
    );

    if mode.is_strict() {
        return Err(Error::HashMismatch {
            id: doc.id.clone(),
            language: lang.clone(),
            expected: expected.to_string(),
            got: got.to_string(),
        });
    }

    Ok(HashCheck::Mismatched {
        expected: expected.to_string(),
        got: got.to_string(),
    })
}
