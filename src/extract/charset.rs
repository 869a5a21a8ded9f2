//! Character set detection and decoding of captured pages.
//!
//! A byte order mark wins, then the charset of the HTTP `Content-Type` header,
//! then a `<meta charset>` or `http-equiv` declaration near the top of the
//! page. Anything else is read as UTF-8. Undecodable bytes become U+FFFD.

use encoding_rs::{Encoding, UTF_8};

/// Bytes of the page searched for a `<meta>` charset declaration
const META_SNIFF_LIMIT: usize = 1024;

/// Decode an HTML payload to text
pub fn decode_html(payload: &[u8], header_charset: Option<&str>) -> String {
    let encoding = header_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta(payload))
        .unwrap_or(UTF_8);

    // `decode` gives a BOM precedence over the chosen encoding
    let (text, used, had_errors) = encoding.decode(payload);
    if had_errors {
        tracing::debug!(encoding = used.name(), "Page contained undecodable bytes");
    }
    text.into_owned()
}

/// Value of a `charset=` parameter, lowercased and unquoted.
///
/// Works on both header values (`text/html; charset="GBK"`) and markup
/// (`<meta charset=gbk>`).
pub fn charset_label(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("charset")? + "charset".len();
    let rest = lower[start..].trim_start().strip_prefix('=')?;
    let label: String = rest
        .trim_start_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn sniff_meta(payload: &[u8]) -> Option<&'static Encoding> {
    let head = &payload[..payload.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head);
    let lower = head.to_ascii_lowercase();

    let mut rest = lower.as_str();
    while let Some(pos) = rest.find("<meta") {
        let tag = &rest[pos..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        if let Some(encoding) = charset_label(tag).and_then(|l| Encoding::for_label(l.as_bytes())) {
            // Markup claiming UTF-16 was readable as ASCII, so it is not UTF-16
            return Some(encoding.output_encoding());
        }
        rest = &rest[pos + "<meta".len()..];
    }
    None
}
