//! HTML article extraction using `scraper`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use super::{Article, ArticleExtractor};
use crate::error::Result;

/// Meta names and properties that carry a publication date, in priority order
const DATE_META_NAMES: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "pubdate",
    "publishdate",
    "datePublished",
    "date",
    "DC.date",
];

/// Containers holding the main article body, most specific first
const BODY_CONTAINERS: &[&str] = &["article", "[itemprop='articleBody']", "main", "body"];

/// Default [`ArticleExtractor`]: title from OpenGraph/`<title>`/`<h1>`, text from
/// the paragraphs of the main article container, date from `<time>` or meta tags.
#[derive(Debug, Clone, Default)]
pub struct HtmlArticleExtractor;

impl HtmlArticleExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    fn extract_title(&self, document: &Html) -> String {
        if let Some(title) = meta_content(document, "og:title") {
            return title;
        }
        for css in ["title", "h1"] {
            if let Some(title) = first_text(document, css) {
                return title;
            }
        }
        String::new()
    }

    fn extract_text(&self, document: &Html) -> String {
        let Ok(paragraph) = Selector::parse("p") else {
            return String::new();
        };

        for css in BODY_CONTAINERS {
            let Ok(selector) = Selector::parse(css) else {
                continue;
            };
            let Some(container) = document.select(&selector).next() else {
                continue;
            };
            let paragraphs: Vec<String> = container
                .select(&paragraph)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect();
            if !paragraphs.is_empty() {
                return paragraphs.join("\n\n");
            }
        }

        // No paragraphs anywhere: fall back to the whole body
        Selector::parse("body")
            .ok()
            .and_then(|selector| document.select(&selector).next().map(element_text))
            .unwrap_or_default()
    }

    fn extract_date(&self, document: &Html) -> Option<DateTime<Utc>> {
        if let Ok(selector) = Selector::parse("time[datetime]") {
            if let Some(elem) = document.select(&selector).next() {
                if let Some(dt) = elem.value().attr("datetime").and_then(parse_date) {
                    return Some(dt);
                }
            }
        }

        DATE_META_NAMES
            .iter()
            .filter_map(|name| meta_content(document, name))
            .find_map(|value| parse_date(&value))
    }
}

impl ArticleExtractor for HtmlArticleExtractor {
    fn extract(&self, html: &str) -> Result<Article> {
        let document = Html::parse_document(html);

        Ok(Article {
            title: self.extract_title(&document),
            text: self.extract_text(&document),
            publish_time: self.extract_date(&document),
        })
    }
}

/// Text content of an element with whitespace runs collapsed.
///
/// Text nodes are concatenated without separators so CJK text is not split by
/// spurious spaces.
fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Content of `<meta name=...>` or `<meta property=...>`
fn meta_content(document: &Html, name: &str) -> Option<String> {
    for attr in ["name", "property", "itemprop"] {
        let Ok(selector) = Selector::parse(&format!("meta[{attr}='{name}']")) else {
            continue;
        };
        let content = document
            .select(&selector)
            .filter_map(|elem| elem.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty());
        if let Some(content) = content {
            return Some(content.to_string());
        }
    }
    None
}

/// Parse the date formats news sites commonly declare
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
