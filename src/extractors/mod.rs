//! Extraction strategies over a parsed page
//!
//! Each module provides one non-semantic strategy:
//! - schema: CSS/XPath schema matching into records
//! - pattern: labeled regex matches over raw text

mod pattern_extractor;
mod schema_extractor;

pub use pattern_extractor::*;
pub use schema_extractor::*;

use scraper::Html;
use serde_json::Value;

use crate::error::ExtractError;

/// Elements whose text is never visible content
const INVISIBLE: [&str; 4] = ["script", "style", "noscript", "template"];

/// A parsed document together with its raw source
pub struct Page {
    source: String,
    document: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            source: html.to_string(),
            document: Html::parse_document(html),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// Visible text: text nodes outside script/style, joined by single spaces
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for node in self.document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element())
                .map(|el| INVISIBLE.contains(&el.name()))
                .unwrap_or(false);
            let trimmed = text.trim();
            if !hidden && !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
        parts.join(" ")
    }
}

/// Common capability of every strategy the coordinator can run
///
/// `Ok` with an empty vector means "ran, found nothing"; `Err` means the
/// strategy itself failed.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, page: &Page) -> Result<Vec<Value>, ExtractError>;
}
