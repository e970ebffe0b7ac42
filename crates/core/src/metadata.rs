use serde::{Deserialize, Serialize};

use crate::Document;

/// Head metadata of one archived page.
///
/// Every string field is empty when the document does not carry it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMetadata {
    pub title: String,
    pub description: String,
    pub canonical_url: String,
    pub robots: String,
    pub og_title: String,
    pub og_description: String,
    /// Number of `<h1>` elements.
    pub heading_count: usize,
}

impl Document {
    /// `content` of `<meta name="description">`
    pub fn extract_description(&self) -> Option<String> {
        self.get_meta_by("name", "description")
    }

    /// `href` of `<link rel="canonical">`
    pub fn extract_canonical_url(&self) -> Option<String> {
        let links = self.select("link[rel][href]").ok()?;
        links
            .iter()
            .find(|el| el.has_token_ignore_case("rel", "canonical"))
            .and_then(|el| el.attr("href"))
            .map(|href| href.trim().to_string())
    }

    /// `content` of `<meta name="robots">`
    pub fn extract_robots(&self) -> Option<String> {
        self.get_meta_by("name", "robots")
    }

    /// `content` of `<meta property="og:title">`
    pub fn extract_og_title(&self) -> Option<String> {
        self.get_meta_by("property", "og:title")
    }

    /// `content` of `<meta property="og:description">`
    pub fn extract_og_description(&self) -> Option<String> {
        self.get_meta_by("property", "og:description")
    }

    /// Count of `<h1>` elements anywhere in the document.
    pub fn count_headings(&self) -> usize {
        self.select("h1").map(|els| els.len()).unwrap_or(0)
    }

    /// Extract all metadata at once
    pub fn extract_metadata(&self) -> ExtractedMetadata {
        ExtractedMetadata {
            title: self.title().unwrap_or_default(),
            description: self.extract_description().unwrap_or_default(),
            canonical_url: self.extract_canonical_url().unwrap_or_default(),
            robots: self.extract_robots().unwrap_or_default(),
            og_title: self.extract_og_title().unwrap_or_default(),
            og_description: self.extract_og_description().unwrap_or_default(),
            heading_count: self.count_headings(),
        }
    }

    /// `content` of the first `<meta>` whose `attr` equals `value`, ignoring case
    fn get_meta_by(&self, attr: &str, value: &str) -> Option<String> {
        let selector = format!("meta[{}][content]", attr);
        let metas = self.select(&selector).ok()?;
        metas
            .iter()
            .find(|el| el.attr_eq_ignore_case(attr, value))
            .and_then(|el| el.attr("content"))
            .map(|content| content.trim().to_string())
    }
}

/// Parses `html` and extracts its metadata. Never fails.
pub fn extract_metadata(html: &str) -> ExtractedMetadata {
    Document::parse(html).extract_metadata()
}
