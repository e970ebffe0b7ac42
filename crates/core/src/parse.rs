//! HTML parsing and DOM queries.
//!
//! This module provides the [`Document`] and [`Element`] types for parsing
//! archived HTML and querying it with CSS selectors.
//!
//! # Example
//!
//! ```rust
//! use waymark_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <head><title>Title</title></head>
//!         <body><h1>Heading</h1></body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html);
//! assert_eq!(doc.title(), Some("Title".to_string()));
//! assert_eq!(doc.select("h1").unwrap().len(), 1);
//! ```

use scraper::{Html, Selector};

use crate::{Result, WaymarkError};

/// A parsed HTML document.
///
/// Parsing is error-recovering: any input, however broken, yields a
/// document. Missing elements show up as empty selections.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses HTML from a string.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html) }
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`WaymarkError::HtmlParseError`] if the selector is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use waymark_core::parse::Document;
    ///
    /// let doc = Document::parse(r#"<p class="x">First</p><p class="x">Second</p>"#);
    /// assert_eq!(doc.select("p.x").unwrap().len(), 2);
    /// ```
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel =
            Selector::parse(selector).map_err(|e| WaymarkError::HtmlParseError(format!("Invalid selector: {}", e)))?;

        Ok(self.html.select(&sel).map(|el| Element { element: el }).collect())
    }

    /// First element matching `selector`, if any.
    pub fn select_first(&'_ self, selector: &str) -> Option<Element<'_>> {
        self.select(selector).ok()?.into_iter().next()
    }

    /// Text of the first `<title>` element, trimmed.
    pub fn title(&self) -> Option<String> {
        self.select_first("title").map(|el| el.text().trim().to_string())
    }
}

/// A wrapper around scraper's ElementRef.
///
/// # Example
///
/// ```rust
/// use waymark_core::parse::Document;
///
/// let doc = Document::parse(r#"<a href="https://example.com">Link text</a>"#);
/// let link = &doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("https://example.com"));
/// ```
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: scraper::ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Concatenation of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the value of an attribute, `None` if absent.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Whether attribute `name` equals `value`, ignoring ASCII case.
    pub fn attr_eq_ignore_case(&self, name: &str, value: &str) -> bool {
        self.attr(name).is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
    }

    /// Whether the whitespace-separated token list in `name` contains `token`, ignoring ASCII case.
    pub fn has_token_ignore_case(&self, name: &str, token: &str) -> bool {
        self.attr(name)
            .is_some_and(|v| v.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case(token)))
    }
}
