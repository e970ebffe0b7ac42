//! Removal of archive-injected chrome.
//!
//! `id_` captures are usually clean, but the archive still leaks its
//! playback toolbar, analytics scripts and banner markup into some
//! documents (old captures, redirects that land on a rewritten page). This
//! pass strips everything identifiable by an archive marker and leaves the
//! page's own markup untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Substrings that identify an archive-injected script or stylesheet.
const ARCHIVE_MARKERS: &[&str] = &[
    "/_static/",
    "archive.org/",
    "__wm.",
    "wombat",
    "archive_analytics",
    "_wm.",
    "playback.bundle",
];

static TOOLBAR_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--\s*BEGIN WAYBACK TOOLBAR INSERT\s*-->.*?<!--\s*END WAYBACK TOOLBAR INSERT\s*-->")
        .expect("valid toolbar pattern")
});

static ARCHIVE_COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--\s*(FILE ARCHIVED ON|playback timings|End Wayback Rewrite JS Include).*?-->")
        .expect("valid comment pattern")
});

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script pattern"));

/// Returns `html` with archive toolbar, scripts, stylesheets and banners removed.
///
/// Falls back to the regex-cleaned input if the streaming rewriter rejects
/// the document.
pub fn strip_archive_chrome(html: &str) -> String {
    let without_toolbar = TOOLBAR_BLOCK.replace_all(html, "");
    let without_comments = ARCHIVE_COMMENTS.replace_all(&without_toolbar, "");
    let without_scripts = SCRIPT_BLOCK.replace_all(&without_comments, |caps: &Captures| {
        let block = &caps[0];
        if has_archive_marker(block) { String::new() } else { block.to_string() }
    });

    remove_archive_elements(&without_scripts)
}

fn has_archive_marker(text: &str) -> bool {
    ARCHIVE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Drops toolbar containers and marker-bearing `<script src>`/`<link href>` elements.
fn remove_archive_elements(html: &str) -> String {
    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("script[src]", |el| {
                    if el.get_attribute("src").is_some_and(|src| has_archive_marker(&src)) {
                        el.remove();
                    }
                    Ok(())
                }),
                lol_html::element!("link[href]", |el| {
                    if el.get_attribute("href").is_some_and(|href| has_archive_marker(&href)) {
                        el.remove();
                    }
                    Ok(())
                }),
                lol_html::element!("[id^='wm-ipp']", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("#wm-toolbar", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("#donato", |el| {
                    el.remove();
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    output
}
