//! Multi-page joining.
//!
//! Backends that return one string per page are flattened here into the
//! single `text` field of a raw result. Page markers are ordinary content
//! lines afterwards; the normaliser recognises them with
//! [`is_page_delimiter`] and leaves them untouched.

use crate::config::PageDelimiter;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--- Page \d+/\d+ ---$").unwrap());

/// True for a line that is exactly a `--- Page i/N ---` marker.
pub fn is_page_delimiter(line: &str) -> bool {
    RE_PAGE_MARKER.is_match(line)
}

/// Join per-page texts with a blank line, prefixing markers per `policy`.
pub fn join_pages<S: AsRef<str>>(pages: &[S], policy: PageDelimiter) -> String {
    let total = pages.len();
    if !policy.applies(total) {
        return pages
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let marker = PageDelimiter::render(i + 1, total);
            let body = page.as_ref();
            if body.is_empty() {
                marker
            } else {
                format!("{marker}\n{body}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
