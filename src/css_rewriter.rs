//! CSS Rewriter
//!
//! Finds every `url(...)` in a stylesheet, downloads what it points to
//! through the asset store and rewrites each occurrence to the local file.
//! Occurrences that cannot be resolved are left exactly as they were.

use crate::asset_store::{AssetStore, Resolved};
use crate::fetcher::Fetch;
use crate::url_resolver::{extract_extension, is_font_url, is_inline_uri, to_absolute, AbsoluteUrl, AssetFolder};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"')]*?))\s*\)"#).expect("css url pattern is valid")
});

/// Where the stylesheet text ends up inside the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssLocation {
    /// A linked stylesheet stored under `css/`
    Stylesheet,
    /// An inline `<style>` block of `index.html`, at the archive root
    Document,
}

impl CssLocation {
    /// Path to `local_path` as seen from a stylesheet at this location
    pub fn relative_path(self, local_path: &str) -> String {
        match self {
            CssLocation::Stylesheet => match local_path.strip_prefix("css/") {
                Some(name) => name.to_string(),
                None => format!("../{}", local_path),
            },
            CssLocation::Document => local_path.to_string(),
        }
    }
}

/// One `url(...)` occurrence in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssUrl {
    /// Byte range of the whole `url(...)` token
    pub span: Range<usize>,
    /// The reference inside the parentheses, trimmed and unquoted
    pub raw: String,
}

/// Every `url(...)` occurrence in document order
pub fn find_urls(css: &str) -> Vec<CssUrl> {
    CSS_URL
        .captures_iter(css)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
            Some(CssUrl {
                span: whole.range(),
                raw: inner.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Rewrite `css`, resolving its references against `css_url`.
pub async fn rewrite<F: Fetch>(store: &AssetStore<'_, F>, css: &str, css_url: &str, location: CssLocation) -> String {
    if css.is_empty() {
        return String::new();
    }

    let mut targets: Vec<(CssUrl, AbsoluteUrl)> = Vec::new();
    for occurrence in find_urls(css) {
        // `url(#id)` points into the document itself (SVG paint, filter, mask).
        if occurrence.raw.is_empty() || occurrence.raw.starts_with('#') || is_inline_uri(&occurrence.raw) {
            continue;
        }
        if let Some(abs) = to_absolute(&occurrence.raw, css_url) {
            targets.push((occurrence, abs));
        }
    }
    if targets.is_empty() {
        return css.to_string();
    }

    // Download each distinct reference once, all at the same time.
    let mut unique: Vec<&AbsoluteUrl> = Vec::new();
    for (_, abs) in &targets {
        if !unique.contains(&abs) {
            unique.push(abs);
        }
    }
    let downloads = unique.iter().map(|abs| async move {
        let fallback = if is_font_url(abs.as_str()) { "woff2" } else { "png" };
        let ext = extract_extension(abs.as_str(), fallback);
        let folder = AssetFolder::from_extension(&ext);
        let resolved = store.ensure_downloaded(abs, folder, &ext).await;
        (abs.as_str().to_string(), resolved)
    });
    let resolved: HashMap<String, Resolved> = join_all(downloads).await.into_iter().collect();

    // Splice replacements over the original spans; everything else is
    // copied through untouched.
    let mut out = String::with_capacity(css.len());
    let mut cursor = 0;
    for (occurrence, abs) in &targets {
        let Some(local_path) = resolved.get(abs.as_str()).and_then(Resolved::local_path) else {
            continue;
        };
        out.push_str(&css[cursor..occurrence.span.start]);
        out.push_str(&format!("url(\"{}\")", location.relative_path(local_path)));
        cursor = occurrence.span.end;
    }
    out.push_str(&css[cursor..]);
    out
}
