//! URL Resolver
//!
//! Turns raw references found in HTML attributes and CSS `url()` values
//! into absolute URLs, and classifies them by extension.
//! - `data:` and `blob:` URIs pass through untouched
//! - protocol-relative references (`//host/path`) become `https:`
//! - everything else is joined against the page (or stylesheet) URL

use crate::error::CloneError;
use std::fmt;
use url::Url;

/// A resolved reference: an `http(s)` URL, or an inline `data:`/`blob:` URI
/// kept verbatim. Never relative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsoluteUrl(String);

impl AbsoluteUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inline URIs are never fetched or archived as separate files.
    pub fn is_inline(&self) -> bool {
        is_inline_uri(&self.0)
    }
}

impl fmt::Display for AbsoluteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AbsoluteUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn is_inline_uri(value: &str) -> bool {
    value.starts_with("data:") || value.starts_with("blob:")
}

/// Resolve `raw` against `base`. Returns `None` for blank or unparseable
/// input and for schemes other than http(s).
pub fn to_absolute(raw: &str, base: &str) -> Option<AbsoluteUrl> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if is_inline_uri(value) {
        return Some(AbsoluteUrl(value.to_string()));
    }

    let joined = if value.starts_with("//") {
        Url::parse(&format!("https:{}", value))
    } else {
        match Url::parse(base) {
            Ok(base_url) => base_url.join(value),
            Err(_) => Url::parse(value),
        }
    };
    let parsed = joined.ok()?;

    match parsed.scheme() {
        "http" | "https" => Some(AbsoluteUrl(parsed.to_string())),
        _ => None,
    }
}

/// Lowercased extension of the last path segment, ignoring query and
/// fragment. Falls back when there is none or it is longer than 6 chars.
pub fn extract_extension(url: &str, fallback: &str) -> String {
    let clean = url.split('#').next().unwrap_or("");
    let clean = clean.split('?').next().unwrap_or("");
    let segment = clean.rsplit('/').next().unwrap_or("");

    match segment.rfind('.') {
        Some(dot) => {
            let ext = segment[dot + 1..].to_lowercase();
            if ext.is_empty() || ext.len() > 6 {
                fallback.to_string()
            } else {
                ext
            }
        }
        None => fallback.to_string(),
    }
}

/// Archive folder an asset is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFolder {
    Css,
    Js,
    Images,
    Favicon,
    Fonts,
    Assets,
}

impl AssetFolder {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "css" => AssetFolder::Css,
            "js" | "mjs" => AssetFolder::Js,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" => AssetFolder::Images,
            "ico" => AssetFolder::Favicon,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => AssetFolder::Fonts,
            _ => AssetFolder::Assets,
        }
    }

    /// Folder for an `<img>` source: icons go to `favicon/`, the rest to `images/`.
    pub fn for_image(ext: &str) -> Self {
        if ext == "ico" {
            AssetFolder::Favicon
        } else {
            AssetFolder::Images
        }
    }

    pub fn directory(&self) -> &'static str {
        match self {
            AssetFolder::Css => "css",
            AssetFolder::Js => "js",
            AssetFolder::Images => "images",
            AssetFolder::Favicon => "favicon",
            AssetFolder::Fonts => "fonts",
            AssetFolder::Assets => "assets",
        }
    }
}

impl fmt::Display for AssetFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory())
    }
}

pub fn classify_folder(ext: &str) -> AssetFolder {
    AssetFolder::from_extension(ext)
}

pub fn is_font_url(url: &str) -> bool {
    matches!(
        extract_extension(url, "").as_str(),
        "woff" | "woff2" | "ttf" | "otf" | "eot"
    )
}

/// Validate a user-supplied site address, adding `https://` when no scheme
/// was typed.
pub fn normalize_site_url(input: &str) -> Result<Url, CloneError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(CloneError::MissingField("websiteUrl"));
    }

    let candidate = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{}", value)
    };

    let url = Url::parse(&candidate).map_err(|_| CloneError::InvalidUrl(value.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(CloneError::InvalidUrl(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com/blog/post.html";

    #[test]
    fn resolves_relative_references() {
        let abs = to_absolute("../img/a.png", BASE).unwrap();
        assert_eq!(abs.as_str(), "https://example.com/img/a.png");

        let abs = to_absolute("/static/app.js", BASE).unwrap();
        assert_eq!(abs.as_str(), "https://example.com/static/app.js");

        let abs = to_absolute("  style.css  ", BASE).unwrap();
        assert_eq!(abs.as_str(), "https://example.com/blog/style.css");
    }

    #[test]
    fn protocol_relative_gets_https() {
        let abs = to_absolute("//cdn.example.net/lib.js", "http://example.com/").unwrap();
        assert_eq!(abs.as_str(), "https://cdn.example.net/lib.js");
    }

    #[test]
    fn inline_uris_pass_through_verbatim() {
        let data = "data:image/png;base64,iVBORw0KGgo=";
        let abs = to_absolute(data, BASE).unwrap();
        assert_eq!(abs.as_str(), data);
        assert!(abs.is_inline());

        let blob = "blob:https://example.com/1234";
        assert_eq!(to_absolute(blob, BASE).unwrap().as_str(), blob);
    }

    #[test]
    fn blank_and_unparseable_resolve_to_none() {
        assert!(to_absolute("", BASE).is_none());
        assert!(to_absolute("   ", BASE).is_none());
        assert!(to_absolute("http://[::1", BASE).is_none());
        assert!(to_absolute("relative.png", "not a url").is_none());
        assert!(to_absolute("mailto:someone@example.com", BASE).is_none());
    }

    #[test]
    fn absolute_results_are_stable_under_rebasing() {
        let raws = ["a/b.png?x=1", "//cdn.example.net/x.css", "/root.js", "https://other.org/p#frag"];
        for raw in raws {
            let first = to_absolute(raw, BASE).unwrap();
            let again = to_absolute(first.as_str(), "https://unrelated.test/dir/").unwrap();
            assert_eq!(first, again, "re-resolving {raw} changed it");
        }
    }

    #[test]
    fn extension_ignores_query_fragment_and_case() {
        assert_eq!(extract_extension("https://x.com/a/b.file.PNG?x=1#y", "bin"), "png");
        assert_eq!(extract_extension("https://x.com/a/b", "bin"), "bin");
        assert_eq!(extract_extension("https://x.com/a/b.", "bin"), "bin");
        assert_eq!(extract_extension("https://x.com/a/b.longextension", "css"), "css");
        assert_eq!(extract_extension("https://x.com/font.woff2?v=3", ""), "woff2");
    }

    #[test]
    fn folders_follow_the_extension_table() {
        assert_eq!(classify_folder("woff2"), AssetFolder::Fonts);
        assert_eq!(classify_folder("xyz"), AssetFolder::Assets);
        assert_eq!(classify_folder("mjs"), AssetFolder::Js);
        assert_eq!(classify_folder("SVG"), AssetFolder::Images);
        assert_eq!(classify_folder("ico"), AssetFolder::Favicon);
        assert_eq!(classify_folder("css").directory(), "css");
        assert_eq!(AssetFolder::for_image("ico"), AssetFolder::Favicon);
        assert_eq!(AssetFolder::for_image("jpg"), AssetFolder::Images);
    }

    #[test]
    fn detects_font_urls() {
        assert!(is_font_url("https://x.com/f/inter.woff2?v=1"));
        assert!(is_font_url("https://x.com/f/icons.EOT"));
        assert!(!is_font_url("https://x.com/f/logo.png"));
        assert!(!is_font_url("https://x.com/f/font"));
    }

    #[test]
    fn normalizes_site_input() {
        assert_eq!(normalize_site_url(" example.com ").unwrap().as_str(), "https://example.com/");
        assert_eq!(normalize_site_url("http://example.com/a").unwrap().as_str(), "http://example.com/a");
        assert!(matches!(normalize_site_url("  "), Err(CloneError::MissingField("websiteUrl"))));
        assert!(matches!(normalize_site_url("https://"), Err(CloneError::InvalidUrl(_))));
    }
}
