//! Clone Orchestrator
//!
//! Composes renderer, asset store and CSS rewriter into the three boundary
//! operations:
//! - `scrape`: body HTML + structure + concatenated CSS for live preview
//! - `clone_static`: fully rewritten, self-contained ZIP of the page
//! - `export_with_edits`: ZIP built from editor-supplied HTML and theme CSS
//!
//! Every run owns its own asset store and archive; nothing is shared
//! between calls.

use crate::archive::{ArchiveBuilder, INDEX_FILE};
use crate::asset_store::{AssetStore, Resolved};
use crate::config::CloneConfig;
use crate::css_rewriter::{self, CssLocation};
use crate::dom;
use crate::error::{CloneError, PipelineError};
use crate::fetcher::Fetch;
use crate::renderer::Render;
use crate::structure::{self, section_id, StructureNode, REGION_TAGS};
use crate::url_resolver::{extract_extension, normalize_site_url, to_absolute, AbsoluteUrl, AssetFolder};
use futures::future::join_all;
use markup5ever_rcdom::Handle;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

static STYLESHEET_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel~='stylesheet'][href]").expect("valid selector"));

/// Preview extraction result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub body_html: String,
    pub structure: Vec<StructureNode>,
    pub css: String,
}

/// Rendered page after the synchronous DOM pass of a static clone
#[derive(Debug, Default)]
struct PreparedPage {
    html: String,
    stylesheets: Vec<AbsoluteUrl>,
    scripts: Vec<AbsoluteUrl>,
    images: Vec<(AbsoluteUrl, AssetFolder, String)>,
    /// Text of every `<style>` element in document order
    inline_styles: Vec<String>,
}

pub struct Cloner<R, F> {
    renderer: R,
    fetcher: F,
    config: CloneConfig,
}

impl<R: Render, F: Fetch> Cloner<R, F> {
    pub fn new(renderer: R, fetcher: F, config: CloneConfig) -> Self {
        Self {
            renderer,
            fetcher,
            config,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn new_store(&self) -> AssetStore<'_, F> {
        AssetStore::new(&self.fetcher, self.config.asset_timeout())
    }

    /// Render `website_url` and return what the live preview needs.
    pub async fn scrape(&self, website_url: &str) -> Result<ScrapeResult, CloneError> {
        let site = normalize_site_url(website_url)?;
        let result = self.run_scrape(site.as_str()).await;
        result.map_err(|e| {
            warn!(url = %site, error = %e, "scrape failed");
            CloneError::ScrapeFailed(e)
        })
    }

    /// Render `website_url` and package it with every asset it references.
    pub async fn clone_static(&self, website_url: &str) -> Result<Vec<u8>, CloneError> {
        let site = normalize_site_url(website_url)?;
        let result = self.run_clone(site.as_str()).await;
        result.map_err(|e| {
            warn!(url = %site, error = %e, "static clone failed");
            CloneError::CloneFailed(e)
        })
    }

    /// Package editor output. Only `<img>` sources are downloaded; the
    /// edited HTML is expected to carry no stylesheet or script links.
    pub async fn export_with_edits(
        &self,
        website_url: &str,
        edited_html: &str,
        theme_css: Option<&str>,
    ) -> Result<Vec<u8>, CloneError> {
        let site = normalize_site_url(website_url)?;
        if edited_html.trim().is_empty() {
            return Err(CloneError::MissingField("editedHtml"));
        }

        let result = self.run_export(site.as_str(), edited_html, theme_css.unwrap_or("")).await;
        result.map_err(|e| {
            warn!(url = %site, error = %e, "export failed");
            CloneError::ExportFailed(e)
        })
    }

    async fn run_scrape(&self, site: &str) -> Result<ScrapeResult, PipelineError> {
        let html = self.renderer.render(site).await?;
        let structure = structure::extract(&html);
        let body_html = tag_sections(&html)?;

        let links = stylesheet_links(&html, site);
        let timeout = self.config.asset_timeout();
        let sheets = join_all(links.iter().map(|url| async move {
            match self.fetcher.fetch(url.as_str(), timeout).await {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => {
                    warn!(url = %url, "stylesheet unavailable");
                    String::new()
                }
            }
        }))
        .await;

        info!(url = %site, sections = structure.len(), stylesheets = sheets.len(), "scrape complete");
        Ok(ScrapeResult {
            body_html,
            structure,
            css: sheets.join("\n\n"),
        })
    }

    async fn run_clone(&self, site: &str) -> Result<Vec<u8>, PipelineError> {
        let rendered = self.renderer.render(site).await?;
        let page = prepare_page(&rendered, site)?;
        let owned_store = self.new_store();
        let store = &owned_store;

        // Fan out every download, then wait for all of them.
        let stylesheet_jobs = join_all(page.stylesheets.iter().map(|url| rewrite_stylesheet(store, url)));
        let script_jobs = join_all(page.scripts.iter().map(|url| async move {
            let ext = extract_extension(url.as_str(), "js");
            store.ensure_downloaded(url, AssetFolder::Js, &ext).await
        }));
        let image_jobs = join_all(
            page.images
                .iter()
                .map(|(url, folder, ext)| store.ensure_downloaded(url, *folder, ext)),
        );
        let style_jobs = join_all(page.inline_styles.iter().map(|css| async move {
            if css.trim().is_empty() {
                return css.clone();
            }
            css_rewriter::rewrite(store, css, site, CssLocation::Document).await
        }));
        let (_, _, _, inline_styles) = futures::join!(stylesheet_jobs, script_jobs, image_jobs, style_jobs);

        let html = finalize_page(&page.html, &inline_styles, store.mappings())?;

        let mut archive = ArchiveBuilder::new();
        archive.add(INDEX_FILE, html)?;
        let assets = owned_store.write_into(&mut archive)?;
        let bytes = archive.finish()?;

        info!(url = %site, assets, size = bytes.len(), "static clone assembled");
        Ok(bytes)
    }

    async fn run_export(&self, site: &str, edited_html: &str, theme_css: &str) -> Result<Vec<u8>, PipelineError> {
        let images = collect_fragment_images(edited_html, site);
        let owned_store = self.new_store();
        let store = &owned_store;

        let resolved: Vec<Option<String>> = join_all(images.iter().map(|image| async move {
            let (url, folder, ext) = image.as_ref()?;
            store.ensure_downloaded(url, *folder, ext).await.local_path().map(str::to_string)
        }))
        .await;

        let body = apply_fragment_images(edited_html, &resolved)?;
        let document = wrap_document(&body, theme_css);

        let mut archive = ArchiveBuilder::new();
        archive.add(INDEX_FILE, document)?;
        let assets = owned_store.write_into(&mut archive)?;
        let bytes = archive.finish()?;

        info!(url = %site, assets, size = bytes.len(), "edited export assembled");
        Ok(bytes)
    }
}

/// Download a linked stylesheet, then rewrite its `url()` references and
/// store the rewritten text under the same path.
async fn rewrite_stylesheet<F: Fetch>(store: &AssetStore<'_, F>, url: &AbsoluteUrl) {
    if !matches!(store.ensure_stylesheet(url).await, Resolved::Local(_)) {
        return;
    }
    let Some(raw) = store.contents(url) else {
        return;
    };
    let css = String::from_utf8_lossy(&raw).into_owned();
    let rewritten = css_rewriter::rewrite(store, &css, url.as_str(), CssLocation::Stylesheet).await;
    store.update_contents(url, rewritten.into_bytes());
}

fn is_stylesheet_link(node: &Handle) -> bool {
    dom::is_tag(node, "link")
        && dom::get_attr(node, "rel")
            .map_or(false, |rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
}

/// Absolute URLs of `<link rel=stylesheet>` elements, in document order.
fn stylesheet_links(html: &str, site: &str) -> Vec<AbsoluteUrl> {
    let document = Html::parse_document(html);
    document
        .select(&STYLESHEET_LINKS)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| to_absolute(href, site))
        .filter(|url| !url.is_inline())
        .collect()
}

/// Mark every layout region with `data-section-id` and return the body's
/// inner HTML.
fn tag_sections(html: &str) -> Result<String, PipelineError> {
    let parsed = dom::parse(html);
    let mut index = 0;
    dom::walk(&parsed.document, &mut |node| {
        if REGION_TAGS.iter().any(|tag| dom::is_tag(node, tag)) {
            dom::set_attr(node, "data-section-id", &section_id(index));
            index += 1;
        }
    });

    match dom::first_by_tag(&parsed.document, "body") {
        Some(body) => dom::serialize_children(&body),
        None => Ok(String::new()),
    }
}

/// Strip `<base>`, absolutize stylesheet/script/image references in place
/// and collect everything that needs downloading.
fn prepare_page(html: &str, site: &str) -> Result<PreparedPage, PipelineError> {
    let parsed = dom::parse(html);
    dom::remove_elements(&parsed.document, "base");

    let mut page = PreparedPage::default();
    dom::walk(&parsed.document, &mut |node| {
        if is_stylesheet_link(node) {
            let href = dom::get_attr(node, "href").unwrap_or_default();
            if let Some(url) = to_absolute(&href, site).filter(|u| !u.is_inline()) {
                dom::set_attr(node, "href", url.as_str());
                if !page.stylesheets.contains(&url) {
                    page.stylesheets.push(url);
                }
            }
        } else if dom::is_tag(node, "script") {
            let Some(src) = dom::get_attr(node, "src") else {
                return;
            };
            if let Some(url) = to_absolute(&src, site).filter(|u| !u.is_inline()) {
                dom::set_attr(node, "src", url.as_str());
                page.scripts.push(url);
            }
        } else if dom::is_tag(node, "img") {
            let src = dom::first_attr(node, &["src", "data-src", "data-original"]).unwrap_or_default();
            // Only the single chosen resolution is materialized.
            dom::remove_attr(node, "srcset");
            dom::remove_attr(node, "sizes");

            if let Some(url) = to_absolute(&src, site).filter(|u| !u.is_inline()) {
                dom::set_attr(node, "src", url.as_str());
                let ext = extract_extension(url.as_str(), "png");
                page.images.push((url, AssetFolder::for_image(&ext), ext));
            }
        } else if dom::is_tag(node, "style") {
            page.inline_styles.push(dom::text_content(node));
        }
    });

    page.html = dom::serialize_children(&parsed.document)?;
    Ok(page)
}

/// Put rewritten `<style>` text back, point every downloaded URL at its
/// local path and drop any `<base>` the replacement may have produced.
fn finalize_page(html: &str, inline_styles: &[String], mappings: Vec<(String, String)>) -> Result<String, PipelineError> {
    let parsed = dom::parse(html);
    for (style, text) in dom::elements_by_tag(&parsed.document, "style").iter().zip(inline_styles) {
        if dom::text_content(style) != *text {
            dom::set_text_content(style, text);
        }
    }
    let mut html = dom::serialize_children(&parsed.document)?;

    html = replace_urls(html, mappings);

    let parsed = dom::parse(&html);
    dom::remove_elements(&parsed.document, "base");
    dom::serialize_children(&parsed.document)
}

/// Literal replacement of every source URL with its local path. Longer URLs
/// go first so a URL that prefixes another cannot clobber it.
fn replace_urls(mut html: String, mut mappings: Vec<(String, String)>) -> String {
    mappings.retain(|(source, _)| !crate::url_resolver::is_inline_uri(source));
    mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    for (source, local_path) in &mappings {
        html = html.replace(source.as_str(), local_path);
        let escaped = dom::escape_attr(source);
        if escaped != *source {
            html = html.replace(&escaped, local_path);
        }
    }
    html
}

type FragmentImage = Option<(AbsoluteUrl, AssetFolder, String)>;

/// Download target of every `<img>` in an edited body fragment, one entry
/// per image in document order.
fn collect_fragment_images(edited_html: &str, site: &str) -> Vec<FragmentImage> {
    let fragment = dom::parse_body_fragment(edited_html);
    dom::elements_by_tag(&dom::fragment_root(&fragment), "img")
        .iter()
        .map(|img| {
            let src = dom::get_attr(img, "src")?;
            let url = to_absolute(&src, site).filter(|u| !u.is_inline())?;
            let ext = extract_extension(url.as_str(), "png");
            Some((url, AssetFolder::for_image(&ext), ext))
        })
        .collect()
}

fn apply_fragment_images(edited_html: &str, resolved: &[Option<String>]) -> Result<String, PipelineError> {
    let fragment = dom::parse_body_fragment(edited_html);
    let root = dom::fragment_root(&fragment);
    for (img, local_path) in dom::elements_by_tag(&root, "img").iter().zip(resolved) {
        if let Some(path) = local_path {
            dom::set_attr(img, "src", path);
        }
    }
    dom::serialize_children(&root)
}

/// Theme CSS can never close the `<style>` element it is embedded in.
fn escape_style_text(css: &str) -> String {
    css.replace("</", "<\\/")
}

fn wrap_document(body: &str, theme_css: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"/>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_style_text(theme_css),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "https://example.com/";

    #[test]
    fn tags_regions_in_document_order() {
        let html = "<html><body><header>h</header><main><section>a</section></main><footer>f</footer></body></html>";
        let body = tag_sections(html).unwrap();
        assert_eq!(
            body,
            r#"<header data-section-id="section_0">h</header><main data-section-id="section_1"><section data-section-id="section_2">a</section></main><footer data-section-id="section_3">f</footer>"#
        );
    }

    #[test]
    fn collects_stylesheets_in_order() {
        let html = r#"<head>
            <link rel="stylesheet" href="/a.css">
            <link rel="preload stylesheet" href="b.css">
            <link rel="icon" href="/favicon.ico">
            <link rel="stylesheet" href="data:text/css,body{}">
        </head>"#;
        let links: Vec<String> = stylesheet_links(html, SITE).iter().map(|u| u.to_string()).collect();
        assert_eq!(links, vec!["https://example.com/a.css", "https://example.com/b.css"]);
    }

    #[test]
    fn prepare_absolutizes_and_collects() {
        let html = r#"<html><head>
            <base href="https://cdn.example.com/">
            <link rel="stylesheet" href="/site.css">
            <link rel="stylesheet" href="/site.css">
            <style>.hero{background:url(/bg.jpg)}</style>
            <script src="//cdn.example.net/app.js"></script>
            <script>inline()</script>
        </head><body>
            <img data-src="/lazy.webp" srcset="/x-2x.webp 2x" sizes="100vw">
            <img src="/favicon.ico">
            <img src="data:image/gif;base64,R0lGOD">
        </body></html>"#;

        let page = prepare_page(html, SITE).unwrap();

        assert!(!page.html.contains("<base"));
        assert!(page.html.contains(r#"href="https://example.com/site.css""#));
        assert!(page.html.contains(r#"src="https://cdn.example.net/app.js""#));
        assert!(page.html.contains(r#"src="https://example.com/lazy.webp""#));
        assert!(!page.html.contains("srcset"));
        assert!(!page.html.contains("sizes="));

        assert_eq!(page.stylesheets.len(), 1);
        assert_eq!(page.scripts.len(), 1);
        let images: Vec<(&str, AssetFolder)> = page.images.iter().map(|(u, f, _)| (u.as_str(), *f)).collect();
        assert_eq!(
            images,
            vec![
                ("https://example.com/lazy.webp", AssetFolder::Images),
                ("https://example.com/favicon.ico", AssetFolder::Favicon),
            ]
        );
        assert_eq!(page.inline_styles, vec![".hero{background:url(/bg.jpg)}".to_string()]);
    }

    #[test]
    fn replacement_handles_prefixes_and_escaped_ampersands() {
        let html = r#"<link href="https://x.com/a.css"><link href="https://x.com/a.css?v=2&amp;t=1">"#.to_string();
        let mappings = vec![
            ("https://x.com/a.css".to_string(), "css/short.css".to_string()),
            ("https://x.com/a.css?v=2&t=1".to_string(), "css/long.css".to_string()),
        ];
        let out = replace_urls(html, mappings);
        assert_eq!(out, r#"<link href="css/short.css"><link href="css/long.css">"#);
    }

    #[test]
    fn finalize_restores_styles_and_strips_base() {
        let html = "<html><head><style>.a{background:url(/x.png)}</style></head><body><img src=\"https://example.com/x.png\"></body></html>";
        let styles = vec![".a{background:url(\"images/x.png\")}".to_string()];
        let mappings = vec![("https://example.com/x.png".to_string(), "images/x.png".to_string())];

        let out = finalize_page(html, &styles, mappings).unwrap();

        assert!(out.contains(r#"<style>.a{background:url("images/x.png")}</style>"#));
        assert!(out.contains(r#"<img src="images/x.png">"#));
    }

    #[test]
    fn fragment_images_follow_document_order() {
        let edited = r#"<section><img src="/a.png"><img src="data:image/png;base64,AA"><img src="https://cdn.x.com/i.ico"></section>"#;
        let images = collect_fragment_images(edited, SITE);
        assert_eq!(images.len(), 3);
        assert!(images[1].is_none());
        assert_eq!(images[2].as_ref().map(|(_, f, _)| *f), Some(AssetFolder::Favicon));

        let resolved = vec![Some("images/a.png".to_string()), None, None];
        let body = apply_fragment_images(edited, &resolved).unwrap();
        assert_eq!(
            body,
            r#"<section><img src="images/a.png"><img src="data:image/png;base64,AA"><img src="https://cdn.x.com/i.ico"></section>"#
        );
    }

    #[test]
    fn wrapped_document_embeds_theme() {
        let doc = wrap_document("<p>hi</p>", "body{color:red}");
        assert!(doc.starts_with("<!doctype html>"));
        assert!(doc.contains("<style>body{color:red}</style>"));
        assert!(doc.contains("<body>\n<p>hi</p>\n</body>"));
    }

    #[test]
    fn theme_cannot_close_its_style_block() {
        let doc = wrap_document("<p>hi</p>", "a::after{content:\"</style><script>x()</script>\"}");
        assert_eq!(doc.matches("</style>").count(), 1);
        assert!(doc.contains(r#"content:"<\/style><script>x()<\/script>""#));
        assert!(!doc.contains("<script>x()</script>"));
    }
}
