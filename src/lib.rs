//! Reforge - turns a live website into a self-contained static bundle.
//!
//! A page is rendered in headless Chrome, every stylesheet, script, image
//! and font it references is downloaded once, references are rewritten to
//! local paths, and the result is packaged as a ZIP archive.

pub mod archive;
pub mod asset_store;
pub mod cloner;
pub mod config;
pub mod css_rewriter;
pub mod dom;
pub mod error;
pub mod fetcher;
pub mod renderer;
pub mod structure;
pub mod url_resolver;

pub use cloner::{Cloner, ScrapeResult};
pub use config::{CloneConfig, RenderConfig};
pub use error::{CloneError, ConfigError, PipelineError, RenderError};
pub use fetcher::{Fetch, HttpFetcher};
pub use renderer::{ChromeRenderer, Render};
pub use structure::{primary_sections, SectionKind, StructureNode};
