//! Error types
//!
//! `CloneError` is what callers of the boundary operations see. Its
//! messages stay coarse; the underlying `PipelineError` is kept as the
//! error source so it can be logged without being shown to end users.

use thiserror::Error;

/// Failures of the headless browser capability.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigation to {0} timed out")]
    Timeout(String),
    #[error("page script failed: {0}")]
    Script(String),
}

/// Unrecoverable failures inside one clone/export run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("archive assembly failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive path written twice: {0}")]
    DuplicateEntry(String),
    #[error("serialized document is not valid UTF-8")]
    Encoding,
}

/// Errors returned by `scrape`, `clone_static` and `export_with_edits`.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("{0} required")]
    MissingField(&'static str),
    #[error("invalid website url: {0}")]
    InvalidUrl(String),
    #[error("scraping failed")]
    ScrapeFailed(#[source] PipelineError),
    #[error("static clone failed")]
    CloneFailed(#[source] PipelineError),
    #[error("export failed")]
    ExportFailed(#[source] PipelineError),
}

impl CloneError {
    /// True for errors caused by caller input rather than by the pipeline.
    pub fn is_input_error(&self) -> bool {
        matches!(self, CloneError::MissingField(_) | CloneError::InvalidUrl(_))
    }
}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
