//! Asset Store
//!
//! Run-scoped dedup map from absolute source URL to the archive path
//! assigned to it. Each distinct URL is fetched at most once per run, even
//! when many jobs ask for it concurrently: the first caller downloads while
//! the others await the same in-flight slot.

use crate::archive::ArchiveBuilder;
use crate::error::PipelineError;
use crate::fetcher::Fetch;
use crate::url_resolver::{extract_extension, AbsoluteUrl, AssetFolder};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Outcome of resolving one reference to a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Stored in the archive at this path
    Local(String),
    /// `data:`/`blob:` URI, left inline
    Inline,
    /// Download failed; the reference stays as it was
    Unavailable,
}

impl Resolved {
    pub fn local_path(&self) -> Option<&str> {
        match self {
            Resolved::Local(path) => Some(path),
            _ => None,
        }
    }
}

/// One downloaded asset
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub source_url: AbsoluteUrl,
    pub local_path: String,
    pub bytes: Vec<u8>,
}

type Slot = Arc<OnceCell<Option<String>>>;

pub struct AssetStore<'a, F> {
    fetcher: &'a F,
    timeout: Duration,
    slots: DashMap<String, Slot>,
    records: DashMap<String, AssetRecord>,
}

/// Deterministic file stem for a source URL
pub fn content_address(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl<'a, F: Fetch> AssetStore<'a, F> {
    pub fn new(fetcher: &'a F, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            slots: DashMap::new(),
            records: DashMap::new(),
        }
    }

    /// Download `url` into `folder` unless it is already known. The file
    /// extension comes from the URL, or `fallback_ext` when it has none.
    pub async fn ensure_downloaded(&self, url: &AbsoluteUrl, folder: AssetFolder, fallback_ext: &str) -> Resolved {
        let fallback = if fallback_ext.is_empty() { "bin" } else { fallback_ext };
        let ext = extract_extension(url.as_str(), fallback);
        self.ensure(url, folder, &ext).await
    }

    /// Like `ensure_downloaded`, but the stored file always ends in `.css`.
    pub async fn ensure_stylesheet(&self, url: &AbsoluteUrl) -> Resolved {
        self.ensure(url, AssetFolder::Css, "css").await
    }

    async fn ensure(&self, url: &AbsoluteUrl, folder: AssetFolder, ext: &str) -> Resolved {
        if let Some(path) = self.local_path(url) {
            return Resolved::Local(path);
        }
        if url.is_inline() {
            return Resolved::Inline;
        }

        // The dashmap guard is released at the end of this statement, before
        // any await point.
        let slot: Slot = Arc::clone(&self.slots.entry(url.as_str().to_string()).or_default());

        let outcome = slot.get_or_init(|| self.download(url, folder, ext)).await;
        match outcome {
            Some(path) => Resolved::Local(path.clone()),
            None => Resolved::Unavailable,
        }
    }

    async fn download(&self, url: &AbsoluteUrl, folder: AssetFolder, ext: &str) -> Option<String> {
        let bytes = self.fetcher.fetch(url.as_str(), self.timeout).await?;

        let local_path = format!("{}/{}.{}", folder.directory(), content_address(url.as_str()), ext);
        debug!(url = %url, path = %local_path, size = bytes.len(), "asset stored");

        self.records.insert(
            url.as_str().to_string(),
            AssetRecord {
                source_url: url.clone(),
                local_path: local_path.clone(),
                bytes,
            },
        );
        Some(local_path)
    }

    /// Path already assigned to `url`, if any.
    pub fn local_path(&self, url: &AbsoluteUrl) -> Option<String> {
        self.records.get(url.as_str()).map(|r| r.local_path.clone())
    }

    /// Current bytes stored for `url`.
    pub fn contents(&self, url: &AbsoluteUrl) -> Option<Vec<u8>> {
        self.records.get(url.as_str()).map(|r| r.bytes.clone())
    }

    /// Replace the stored bytes of an already recorded asset, e.g. with a
    /// stylesheet whose `url()` references were rewritten. The assigned
    /// path does not change.
    pub fn update_contents(&self, url: &AbsoluteUrl, bytes: Vec<u8>) -> bool {
        match self.records.get_mut(url.as_str()) {
            Some(mut record) => {
                record.bytes = bytes;
                true
            }
            None => false,
        }
    }

    /// (source URL, local path) for every stored asset.
    pub fn mappings(&self) -> Vec<(String, String)> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.local_path.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move every record into `archive`, one write per asset.
    pub fn write_into(self, archive: &mut ArchiveBuilder) -> Result<usize, PipelineError> {
        let mut records: Vec<AssetRecord> = self.records.into_iter().map(|(_, r)| r).collect();
        records.sort_by(|a, b| a.local_path.cmp(&b.local_path));

        let count = records.len();
        for record in records {
            archive.add(&record.local_path, record.bytes)?;
        }
        Ok(count)
    }
}
