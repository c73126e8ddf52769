//! Archive Builder
//!
//! In-memory, write-once map of archive path to content, serialized to a
//! ZIP file at the end of a run.

use crate::error::PipelineError;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. A path can only be written once per archive.
    pub fn add(&mut self, path: &str, content: impl Into<Vec<u8>>) -> Result<(), PipelineError> {
        if self.entries.contains_key(path) {
            return Err(PipelineError::DuplicateEntry(path.to_string()));
        }
        self.entries.insert(path.to_string(), content.into());
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize every entry into ZIP bytes. `index.html` is written first.
    pub fn finish(self) -> Result<Vec<u8>, PipelineError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let (index, rest): (Vec<_>, Vec<_>) = self
            .entries
            .into_iter()
            .partition(|(path, _)| path == INDEX_FILE);

        for (path, content) in index.into_iter().chain(rest) {
            zip.start_file(path.as_str(), options)?;
            zip.write_all(&content)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn rejects_second_write_to_same_path() {
        let mut archive = ArchiveBuilder::new();
        archive.add("images/a.png", vec![1, 2, 3]).unwrap();
        let err = archive.add("images/a.png", vec![9]).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateEntry(ref p) if p == "images/a.png"));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn finish_produces_readable_zip() {
        let mut archive = ArchiveBuilder::new();
        archive.add("css/site.css", "body{}").unwrap();
        archive.add(INDEX_FILE, "<html></html>").unwrap();
        archive.add("images/logo.png", vec![0x89, b'P', b'N', b'G']).unwrap();

        let bytes = archive.finish().unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 3);
        assert_eq!(zip.by_index(0).unwrap().name(), INDEX_FILE);

        let mut css = String::new();
        zip.by_name("css/site.css").unwrap().read_to_string(&mut css).unwrap();
        assert_eq!(css, "body{}");

        let mut logo = Vec::new();
        zip.by_name("images/logo.png").unwrap().read_to_end(&mut logo).unwrap();
        assert_eq!(logo, vec![0x89, b'P', b'N', b'G']);
    }
}
