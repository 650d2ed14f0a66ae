//! In-memory OPC package access.
//!
//! A [`DocxPackage`] holds every part of the ZIP container in memory in
//! archive order, so the annotation passes can replace individual parts and
//! re-emit a structurally identical package.

use docaudit_core::{AuditError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// Part name of the main document content.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Part name of the shared comments collection.
pub const COMMENTS_PART: &str = "word/comments.xml";
/// Part name of the main document's relationships.
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
/// Part name of the package content-type registry.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// An opened DOCX package: ordered `(part name, bytes)` pairs.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    /// Open a package from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a ZIP archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Open a package from an in-memory byte stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a readable ZIP archive.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AuditError::Package(format!("failed to open DOCX as ZIP: {e}")))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| AuditError::Package(format!("failed to read ZIP entry {i}: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push((file.name().to_string(), data));
        }

        Ok(Self { parts })
    }

    /// Assemble a package directly from parts (fixture synthesis).
    #[must_use = "creates a package from the given parts"]
    pub fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Self {
        Self { parts }
    }

    /// Raw bytes of a part, if present.
    #[must_use = "returns the part bytes if present"]
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// A part decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the part is missing or not valid UTF-8.
    pub fn part_str(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| AuditError::Package(format!("missing part: {name}")))?;
        String::from_utf8(data.to_vec())
            .map_err(|e| AuditError::Package(format!("part {name} is not UTF-8: {e}")))
    }

    /// Whether a part exists in the package.
    #[inline]
    #[must_use = "returns whether the part exists"]
    pub fn has_part(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    /// Replace a part's bytes, or append it if not yet present.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(entry) = self.parts.iter_mut().find(|(n, _)| n == name) {
            entry.1 = data;
        } else {
            self.parts.push((name.to_string(), data));
        }
    }

    /// The main document content, `word/document.xml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the part is missing; a package without it is
    /// unusable as a word-processing document.
    pub fn document_xml(&self) -> Result<String> {
        self.part_str(DOCUMENT_PART)
    }

    /// Parse `word/_rels/document.xml.rels` into an id → target map.
    ///
    /// Returns an empty map when the relationships part is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the part exists but cannot be parsed.
    pub fn relationships(&self) -> Result<HashMap<String, String>> {
        let Some(data) = self.part(DOCUMENT_RELS_PART) else {
            return Ok(HashMap::new());
        };
        let xml = String::from_utf8_lossy(data);

        let mut relationships = HashMap::new();
        let mut reader = Reader::from_str(&xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e) | Event::Start(e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    let mut rel_id = None;
                    let mut target = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| {
                            AuditError::Xml(format!("invalid relationship attribute: {e}"))
                        })?;
                        match attr.key.as_ref() {
                            b"Id" => {
                                rel_id = Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                            b"Target" => {
                                target = Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(tgt)) = (rel_id, target) {
                        relationships.insert(id, tgt);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(AuditError::Xml(format!(
                        "error parsing relationships: {e}"
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(relationships)
    }

    /// Bytes of a media part referenced by a relationship target.
    ///
    /// Targets are relative to `word/` (e.g. `media/image1.png`); absolute
    /// targets (`/word/media/...`) are tolerated.
    #[must_use = "returns the media bytes if present"]
    pub fn media_bytes(&self, target: &str) -> Option<&[u8]> {
        if let Some(absolute) = target.strip_prefix('/') {
            return self.part(absolute);
        }
        self.part(&format!("word/{target}"))
    }

    /// Serialize the package back to ZIP bytes, preserving part order.
    ///
    /// # Errors
    ///
    /// Returns an error if ZIP serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<()> = FileOptions::default();

        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| AuditError::Package(format!("failed to start part {name}: {e}")))?;
            zip.write_all(data)?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| AuditError::Package(format!("failed to finish ZIP: {e}")))?;
        Ok(cursor.into_inner())
    }

    /// Write the package to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
