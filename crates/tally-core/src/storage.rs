//! Blob storage for uploaded statement files
//!
//! Files live under a root directory, keyed `{statement_id}/{timestamp}.{ext}`.
//! Writes go through a temp file in the same directory and are renamed into
//! place, so a reader never sees a half-written file.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};

/// Local directory blob store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::Storage(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Key for a statement file uploaded at `at`
    ///
    /// The extension is the uploaded filename's when it names a known
    /// document type, else the one matching `content_type`, else whatever
    /// the filename carries. `bin` when nothing usable is left.
    pub fn statement_key(
        statement_id: i64,
        filename: &str,
        content_type: Option<&str>,
        at: DateTime<Utc>,
    ) -> String {
        let named = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase());

        let ext = match named {
            Some(ext) if mime_for_extension(&ext).is_some() => ext,
            named => content_type
                .and_then(extension_for_mime)
                .map(str::to_string)
                .or(named)
                .unwrap_or_else(|| "bin".to_string()),
        };
        format!("{}/{}.{}", statement_id, at.timestamp_millis(), ext)
    }

    /// Store bytes under `key`, replacing any existing blob
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        let dir = path
            .parent()
            .ok_or_else(|| Error::Storage(format!("Invalid key: {}", key)))?;
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|e| Error::Storage(format!("Failed to store {}: {}", key, e)))?;

        debug!(key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    /// Read the blob stored under `key`
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("file {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob; returns false if it did not exist
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                // Drop the statement directory once it is empty
                if let Some(dir) = path.parent() {
                    let _ = std::fs::remove_dir(dir);
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Map a key to a path under the root, rejecting anything that escapes it
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("Invalid key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

/// Document types the LLM accepts, by file extension
const DOCUMENT_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("gif", "image/gif"),
];

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    DOCUMENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Extension for a `Content-Type` value, ignoring parameters such as charset
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim();
    DOCUMENT_TYPES
        .iter()
        .find(|(_, mime)| mime.eq_ignore_ascii_case(essence))
        .map(|(ext, _)| *ext)
}

/// MIME type sent to the LLM for a stored file
pub fn mime_type_for(key: &str) -> &'static str {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .unwrap_or("application/octet-stream")
}
