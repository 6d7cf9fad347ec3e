//! Raw files handed to the queue.

use std::path::Path;

use bytes::Bytes;
use serde::Serialize;

use mf_core::registry;

/// A submitted file: its name, the MIME type the source declared (often
/// empty), and its content.
#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub name: String,
    pub declared_mime: String,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl InputFile {
    pub fn new(name: impl Into<String>, declared_mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            declared_mime: declared_mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk. Files on disk carry no declared type, so the
    /// effective type comes from the extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self::new(name, "", bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn effective_mime_type(&self) -> String {
        registry::effective_mime_type(&self.name, &self.declared_mime)
    }

    pub fn is_legacy_image(&self) -> bool {
        registry::is_legacy_image(&self.name, &self.declared_mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_is_preferred() {
        let f = InputFile::new("clip.bin", "video/webm", Bytes::from_static(b"x"));
        assert_eq!(f.effective_mime_type(), "video/webm");
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn heic_without_type_is_legacy() {
        let f = InputFile::new("photo.heic", "", Vec::new());
        assert_eq!(f.effective_mime_type(), "image/heic");
        assert!(f.is_legacy_image());
        assert!(f.is_empty());
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        let f = InputFile::from_path(&path).await.unwrap();
        assert_eq!(f.name, "song.mp3");
        assert_eq!(f.declared_mime, "");
        assert_eq!(f.bytes.as_ref(), b"ID3");
        assert_eq!(f.effective_mime_type(), "audio/mpeg");
    }
}
