//! Conversion results.

use bytes::Bytes;

/// Bytes produced by a backend together with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedOutput {
    pub bytes: Bytes,
    pub mime_type: &'static str,
}

impl ConvertedOutput {
    pub fn new(bytes: impl Into<Bytes>, mime_type: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
