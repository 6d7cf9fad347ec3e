//! Downloadable artifacts for completed items.
//!
//! Each completed item gets exactly one [`DownloadId`]. Releasing the id
//! (on removal, reset or re-conversion) drops the stored bytes, and any
//! later lookup through that id returns `None`.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;

use mf_av::ConvertedOutput;
use mf_core::{DownloadId, ItemId};

/// A ready-to-save conversion result.
#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub id: DownloadId,
    pub item_id: ItemId,
    /// `<original stem>.<output format>`
    pub file_name: String,
    pub mime_type: &'static str,
    #[serde(skip)]
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct DownloadStore {
    entries: RwLock<HashMap<DownloadId, Download>>,
}

impl DownloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a result and return its handle.
    pub fn issue(&self, item_id: ItemId, file_name: String, output: &ConvertedOutput) -> DownloadId {
        let id = DownloadId::new();
        let download = Download {
            id,
            item_id,
            file_name,
            mime_type: output.mime_type,
            bytes: output.bytes.clone(),
        };
        self.entries.write().insert(id, download);
        tracing::debug!(download_id = %id, item_id = %item_id, "issued download");
        id
    }

    pub fn get(&self, id: DownloadId) -> Option<Download> {
        self.entries.read().get(&id).cloned()
    }

    /// Invalidate a handle. Returns whether it was live.
    pub fn release(&self, id: DownloadId) -> bool {
        let released = self.entries.write().remove(&id).is_some();
        if released {
            tracing::debug!(download_id = %id, "released download");
        }
        released
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_get_release() {
        let store = DownloadStore::new();
        let item = ItemId::new();
        let id = store.issue(
            item,
            "clip.webm".into(),
            &ConvertedOutput::new(Bytes::from_static(b"webm"), "video/webm"),
        );

        let d = store.get(id).unwrap();
        assert_eq!(d.item_id, item);
        assert_eq!(d.file_name, "clip.webm");
        assert_eq!(d.bytes.as_ref(), b"webm");
        assert_eq!(store.len(), 1);

        assert!(store.release(id));
        assert!(store.get(id).is_none());
        assert!(!store.release(id));
        assert!(store.is_empty());
    }
}
