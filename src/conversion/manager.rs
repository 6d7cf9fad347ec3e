//! The conversion queue.
//!
//! [`ConversionQueue`] owns the ordered item list, the download store and
//! the backends. Queue state sits behind a synchronous lock that is never
//! held across an await; conversions are serialised by a separate async
//! run lock, so at most one item is ever converting.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use mf_core::config::Config;
use mf_core::events::{EventBus, EventPayload};
use mf_core::{DownloadId, ItemId};
use mf_av::ToolRegistry;

use super::executor::{ConversionExecutor, ConversionJob};
use super::item::{ConversionItem, ItemEdit, ItemSnapshot, StatusKind};
use crate::downloads::{Download, DownloadStore};
use crate::input::InputFile;

/// How a single conversion attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    Completed,
    Failed,
    /// The item was removed while converting; its result was dropped.
    Discarded,
}

/// Result of a [`ConversionQueue::convert_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertAllSummary {
    pub completed: usize,
    pub failed: usize,
    /// Selected items that were removed or edited out of an open state
    /// before their turn came.
    pub skipped: usize,
    pub discarded: usize,
}

#[derive(Default)]
struct QueueState {
    items: Vec<ConversionItem>,
}

impl QueueState {
    fn get(&self, id: ItemId) -> Option<&ConversionItem> {
        self.items.iter().find(|i| i.id == id)
    }

    fn get_mut(&mut self, id: ItemId) -> Option<&mut ConversionItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// The item, but only while `attempt` is still its current attempt.
    fn attempt_mut(&mut self, id: ItemId, attempt: u64) -> Option<&mut ConversionItem> {
        self.get_mut(id).filter(|i| i.attempt() == attempt)
    }
}

pub struct ConversionQueue {
    state: Arc<Mutex<QueueState>>,
    executor: ConversionExecutor,
    downloads: DownloadStore,
    events: Arc<EventBus>,
    run_lock: tokio::sync::Mutex<()>,
}

impl ConversionQueue {
    pub fn new(executor: ConversionExecutor, events: Arc<EventBus>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            executor,
            downloads: DownloadStore::new(),
            events,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Production queue: discovers tools and wires the real backends.
    pub fn from_config(config: &Config) -> Self {
        let events = Arc::new(EventBus::new(config.events.capacity));
        let tools = ToolRegistry::discover(&config.tools);
        let executor = ConversionExecutor::from_config(config, &tools, events.clone());
        Self::new(executor, events)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Validate, probe and append files in order. Unsupported files are
    /// dropped (with an `ItemRejected` event). Returns the new item ids.
    pub async fn add_files(&self, files: Vec<InputFile>) -> Vec<ItemId> {
        let mut added = Vec::with_capacity(files.len());

        for file in files {
            let mime = file.effective_mime_type();
            if mf_core::allowed_outputs(&mime).is_empty() {
                warn!(file = %file.name, mime = %mime, "rejected unsupported file");
                self.events.broadcast(EventPayload::ItemRejected {
                    name: file.name,
                    mime,
                });
                continue;
            }

            let original = self.executor.probe(&file).await;
            let Some(item) = ConversionItem::accept(file, original) else {
                continue;
            };
            let (id, name) = (item.id, item.input.name.clone());
            info!(item_id = %id, file = %name, mime = %item.effective_mime, dimensions = ?original, "added item");

            self.state.lock().items.push(item);
            self.events.broadcast(EventPayload::ItemAdded { item_id: id, name });
            added.push(id);
        }

        added
    }

    pub fn update_item(&self, id: ItemId, edit: ItemEdit) -> mf_core::Result<()> {
        {
            let mut state = self.state.lock();
            let item = state
                .get_mut(id)
                .ok_or_else(|| mf_core::Error::not_found("item", id))?;
            item.apply_edit(edit)?;
        }
        self.events.broadcast(EventPayload::ItemUpdated { item_id: id });
        Ok(())
    }

    /// Remove an item, releasing its download and aborting any attempt in
    /// flight. Late results for it are discarded.
    pub fn remove_item(&self, id: ItemId) -> mf_core::Result<()> {
        let mut item = {
            let mut state = self.state.lock();
            let index = state
                .items
                .iter()
                .position(|i| i.id == id)
                .ok_or_else(|| mf_core::Error::not_found("item", id))?;
            state.items.remove(index)
        };
        self.release(&mut item);
        info!(item_id = %id, "removed item");
        self.events.broadcast(EventPayload::ItemRemoved { item_id: id });
        Ok(())
    }

    /// Empty the queue, releasing every download.
    pub fn reset_all(&self) -> usize {
        let items = std::mem::take(&mut self.state.lock().items);
        let removed = items.len();
        for mut item in items {
            self.release(&mut item);
        }
        info!(removed, "queue reset");
        self.events.broadcast(EventPayload::QueueReset { removed });
        removed
    }

    fn release(&self, item: &mut ConversionItem) {
        item.cancel();
        if let Some(download) = item.download_id() {
            self.downloads.release(download);
        }
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// Convert every item that is pending or failed at call time, one after
    /// another in queue order. Failures never stop the run.
    pub async fn convert_all(&self) -> ConvertAllSummary {
        let _run = self.run_lock.lock().await;

        let selected: Vec<ItemId> = self
            .state
            .lock()
            .items
            .iter()
            .filter(|i| i.status().is_open())
            .map(|i| i.id)
            .collect();
        info!(count = selected.len(), "converting queue");

        let mut summary = ConvertAllSummary::default();
        for id in selected {
            match self.run_one(id).await {
                Ok(ConversionOutcome::Completed) => summary.completed += 1,
                Ok(ConversionOutcome::Failed) => summary.failed += 1,
                Ok(ConversionOutcome::Discarded) => summary.discarded += 1,
                Err(e) => {
                    warn!(item_id = %id, error = %e, "skipping item");
                    summary.skipped += 1;
                }
            }
        }

        info!(?summary, "queue run finished");
        summary
    }

    /// Convert (or retry) a single item. Waits for any running conversion.
    pub async fn convert_item(&self, id: ItemId) -> mf_core::Result<ConversionOutcome> {
        let _run = self.run_lock.lock().await;
        self.run_one(id).await
    }

    async fn run_one(&self, id: ItemId) -> mf_core::Result<ConversionOutcome> {
        let (job, attempt, cancel) = {
            let mut state = self.state.lock();
            let item = state
                .get_mut(id)
                .ok_or_else(|| mf_core::Error::not_found("item", id))?;
            let (attempt, cancel) = item.begin()?;
            (ConversionJob::from_item(item), attempt, cancel)
        };
        info!(item_id = %id, attempt, format = %job.output_format, "conversion started");
        self.events.broadcast(EventPayload::ConversionStarted { item_id: id });

        let state = self.state.clone();
        let events = self.events.clone();
        let mut on_progress = move |progress: u8| {
            let applied = state
                .lock()
                .attempt_mut(id, attempt)
                .is_some_and(|item| item.set_progress(progress).is_ok());
            if applied {
                events.broadcast(EventPayload::ConversionProgress { item_id: id, progress });
            }
        };

        let result = self.executor.execute(&job, &mut on_progress, cancel).await;

        let mut state = self.state.lock();
        let Some(item) = state.attempt_mut(id, attempt) else {
            warn!(item_id = %id, attempt, "discarding result for removed item");
            return Ok(ConversionOutcome::Discarded);
        };

        match result {
            Ok(output) => {
                let size = output.len() as u64;
                let download = self.downloads.issue(id, item.download_name(), &output);
                if let Err(e) = item.complete(output, download) {
                    self.downloads.release(download);
                    return Err(e);
                }
                drop(state);
                info!(item_id = %id, size, "conversion completed");
                self.events.broadcast(EventPayload::ConversionCompleted {
                    item_id: id,
                    output_size: size,
                });
                Ok(ConversionOutcome::Completed)
            }
            Err(e) => {
                let message = e.to_string();
                let detail = e.detail().map(str::to_owned);
                item.fail(message.clone())?;
                drop(state);
                error!(item_id = %id, error = %message, detail = ?detail, "conversion failed");
                self.events.broadcast(EventPayload::ConversionFailed {
                    item_id: id,
                    error: message,
                    detail,
                });
                Ok(ConversionOutcome::Failed)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Snapshots of every item in queue order.
    pub fn items(&self) -> Vec<ItemSnapshot> {
        self.state.lock().items.iter().map(ConversionItem::snapshot).collect()
    }

    pub fn item(&self, id: ItemId) -> Option<ItemSnapshot> {
        self.state.lock().get(id).map(ConversionItem::snapshot)
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// The download of a completed item.
    pub fn download(&self, id: ItemId) -> Option<Download> {
        let handle = self.state.lock().get(id)?.download_id()?;
        self.downloads.get(handle)
    }

    /// Resolve a download handle. Released handles resolve to `None`.
    pub fn resolve_download(&self, handle: DownloadId) -> Option<Download> {
        self.downloads.get(handle)
    }

    /// Downloads of every completed item, in queue order.
    pub fn downloads(&self) -> Vec<Download> {
        let handles: Vec<DownloadId> = self
            .state
            .lock()
            .items
            .iter()
            .filter_map(ConversionItem::download_id)
            .collect();
        handles.into_iter().filter_map(|h| self.downloads.get(h)).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.state
            .lock()
            .items
            .iter()
            .filter(|i| i.status().kind() == StatusKind::Complete)
            .count()
    }

    /// Whether a conversion run (or single-item conversion) is in progress.
    pub fn is_converting(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }
}
