//! Transcode engine abstraction and the shared, lazily loaded instance.
//!
//! A [`TranscodeEngine`] exposes the five primitives conversion needs:
//! `load`, `write_file`, `exec`, `read_file` and `delete_file`. Exactly one
//! engine instance exists per [`SharedEngine`]; it is loaded on first use
//! and every caller goes through [`SharedEngine::acquire`], whose guard
//! serialises access so two commands can never overlap.

pub mod ffmpeg;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use mf_core::events::{EventBus, EventPayload};

pub use self::ffmpeg::{FfmpegEngine, ProgressParser};

/// Progress sink: receives the engine's fractional completion, 0.0–1.0.
pub type ProgressFn<'a> = dyn FnMut(f64) + Send + 'a;

/// A stateful transcoding engine with a private file namespace.
#[async_trait]
pub trait TranscodeEngine: Send {
    /// Human-readable name identifying this engine implementation.
    fn name(&self) -> &'static str;

    /// Initialise the engine. Called once, before any other method.
    async fn load(&mut self) -> mf_core::Result<()>;

    /// Write a file into the engine's namespace.
    async fn write_file(&mut self, name: &str, data: &[u8]) -> mf_core::Result<()>;

    /// Run one command. `args` reference files by their namespace names.
    async fn exec(
        &mut self,
        args: &[String],
        progress: &mut ProgressFn<'_>,
        cancel: Option<CancellationToken>,
    ) -> mf_core::Result<()>;

    /// Read a file back out of the namespace.
    async fn read_file(&mut self, name: &str) -> mf_core::Result<Vec<u8>>;

    /// Remove a file from the namespace. Missing files are not an error.
    async fn delete_file(&mut self, name: &str) -> mf_core::Result<()>;
}

struct EngineSlot {
    engine: Box<dyn TranscodeEngine>,
    loaded: bool,
}

/// The process-wide engine instance.
pub struct SharedEngine {
    slot: Mutex<EngineSlot>,
    events: Option<Arc<EventBus>>,
}

impl SharedEngine {
    /// Wrap an engine. Nothing is loaded until the first [`acquire`](Self::acquire).
    pub fn new(engine: impl TranscodeEngine + 'static) -> Self {
        Self {
            slot: Mutex::new(EngineSlot {
                engine: Box::new(engine),
                loaded: false,
            }),
            events: None,
        }
    }

    /// Like [`new`](Self::new), announcing a successful load on `events`.
    pub fn with_events(engine: impl TranscodeEngine + 'static, events: Arc<EventBus>) -> Self {
        let mut shared = Self::new(engine);
        shared.events = Some(events);
        shared
    }

    /// Take exclusive use of the engine, loading it first if needed.
    ///
    /// A failed load is reported as [`mf_core::Error::EngineUnavailable`]
    /// and leaves the engine unloaded, so a later call tries again.
    pub async fn acquire(&self) -> mf_core::Result<EngineGuard<'_>> {
        let mut slot = self.slot.lock().await;

        if !slot.loaded {
            let name = slot.engine.name();
            tracing::info!(engine = name, "loading transcode engine");
            slot.engine.load().await.map_err(|e| {
                tracing::error!(engine = name, error = %e, "transcode engine failed to load");
                match e {
                    mf_core::Error::EngineUnavailable(_) => e,
                    other => mf_core::Error::EngineUnavailable(other.to_string()),
                }
            })?;
            slot.loaded = true;
            if let Some(ref events) = self.events {
                events.broadcast(EventPayload::EngineLoaded);
            }
        }

        Ok(EngineGuard { slot })
    }

    /// Whether the engine has been loaded. Waits for any in-flight command.
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.loaded
    }
}

/// Exclusive access to the loaded engine; released on drop.
pub struct EngineGuard<'a> {
    slot: MutexGuard<'a, EngineSlot>,
}

impl Deref for EngineGuard<'_> {
    type Target = dyn TranscodeEngine;

    fn deref(&self) -> &Self::Target {
        self.slot.engine.as_ref()
    }
}

impl DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slot.engine.as_mut()
    }
}
