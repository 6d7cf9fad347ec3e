//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a [`ConversionQueue`] wired to in-process fakes:
//! [`FakeEngine`] stands in for ffmpeg (it copies input to output and can be
//! told to fail, to refuse loading, or to block until released),
//! [`FakeNormalizer`] turns any "HEIC" bytes into a PNG, and [`FakeProber`]
//! reports fixed video dimensions.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use mediaforge::conversion::{ConversionExecutor, ConversionQueue};
use mediaforge::InputFile;
use mf_av::{
    DimensionProbe, LegacyImageNormalizer, ProgressFn, RasterBackend, SharedEngine,
    TranscodeBackend, TranscodeEngine, VideoProber,
};
use mf_core::config::ConversionConfig;
use mf_core::events::{Event, EventBus};
use mf_core::Dimensions;

/// Video dimensions every [`FakeProber`] reports.
pub const VIDEO_DIMENSIONS: Dimensions = Dimensions {
    width: 1920,
    height: 1080,
};

/// Size of the PNG every [`FakeNormalizer`] produces.
pub const NORMALIZED_DIMENSIONS: Dimensions = Dimensions {
    width: 40,
    height: 30,
};

// ---------------------------------------------------------------------------
// Fake engine
// ---------------------------------------------------------------------------

/// Observable and adjustable state shared by a [`FakeEngine`] and its test.
#[derive(Default)]
pub struct EngineState {
    pub loads: Mutex<usize>,
    pub fail_load: Mutex<bool>,
    /// Fail any command with an argument containing this text.
    pub fail_on: Mutex<Option<String>>,
    /// When set, each command waits for a permit (or cancellation).
    pub gate: Mutex<Option<Arc<Semaphore>>>,
    pub commands: Mutex<Vec<Vec<String>>>,
    pub files: Mutex<BTreeMap<String, Vec<u8>>>,
    pub active: Mutex<usize>,
    pub max_active: Mutex<usize>,
}

impl EngineState {
    pub fn last_command(&self) -> Vec<String> {
        self.commands.lock().last().cloned().unwrap_or_default()
    }

    /// Make commands block until [`release`](Self::release) is called.
    pub fn close_gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

pub struct FakeEngine {
    pub state: Arc<EngineState>,
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn load(&mut self) -> mf_core::Result<()> {
        *self.state.loads.lock() += 1;
        if *self.state.fail_load.lock() {
            return Err(mf_core::Error::tool("fake", "failed to fetch engine core"));
        }
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> mf_core::Result<()> {
        self.state.files.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(
        &mut self,
        args: &[String],
        progress: &mut ProgressFn<'_>,
        cancel: Option<CancellationToken>,
    ) -> mf_core::Result<()> {
        self.state.commands.lock().push(args.to_vec());
        {
            let mut active = self.state.active.lock();
            *active += 1;
            let mut max = self.state.max_active.lock();
            *max = (*max).max(*active);
        }

        let result = self.run(args, progress, cancel).await;
        *self.state.active.lock() -= 1;
        result
    }

    async fn read_file(&mut self, name: &str) -> mf_core::Result<Vec<u8>> {
        self.state
            .files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| mf_core::Error::not_found("engine file", name))
    }

    async fn delete_file(&mut self, name: &str) -> mf_core::Result<()> {
        self.state.files.lock().remove(name);
        Ok(())
    }
}

impl FakeEngine {
    async fn run(
        &self,
        args: &[String],
        progress: &mut ProgressFn<'_>,
        cancel: Option<CancellationToken>,
    ) -> mf_core::Result<()> {
        progress(0.5);

        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            let cancel = cancel.unwrap_or_default();
            tokio::select! {
                permit = gate.acquire() => {
                    if let Ok(p) = permit {
                        p.forget();
                    }
                }
                _ = cancel.cancelled() => {
                    return Err(mf_core::Error::CommandFailed("cancelled".into()));
                }
            }
        }

        let fail_on = self.state.fail_on.lock().clone();
        if let Some(needle) = fail_on {
            if args.iter().any(|a| a.contains(&needle)) {
                return Err(mf_core::Error::CommandFailed(format!(
                    "Unknown encoder '{needle}'"
                )));
            }
        }

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let output = args.last().cloned().unwrap_or_default();
        let data = self.state.files.lock().get(&input).cloned().unwrap_or_default();
        self.state.files.lock().insert(output, data);

        progress(1.0);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake normaliser and prober
// ---------------------------------------------------------------------------

/// Records the quality of every normalisation request.
#[derive(Default)]
pub struct FakeNormalizer {
    pub qualities: Mutex<Vec<f32>>,
}

#[async_trait]
impl LegacyImageNormalizer for FakeNormalizer {
    fn name(&self) -> &'static str {
        "fake-heif"
    }

    async fn normalize(&self, _source: &[u8], quality: f32) -> mf_core::Result<Bytes> {
        self.qualities.lock().push(quality);
        Ok(Bytes::from(png(
            NORMALIZED_DIMENSIONS.width,
            NORMALIZED_DIMENSIONS.height,
        )))
    }
}

pub struct FakeProber;

#[async_trait]
impl VideoProber for FakeProber {
    fn name(&self) -> &'static str {
        "fake-probe"
    }

    async fn dimensions(&self, _name: &str, _source: &[u8]) -> mf_core::Result<Option<Dimensions>> {
        Ok(Some(VIDEO_DIMENSIONS))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub queue: Arc<ConversionQueue>,
    pub engine: Arc<EngineState>,
    pub normalizer: Arc<FakeNormalizer>,
    pub events: Arc<EventBus>,
}

impl TestHarness {
    pub fn new() -> Self {
        let events = Arc::new(EventBus::new(1024));
        let engine = Arc::new(EngineState::default());
        let normalizer = Arc::new(FakeNormalizer::default());
        let settings = ConversionConfig::default();

        let shared = SharedEngine::with_events(
            FakeEngine {
                state: engine.clone(),
            },
            events.clone(),
        );
        let executor = ConversionExecutor::new(
            RasterBackend::new(
                normalizer.clone(),
                settings.image_quality,
                settings.normalize_quality,
            ),
            TranscodeBackend::new(Arc::new(shared), settings.clone()),
            DimensionProbe::new(
                normalizer.clone(),
                Some(Arc::new(FakeProber)),
                settings.probe_normalize_quality,
            ),
        );

        Self {
            queue: Arc::new(ConversionQueue::new(executor, events.clone())),
            engine,
            normalizer,
            events,
        }
    }

    /// Add one file and return its id; panics if it was rejected.
    pub async fn add(&self, file: InputFile) -> mf_core::ItemId {
        let ids = self.queue.add_files(vec![file]).await;
        assert_eq!(ids.len(), 1, "file was rejected");
        ids[0]
    }
}

/// Drain everything currently buffered on a receiver, oldest first.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An in-memory PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 120, 200, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("encode fixture png");
    buf.into_inner()
}

pub fn png_file(name: &str, width: u32, height: u32) -> InputFile {
    InputFile::new(name, "image/png", png(width, height))
}

pub fn video_file(name: &str) -> InputFile {
    InputFile::new(name, "", Bytes::from_static(b"\x00\x00\x00\x18ftypmp42 fake video"))
}

pub fn audio_file(name: &str) -> InputFile {
    InputFile::new(name, "", Bytes::from_static(b"ID3 fake audio"))
}
