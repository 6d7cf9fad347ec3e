//! Backend routing.
//!
//! The executor owns one instance of each backend plus the dimension
//! probe, and decides per job which backend runs it: images go to the
//! raster pipeline, audio and video to the shared transcode engine.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mf_av::{
    ConvertedOutput, DimensionProbe, FfmpegEngine, FfprobeProber, HeifConvertNormalizer,
    LegacyImageNormalizer, RasterBackend, RasterRequest, SharedEngine, ToolRegistry,
    TranscodeBackend, TranscodeRequest, VideoProber,
};
use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_core::{Dimensions, ItemId, MediaCategory, OutputFormat};

use super::item::ConversionItem;
use crate::input::InputFile;

/// Everything needed to convert one item, copied out of the queue so no
/// lock is held while a backend runs.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub item_id: ItemId,
    pub source_name: String,
    pub source: Bytes,
    pub effective_mime: String,
    pub category: MediaCategory,
    pub legacy: bool,
    pub output_format: OutputFormat,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub original: Option<Dimensions>,
}

impl ConversionJob {
    pub fn from_item(item: &ConversionItem) -> Self {
        // Target sizes only mean something for video and images.
        let sized = item.category.supports_dimensions();
        Self {
            item_id: item.id,
            source_name: item.input.name.clone(),
            source: item.input.bytes.clone(),
            effective_mime: item.effective_mime.clone(),
            category: item.category,
            legacy: item.legacy,
            output_format: item.output_format,
            target_width: item.target_width.filter(|_| sized),
            target_height: item.target_height.filter(|_| sized),
            original: item.original,
        }
    }
}

pub struct ConversionExecutor {
    raster: RasterBackend,
    transcode: TranscodeBackend,
    probe: DimensionProbe,
}

impl ConversionExecutor {
    pub fn new(raster: RasterBackend, transcode: TranscodeBackend, probe: DimensionProbe) -> Self {
        Self {
            raster,
            transcode,
            probe,
        }
    }

    /// Wire the production backends: ffmpeg as the engine, heif-convert for
    /// legacy stills, ffprobe for video dimensions.
    pub fn from_config(config: &Config, tools: &ToolRegistry, events: Arc<EventBus>) -> Self {
        let c = &config.conversion;

        let engine = FfmpegEngine::new(
            Arc::new(tools.clone()),
            Duration::from_secs(c.command_timeout_secs),
        );
        let engine = Arc::new(SharedEngine::with_events(engine, events));

        let normalizer: Arc<dyn LegacyImageNormalizer> =
            Arc::new(HeifConvertNormalizer::from_registry(tools));
        let video = FfprobeProber::from_registry(tools).map(|p| Arc::new(p) as Arc<dyn VideoProber>);
        if video.is_none() {
            tracing::warn!("ffprobe not found; video dimensions will be unknown");
        }

        Self::new(
            RasterBackend::new(normalizer.clone(), c.image_quality, c.normalize_quality),
            TranscodeBackend::new(engine, c.clone()),
            DimensionProbe::new(normalizer, video, c.probe_normalize_quality),
        )
    }

    /// Natural dimensions of a newly submitted file, if they can be read.
    pub async fn probe(&self, input: &InputFile) -> Option<Dimensions> {
        let category = mf_core::classify(&input.effective_mime_type());
        self.probe
            .probe(category, input.is_legacy_image(), &input.name, &input.bytes)
            .await
    }

    /// Run a job on the backend its category selects.
    pub async fn execute(
        &self,
        job: &ConversionJob,
        on_progress: &mut (dyn FnMut(u8) + Send),
        cancel: CancellationToken,
    ) -> mf_core::Result<ConvertedOutput> {
        match job.category {
            MediaCategory::Image => {
                debug!(item_id = %job.item_id, format = %job.output_format, "raster conversion");
                let req = RasterRequest {
                    output_format: job.output_format,
                    target_width: job.target_width,
                    target_height: job.target_height,
                    legacy: job.legacy,
                };
                self.raster.convert(&req, job.source.clone(), on_progress).await
            }
            MediaCategory::Video | MediaCategory::Audio => {
                debug!(item_id = %job.item_id, format = %job.output_format, "transcode conversion");
                let req = TranscodeRequest {
                    scope: job.item_id.short(),
                    source_name: job.source_name.clone(),
                    output_format: job.output_format,
                    target_width: job.target_width,
                    target_height: job.target_height,
                    original: job.original,
                };
                self.transcode
                    .convert(&req, &job.source, on_progress, Some(cancel))
                    .await
            }
            MediaCategory::Unknown => Err(mf_core::Error::unsupported(job.effective_mime.clone())),
        }
    }
}
