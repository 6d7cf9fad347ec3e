//! One-shot dimension probing at submission time.
//!
//! Images are measured from their headers with the `image` crate (after
//! normalisation for legacy stills); video goes through a [`VideoProber`].
//! Nothing here ever fails: an unmeasurable file simply has no dimensions.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use mf_core::registry::extension_of;
use mf_core::{Dimensions, MediaCategory};

use crate::command::ToolCommand;
use crate::legacy::LegacyImageNormalizer;
use crate::scratch::ScratchFs;
use crate::tools::ToolRegistry;

/// Reads the natural size of a video's first video stream.
#[async_trait]
pub trait VideoProber: Send + Sync {
    fn name(&self) -> &'static str;

    /// `name` is the original file name; only its extension is used.
    async fn dimensions(&self, name: &str, source: &[u8]) -> mf_core::Result<Option<Dimensions>>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_registry(tools: &ToolRegistry) -> Option<Self> {
        tools.require("ffprobe").ok().map(|cfg| Self::new(cfg.path.clone()))
    }
}

#[async_trait]
impl VideoProber for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn dimensions(&self, name: &str, source: &[u8]) -> mf_core::Result<Option<Dimensions>> {
        let scratch = ScratchFs::new()?;
        let file = format!("probe.{}", extension_of(name).unwrap_or_else(|| "bin".into()));
        scratch.write_file(&file, source).await?;

        let output = ToolCommand::new(self.ffprobe_path.clone())
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height",
                "-of", "json",
            ])
            .arg(file)
            .current_dir(scratch.root())
            .timeout(self.timeout)
            .execute()
            .await?;

        parse_ffprobe_dimensions(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_ffprobe_dimensions(json: &str) -> mf_core::Result<Option<Dimensions>> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| mf_core::Error::tool("ffprobe", format!("JSON parse error: {e}")))?;
    Ok(parsed
        .streams
        .first()
        .and_then(|s| Dimensions::non_zero(s.width?, s.height?)))
}

/// Natural size of an encoded still, read from its header.
pub fn image_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let (w, h) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    Dimensions::non_zero(w, h)
}

/// Dimension probe used when files are added to the queue.
pub struct DimensionProbe {
    normalizer: Arc<dyn LegacyImageNormalizer>,
    video: Option<Arc<dyn VideoProber>>,
    normalize_quality: f32,
}

impl DimensionProbe {
    /// `normalize_quality` applies to the throwaway legacy-image conversion
    /// and can be far lower than the one used for final output.
    pub fn new(
        normalizer: Arc<dyn LegacyImageNormalizer>,
        video: Option<Arc<dyn VideoProber>>,
        normalize_quality: f32,
    ) -> Self {
        Self {
            normalizer,
            video,
            normalize_quality,
        }
    }

    pub async fn probe(
        &self,
        category: MediaCategory,
        legacy: bool,
        name: &str,
        bytes: &[u8],
    ) -> Option<Dimensions> {
        match category {
            MediaCategory::Image if legacy => {
                match self.normalizer.normalize(bytes, self.normalize_quality).await {
                    Ok(normalized) => image_dimensions(&normalized),
                    Err(e) => {
                        tracing::debug!(file = name, error = %e, "legacy image normalisation failed while probing");
                        None
                    }
                }
            }
            MediaCategory::Image => image_dimensions(bytes),
            MediaCategory::Video => {
                let prober = self.video.as_ref()?;
                match prober.dimensions(name, bytes).await {
                    Ok(dims) => dims,
                    Err(e) => {
                        tracing::debug!(file = name, prober = prober.name(), error = %e, "video probe failed");
                        None
                    }
                }
            }
            MediaCategory::Audio | MediaCategory::Unknown => None,
        }
    }
}
