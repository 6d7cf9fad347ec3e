//! Transcode backend for audio and video items.
//!
//! [`build_transcode_args`] turns a [`TranscodeRequest`] into an ffmpeg
//! argument list; [`TranscodeBackend`] runs it on the shared engine with
//! item-scoped file names and always cleans those files up afterwards.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mf_core::config::ConversionConfig;
use mf_core::registry::{extension_of, transcode_mime_type};
use mf_core::{Dimensions, OutputFormat};

use crate::engine::{ProgressFn, SharedEngine, TranscodeEngine};
use crate::output::ConvertedOutput;

/// Everything the command builder needs to know about one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    /// Unique per item; keeps engine file names from colliding.
    pub scope: String,
    /// Original file name, used for the input extension.
    pub source_name: String,
    pub output_format: OutputFormat,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// Natural dimensions captured at submission, if known.
    pub original: Option<Dimensions>,
}

impl TranscodeRequest {
    /// `input_<scope>.<source extension>`
    pub fn input_name(&self) -> String {
        let ext = extension_of(&self.source_name).unwrap_or_else(|| "bin".to_string());
        format!("input_{}.{ext}", self.scope)
    }

    /// `output_<scope>.<format>`
    pub fn output_name(&self) -> String {
        format!("output_{}.{}", self.scope, self.output_format.extension())
    }

    /// Scale filter for container targets, or `None` when the targets are
    /// unset or match the original size.
    fn scale_filter(&self) -> Option<String> {
        if self.target_width.is_none() && self.target_height.is_none() {
            return None;
        }
        if let Some(original) = self.original {
            let width_changes = self.target_width.is_some_and(|w| w != original.width);
            let height_changes = self.target_height.is_some_and(|h| h != original.height);
            if !width_changes && !height_changes {
                return None;
            }
        }
        let side = |v: Option<u32>| v.map_or_else(|| "-2".to_string(), |v| v.to_string());
        Some(format!(
            "scale={}:{}",
            side(self.target_width),
            side(self.target_height)
        ))
    }
}

/// Build the engine argument list for a request.
///
/// # Errors
///
/// [`mf_core::Error::Validation`] when the output format is a still-image
/// target other than GIF, which this backend does not produce.
pub fn build_transcode_args(
    req: &TranscodeRequest,
    settings: &ConversionConfig,
) -> mf_core::Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-i".into(), req.input_name()];

    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    match req.output_format {
        OutputFormat::Mp3 => push(&["-vn", "-acodec", "libmp3lame", "-q:a", "2"]),
        OutputFormat::Wav => push(&["-vn", "-acodec", "pcm_s16le"]),
        OutputFormat::Ogg => push(&["-vn", "-acodec", "libvorbis", "-q:a", "4"]),
        OutputFormat::Aac => push(&["-vn", "-c:a", "aac", "-b:a", settings.audio_bitrate.as_str()]),
        OutputFormat::Webm | OutputFormat::Mp4 | OutputFormat::Mov | OutputFormat::Avi => {
            if let Some(filter) = req.scale_filter() {
                push(&["-vf", filter.as_str()]);
            }
            let (video, audio) = match req.output_format {
                OutputFormat::Webm => ("libvpx", "libvorbis"),
                OutputFormat::Avi => ("mpeg4", "libmp3lame"),
                _ => ("libx264", "aac"),
            };
            push(&["-c:v", video, "-c:a", audio]);
        }
        OutputFormat::Gif => {
            let width = req.target_width.unwrap_or(settings.gif_default_width);
            let filter = format!(
                "fps={},scale={width}:-1:flags=lanczos",
                settings.gif_fps
            );
            push(&["-vf", filter.as_str(), "-loop", "0"]);
        }
        other => {
            return Err(mf_core::Error::Validation(format!(
                "{other} is not a transcode target"
            )))
        }
    }

    args.push(req.output_name());
    Ok(args)
}

/// Audio/video backend over the process-wide engine.
pub struct TranscodeBackend {
    engine: Arc<SharedEngine>,
    settings: ConversionConfig,
}

impl TranscodeBackend {
    pub fn new(engine: Arc<SharedEngine>, settings: ConversionConfig) -> Self {
        Self { engine, settings }
    }

    /// Convert `source` as described by `req`.
    ///
    /// `on_progress` receives whole percentages, each value at most once.
    /// Holding the engine guard for the whole call keeps commands from
    /// overlapping.
    pub async fn convert(
        &self,
        req: &TranscodeRequest,
        source: &[u8],
        on_progress: &mut (dyn FnMut(u8) + Send),
        cancel: Option<CancellationToken>,
    ) -> mf_core::Result<ConvertedOutput> {
        let args = build_transcode_args(req, &self.settings)?;
        let input = req.input_name();
        let output = req.output_name();

        let mut engine = self.engine.acquire().await?;
        tracing::debug!(scope = %req.scope, ?args, "transcode command");

        let mut last = None;
        let mut forward = |fraction: f64| {
            let pct = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
            if last != Some(pct) {
                last = Some(pct);
                on_progress(pct);
            }
        };

        let result = run(&mut *engine, &input, &output, source, &args, &mut forward, cancel).await;

        for name in [&input, &output] {
            if let Err(e) = engine.delete_file(name).await {
                tracing::warn!(file = %name, error = %e, "failed to delete engine file");
            }
        }

        let bytes = result?;
        Ok(ConvertedOutput::new(
            bytes,
            transcode_mime_type(req.output_format),
        ))
    }
}

async fn run(
    engine: &mut dyn TranscodeEngine,
    input: &str,
    output: &str,
    source: &[u8],
    args: &[String],
    progress: &mut ProgressFn<'_>,
    cancel: Option<CancellationToken>,
) -> mf_core::Result<Vec<u8>> {
    engine.write_file(input, source).await?;
    engine.exec(args, progress, cancel).await?;
    engine.read_file(output).await
}
