//! # mf-av
//!
//! Conversion backends and external tool plumbing for mediaforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and heif-convert.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   stderr streaming and cancellation.
//! - **Transcode engine** ([`TranscodeEngine`], [`SharedEngine`],
//!   [`FfmpegEngine`]) -- one lazily loaded engine, serialised behind a lock,
//!   working inside a private [`ScratchFs`].
//! - **Backends** ([`TranscodeBackend`], [`RasterBackend`]) -- turn source
//!   bytes into a [`ConvertedOutput`].
//! - **Dimension probing** ([`DimensionProbe`]) and legacy still-image
//!   normalisation ([`LegacyImageNormalizer`]).

pub mod command;
pub mod engine;
pub mod legacy;
pub mod output;
pub mod probe;
pub mod raster;
pub mod scratch;
pub mod tools;
pub mod transcode;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use engine::{EngineGuard, FfmpegEngine, ProgressFn, ProgressParser, SharedEngine, TranscodeEngine};
pub use legacy::{HeifConvertNormalizer, LegacyImageNormalizer};
pub use output::ConvertedOutput;
pub use probe::{image_dimensions, DimensionProbe, FfprobeProber, VideoProber};
pub use raster::{RasterBackend, RasterRequest};
pub use scratch::ScratchFs;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcode::{build_transcode_args, TranscodeBackend, TranscodeRequest};
