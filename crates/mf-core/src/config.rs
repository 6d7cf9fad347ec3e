//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for tools, conversion tuning and events. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
    pub events: EventsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration strictly: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let c = &self.conversion;

        for (name, q) in [
            ("image_quality", c.image_quality),
            ("probe_normalize_quality", c.probe_normalize_quality),
            ("normalize_quality", c.normalize_quality),
        ] {
            if !(q > 0.0 && q <= 1.0) {
                warnings.push(format!("conversion.{name} {q} is outside (0, 1]"));
            }
        }

        if c.gif_default_width == 0 {
            warnings.push("conversion.gif_default_width is 0".into());
        }
        if c.gif_fps == 0 {
            warnings.push("conversion.gif_fps is 0".into());
        }
        if c.command_timeout_secs == 0 {
            warnings.push("conversion.command_timeout_secs is 0; every command will time out".into());
        }
        if c.audio_bitrate.trim().is_empty() {
            warnings.push("conversion.audio_bitrate is empty".into());
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
            ("heif_convert_path", &self.tools.heif_convert_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        if self.events.capacity == 0 {
            warnings.push("events.capacity is 0".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Override paths for external tools. Unset tools are looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub heif_convert_path: Option<PathBuf>,
}

/// Conversion tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Quality for lossy raster encoders, on a 0–1 scale.
    pub image_quality: f32,
    /// HEIC normalisation quality used only while probing dimensions.
    pub probe_normalize_quality: f32,
    /// HEIC normalisation quality used before the final encode.
    pub normalize_quality: f32,
    /// GIF width when the item has no target width.
    pub gif_default_width: u32,
    pub gif_fps: u32,
    /// Bitrate for AAC targets (e.g. "192k").
    pub audio_bitrate: String,
    /// Upper bound on a single ffmpeg invocation.
    pub command_timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            image_quality: 0.92,
            probe_normalize_quality: 0.5,
            normalize_quality: 0.95,
            gif_default_width: 480,
            gif_fps: 10,
            audio_bitrate: "192k".into(),
            command_timeout_secs: 86_400,
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel buffer size.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}
