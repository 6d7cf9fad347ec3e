//! Media-domain enums for categories, output formats, and dimensions.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// MediaCategory
// ---------------------------------------------------------------------------

/// Broad classification of an input file, used to pick a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Video,
    Audio,
    Image,
    Unknown,
}

impl MediaCategory {
    /// Whether target width/height apply to this category.
    pub fn supports_dimensions(self) -> bool {
        matches!(self, Self::Video | Self::Image)
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Image => write!(f, "image"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Every format token a conversion can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    // Video containers
    Mp4,
    Webm,
    Avi,
    Mov,
    // Audio
    Mp3,
    Wav,
    Ogg,
    Aac,
    // Raster images
    Jpg,
    Png,
    Webp,
    Gif,
    Avif,
    Bmp,
    Ico,
    Tiff,
}

impl OutputFormat {
    /// All output formats, in declaration order.
    pub const ALL: &'static [OutputFormat] = &[
        Self::Mp4,
        Self::Webm,
        Self::Avi,
        Self::Mov,
        Self::Mp3,
        Self::Wav,
        Self::Ogg,
        Self::Aac,
        Self::Jpg,
        Self::Png,
        Self::Webp,
        Self::Gif,
        Self::Avif,
        Self::Bmp,
        Self::Ico,
        Self::Tiff,
    ];

    /// The token used as file extension and in user-facing lists.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Aac => "aac",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
            Self::Ico => "ico",
            Self::Tiff => "tiff",
        }
    }

    /// Whether the raster encoder for this format honours a quality setting.
    pub fn is_lossy_raster(self) -> bool {
        matches!(self, Self::Jpg | Self::Avif)
    }

    /// Whether this target drops the video stream entirely.
    pub fn is_audio(self) -> bool {
        matches!(self, Self::Mp3 | Self::Wav | Self::Ogg | Self::Aac)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let token = match lower.as_str() {
            "jpeg" => "jpg",
            "tif" => "tiff",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extension() == token)
            .ok_or_else(|| Error::Validation(format!("unknown output format '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// Natural pixel dimensions of a still image or video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `None` when either side is zero, which decoders report for
    /// streams they could open but not measure.
    pub fn non_zero(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
