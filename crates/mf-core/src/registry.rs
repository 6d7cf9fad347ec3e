//! Format registry and capability classifier.
//!
//! The registry is immutable process-wide data: it maps an effective MIME
//! type to the ordered list of formats that input may be converted to. The
//! first entry is the default target. An empty list means the input is
//! unsupported and must be rejected before it ever enters the queue.

use crate::media::{MediaCategory, OutputFormat};

use OutputFormat::*;

/// MIME type assigned to HEIC/HEIF stills when the platform omits one.
pub const LEGACY_IMAGE_MIME: &str = "image/heic";

const IMAGE_TARGETS: &[OutputFormat] = &[Jpg, Png, Webp, Gif, Avif, Bmp, Ico, Tiff];

/// `(effective MIME, allowed outputs)` in lookup order.
const REGISTRY: &[(&str, &[OutputFormat])] = &[
    // Video
    ("video/mp4", &[Mp4, Mp3, Webm, Avi, Mov, Gif]),
    ("video/webm", &[Webm, Mp4, Mp3, Avi, Mov, Gif]),
    ("video/quicktime", &[Mov, Mp4, Webm, Mp3, Avi, Gif]),
    ("video/x-msvideo", &[Avi, Mp4, Webm, Mp3, Mov, Gif]),
    // Audio
    ("audio/mpeg", &[Mp3, Wav, Ogg, Aac]),
    ("audio/wav", &[Wav, Mp3, Ogg, Aac]),
    ("audio/ogg", &[Ogg, Mp3, Wav, Aac]),
    ("audio/aac", &[Aac, Mp3, Wav, Ogg]),
    // Images
    ("image/png", IMAGE_TARGETS),
    ("image/jpeg", IMAGE_TARGETS),
    ("image/webp", IMAGE_TARGETS),
    ("image/gif", IMAGE_TARGETS),
    ("image/avif", IMAGE_TARGETS),
    ("image/bmp", IMAGE_TARGETS),
    ("image/x-icon", IMAGE_TARGETS),
    ("image/tiff", IMAGE_TARGETS),
    ("image/heic", IMAGE_TARGETS),
    ("image/heif", IMAGE_TARGETS),
];

/// Extension fallback used when a file carries no declared MIME type.
const EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("aac", "audio/aac"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    // Some platforms never label these, so both spellings land on one type.
    ("heic", LEGACY_IMAGE_MIME),
    ("heif", LEGACY_IMAGE_MIME),
];

/// Ordered legal outputs for an effective MIME type; empty if unsupported.
pub fn allowed_outputs(mime: &str) -> &'static [OutputFormat] {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == mime)
        .map(|(_, formats)| *formats)
        .unwrap_or(&[])
}

/// Default output for an effective MIME type (first allowed entry).
pub fn default_output(mime: &str) -> Option<OutputFormat> {
    allowed_outputs(mime).first().copied()
}

/// Every MIME type the registry knows about.
pub fn supported_mime_types() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(mime, _)| *mime)
}

/// Classify a MIME type by its top-level prefix.
pub fn classify(mime: &str) -> MediaCategory {
    if mime.starts_with("video/") {
        MediaCategory::Video
    } else if mime.starts_with("audio/") {
        MediaCategory::Audio
    } else if mime.starts_with("image/") {
        MediaCategory::Image
    } else {
        MediaCategory::Unknown
    }
}

/// Lower-cased text after the last `.` of a file name, if there is one.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || (stem.is_empty() && !name[1..].contains('.')) {
        // ".bashrc"-style names have no extension.
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type implied by a file extension.
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// The declared type when non-empty, otherwise one derived from the name.
///
/// Returns an empty string when neither source gives an answer; the
/// registry yields no outputs for it, so such files are rejected.
pub fn effective_mime_type(name: &str, declared: &str) -> String {
    let declared = declared.trim();
    if !declared.is_empty() {
        return declared.to_ascii_lowercase();
    }
    extension_of(name)
        .and_then(|ext| mime_from_extension(&ext))
        .unwrap_or_default()
        .to_string()
}

/// Whether the file is a HEIC/HEIF still that needs normalising before
/// the raster decoder can read it.
pub fn is_legacy_image(name: &str, declared: &str) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    if declared == "image/heic" || declared == "image/heif" {
        return true;
    }
    matches!(extension_of(name).as_deref(), Some("heic" | "heif"))
}

/// MIME type of a raster encode result.
pub fn raster_mime_type(format: OutputFormat) -> &'static str {
    match format {
        Jpg => "image/jpeg",
        Png => "image/png",
        Webp => "image/webp",
        Gif => "image/gif",
        Avif => "image/avif",
        Bmp => "image/bmp",
        Ico => "image/x-icon",
        Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// MIME type of a transcode result; unmapped targets fall back to a
/// generic binary type.
pub fn transcode_mime_type(format: OutputFormat) -> &'static str {
    match format {
        Mp3 => "audio/mpeg",
        Wav => "audio/wav",
        Ogg => "audio/ogg",
        Aac => "audio/aac",
        Mp4 => "video/mp4",
        Webm => "video/webm",
        Avi => "video/x-msvideo",
        Mov => "video/quicktime",
        Gif => "image/gif",
        _ => "application/octet-stream",
    }
}
