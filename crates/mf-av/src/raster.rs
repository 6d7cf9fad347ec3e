//! Raster backend for still images.
//!
//! Decode, resize and encode run on the blocking pool. Progress is
//! reported at real stage boundaries: 25 after legacy normalisation,
//! 50 after decode, 75 after resize, 100 after encode.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use mf_core::registry::raster_mime_type;
use mf_core::OutputFormat;

use crate::legacy::LegacyImageNormalizer;
use crate::output::ConvertedOutput;

/// AVIF encoder speed (1 slowest .. 10 fastest).
const AVIF_SPEED: u8 = 8;

/// Largest RGBA bitmap a resize may allocate. Matches the decoder's
/// default `image::Limits::max_alloc`.
const MAX_TARGET_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterRequest {
    pub output_format: OutputFormat,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// Source is a HEIC/HEIF still and must be normalised first.
    pub legacy: bool,
}

pub struct RasterBackend {
    normalizer: Arc<dyn LegacyImageNormalizer>,
    quality: f32,
    normalize_quality: f32,
}

impl RasterBackend {
    pub fn new(normalizer: Arc<dyn LegacyImageNormalizer>, quality: f32, normalize_quality: f32) -> Self {
        Self {
            normalizer,
            quality,
            normalize_quality,
        }
    }

    pub async fn convert(
        &self,
        req: &RasterRequest,
        source: Bytes,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> mf_core::Result<ConvertedOutput> {
        let source = if req.legacy {
            let normalized = self
                .normalizer
                .normalize(&source, self.normalize_quality)
                .await
                .map_err(|e| mf_core::Error::Decode(e.to_string()))?;
            on_progress(25);
            normalized
        } else {
            source
        };

        let decoded = blocking(move || {
            image::load_from_memory(&source).map_err(|e| mf_core::Error::Decode(e.to_string()))
        })
        .await?;
        on_progress(50);

        let width = req.target_width.unwrap_or(decoded.width());
        let height = req.target_height.unwrap_or(decoded.height());
        let resized = if (width, height) == (decoded.width(), decoded.height()) {
            decoded
        } else {
            check_target_size(width, height)?;
            blocking(move || Ok(decoded.resize_exact(width, height, FilterType::Lanczos3))).await?
        };
        on_progress(75);

        let format = req.output_format;
        let quality = self.quality;
        let bytes = blocking(move || encode(&resized, format, quality)).await?;
        on_progress(100);

        Ok(ConvertedOutput::new(bytes, raster_mime_type(format)))
    }
}

/// Reject targets whose bitmap would exceed [`MAX_TARGET_BYTES`]; a failed
/// allocation of that size aborts the process instead of returning an error.
fn check_target_size(width: u32, height: u32) -> mf_core::Result<()> {
    let bytes = u64::from(width) * u64::from(height) * 4;
    if bytes > MAX_TARGET_BYTES {
        return Err(mf_core::Error::Encode(format!(
            "target dimensions too large: {width}x{height}"
        )));
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> mf_core::Result<T>
where
    F: FnOnce() -> mf_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| mf_core::Error::Internal(format!("raster task panicked: {e}")))?
}

/// Encode `img` as `format`. Lossy formats use `quality` (0–1); the
/// others ignore it.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: f32) -> mf_core::Result<Vec<u8>> {
    let q = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
    let mut buf = Cursor::new(Vec::new());

    let result = match format {
        // JPEG has no alpha channel.
        OutputFormat::Jpg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, q)),
        OutputFormat::Avif => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, q)),
        OutputFormat::Png => img.write_to(&mut buf, ImageFormat::Png),
        OutputFormat::Webp => rgba(img).write_to(&mut buf, ImageFormat::WebP),
        OutputFormat::Gif => rgba(img).write_to(&mut buf, ImageFormat::Gif),
        OutputFormat::Bmp => rgba(img).write_to(&mut buf, ImageFormat::Bmp),
        OutputFormat::Ico => rgba(img).write_to(&mut buf, ImageFormat::Ico),
        OutputFormat::Tiff => rgba(img).write_to(&mut buf, ImageFormat::Tiff),
        other => {
            return Err(mf_core::Error::Encode(format!(
                "{other} is not a raster format"
            )))
        }
    };
    result.map_err(|e| mf_core::Error::Encode(e.to_string()))?;

    let bytes = buf.into_inner();
    if bytes.is_empty() {
        return Err(mf_core::Error::Encode("encoder produced no output".into()));
    }
    Ok(bytes)
}

/// 8-bit RGBA, which every lossless encoder here accepts.
fn rgba(img: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageRgba8(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Bytes {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    struct StubNormalizer(mf_core::Result<Bytes>);

    #[async_trait]
    impl LegacyImageNormalizer for StubNormalizer {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn normalize(&self, _: &[u8], _: f32) -> mf_core::Result<Bytes> {
            match &self.0 {
                Ok(b) => Ok(b.clone()),
                Err(e) => Err(mf_core::Error::tool("stub", e.to_string())),
            }
        }
    }

    fn backend() -> RasterBackend {
        RasterBackend::new(Arc::new(StubNormalizer(Ok(png(10, 10)))), 0.92, 0.95)
    }

    fn request(format: OutputFormat) -> RasterRequest {
        RasterRequest {
            output_format: format,
            target_width: None,
            target_height: None,
            legacy: false,
        }
    }

    #[tokio::test]
    async fn converts_and_resizes_independently() {
        let mut req = request(OutputFormat::Jpg);
        req.target_width = Some(32);

        let mut stages = Vec::new();
        let out = backend()
            .convert(&req, png(64, 48), &mut |p: u8| stages.push(p))
            .await
            .unwrap();

        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(stages, vec![50, 75, 100]);
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        // Height is not corrected for aspect here.
        assert_eq!((decoded.width(), decoded.height()), (32, 48));
    }

    #[tokio::test]
    async fn every_raster_target_encodes() {
        for format in [
            OutputFormat::Jpg,
            OutputFormat::Png,
            OutputFormat::Webp,
            OutputFormat::Gif,
            OutputFormat::Bmp,
            OutputFormat::Ico,
            OutputFormat::Tiff,
        ] {
            let out = backend()
                .convert(&request(format), png(16, 16), &mut |_: u8| {})
                .await
                .unwrap_or_else(|e| panic!("{format}: {e}"));
            assert!(!out.is_empty(), "{format}");
            assert_eq!(out.mime_type, raster_mime_type(format));
        }
    }

    #[tokio::test]
    async fn legacy_source_goes_through_normaliser() {
        let mut req = request(OutputFormat::Png);
        req.legacy = true;

        let mut stages = Vec::new();
        let out = backend()
            .convert(&req, Bytes::from_static(b"ftypheic"), &mut |p: u8| stages.push(p))
            .await
            .unwrap();

        assert_eq!(stages, vec![25, 50, 75, 100]);
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.width(), 10);
    }

    #[tokio::test]
    async fn undecodable_input_fails_to_load() {
        let err = backend()
            .convert(&request(OutputFormat::Png), Bytes::from_static(b"nope"), &mut |_: u8| {})
            .await
            .unwrap_err();
        assert!(matches!(err, mf_core::Error::Decode(_)));
        assert_eq!(err.to_string(), "failed to load image");
    }

    #[tokio::test]
    async fn normaliser_failure_fails_to_load() {
        let backend = RasterBackend::new(
            Arc::new(StubNormalizer(Err(mf_core::Error::Internal("bad heif".into())))),
            0.92,
            0.95,
        );
        let mut req = request(OutputFormat::Jpg);
        req.legacy = true;
        let err = backend
            .convert(&req, Bytes::from_static(b"ftypheic"), &mut |_: u8| {})
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to load image");
    }

    #[tokio::test]
    async fn oversized_icon_fails_to_convert() {
        let mut req = request(OutputFormat::Ico);
        req.target_width = Some(300);
        req.target_height = Some(300);
        let err = backend()
            .convert(&req, png(8, 8), &mut |_: u8| {})
            .await
            .unwrap_err();
        assert!(matches!(err, mf_core::Error::Encode(_)));
        assert_eq!(err.to_string(), "failed to convert image");
    }

    #[tokio::test]
    async fn huge_target_fails_to_convert_without_allocating() {
        let mut req = request(OutputFormat::Png);
        req.target_width = Some(100_000);
        req.target_height = Some(100_000);

        let mut stages = Vec::new();
        let err = backend()
            .convert(&req, png(4, 4), &mut |p: u8| stages.push(p))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to convert image");
        assert_eq!(err.detail(), Some("target dimensions too large: 100000x100000"));
        assert_eq!(stages, vec![50]);
    }

    #[test]
    fn target_size_cap_allows_large_but_sane_bitmaps() {
        assert!(check_target_size(8192, 8192).is_ok());
        assert!(check_target_size(u32::MAX, 1).is_err());
    }

    #[test]
    fn transcode_formats_are_not_raster_targets() {
        let img = DynamicImage::new_rgb8(2, 2);
        assert!(matches!(
            encode(&img, OutputFormat::Mp4, 0.9),
            Err(mf_core::Error::Encode(_))
        ));
    }
}
