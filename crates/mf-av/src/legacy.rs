//! Normalisation of HEIC/HEIF stills into a format the raster decoder reads.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::command::ToolCommand;
use crate::scratch::ScratchFs;
use crate::tools::ToolRegistry;

/// Converts a legacy still image into a standard raster encoding.
#[async_trait]
pub trait LegacyImageNormalizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Re-encode `source` at `quality` (0–1). The result must be decodable
    /// by the `image` crate.
    async fn normalize(&self, source: &[u8], quality: f32) -> mf_core::Result<Bytes>;
}

/// Normaliser backed by libheif's `heif-convert`, producing JPEG.
#[derive(Debug, Clone)]
pub struct HeifConvertNormalizer {
    path: PathBuf,
    timeout: Duration,
}

impl HeifConvertNormalizer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            timeout: Duration::from_secs(120),
        }
    }

    /// Use the discovered binary, or the bare name so a missing tool
    /// surfaces as a spawn failure at conversion time.
    pub fn from_registry(tools: &ToolRegistry) -> Self {
        let path = tools
            .require("heif-convert")
            .map(|cfg| cfg.path.clone())
            .unwrap_or_else(|_| PathBuf::from("heif-convert"));
        Self::new(path)
    }
}

#[async_trait]
impl LegacyImageNormalizer for HeifConvertNormalizer {
    fn name(&self) -> &'static str {
        "heif-convert"
    }

    async fn normalize(&self, source: &[u8], quality: f32) -> mf_core::Result<Bytes> {
        let scratch = ScratchFs::new()?;
        scratch.write_file("source.heic", source).await?;

        let q = (quality.clamp(0.0, 1.0) * 100.0).round() as u32;
        ToolCommand::new(self.path.clone())
            .args(["-q".to_string(), q.to_string()])
            .args(["source.heic", "normalized.jpg"])
            .current_dir(scratch.root())
            .timeout(self.timeout)
            .execute()
            .await?;

        // Files holding several top-level images get numbered outputs.
        for name in ["normalized.jpg", "normalized-1.jpg"] {
            match scratch.read_file(name).await {
                Ok(bytes) => return Ok(Bytes::from(bytes)),
                Err(mf_core::Error::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(mf_core::Error::tool("heif-convert", "produced no output"))
    }
}
