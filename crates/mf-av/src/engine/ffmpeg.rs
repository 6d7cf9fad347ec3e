//! [`TranscodeEngine`] backed by the `ffmpeg` CLI.
//!
//! Each command runs with the engine's [`ScratchFs`] as its working
//! directory, so the file names callers pass in `args` resolve inside the
//! private namespace. Progress comes from `-progress pipe:2`, which ffmpeg
//! interleaves with its normal log on stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ProgressFn, TranscodeEngine};
use crate::command::ToolCommand;
use crate::scratch::ScratchFs;
use crate::tools::ToolRegistry;

/// Arguments prepended to every command.
const BASE_ARGS: &[&str] = &["-hide_banner", "-nostdin", "-y", "-nostats", "-progress", "pipe:2"];

/// The ffmpeg-backed engine. Unusable until [`load`](TranscodeEngine::load).
pub struct FfmpegEngine {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
    ffmpeg: Option<PathBuf>,
    scratch: Option<ScratchFs>,
}

impl FfmpegEngine {
    pub fn new(tools: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            tools,
            timeout,
            ffmpeg: None,
            scratch: None,
        }
    }

    fn loaded(&self) -> mf_core::Result<(&PathBuf, &ScratchFs)> {
        match (&self.ffmpeg, &self.scratch) {
            (Some(ffmpeg), Some(scratch)) => Ok((ffmpeg, scratch)),
            _ => Err(mf_core::Error::EngineUnavailable("engine not loaded".into())),
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn load(&mut self) -> mf_core::Result<()> {
        let path = self
            .tools
            .require("ffmpeg")
            .map_err(|e| mf_core::Error::EngineUnavailable(e.to_string()))?
            .path
            .clone();

        let output = ToolCommand::new(path.clone())
            .args(["-hide_banner", "-version"])
            .timeout(Duration::from_secs(30))
            .execute()
            .await
            .map_err(|e| mf_core::Error::EngineUnavailable(e.to_string()))?;
        if let Some(version) = output.stdout.lines().next() {
            tracing::info!(path = %path.display(), "{version}");
        }

        self.scratch = Some(ScratchFs::new()?);
        self.ffmpeg = Some(path);
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> mf_core::Result<()> {
        let (_, scratch) = self.loaded()?;
        scratch.write_file(name, data).await
    }

    async fn exec(
        &mut self,
        args: &[String],
        progress: &mut ProgressFn<'_>,
        cancel: Option<CancellationToken>,
    ) -> mf_core::Result<()> {
        let (ffmpeg, scratch) = self.loaded()?;

        let mut cmd = ToolCommand::new(ffmpeg.clone());
        cmd.args(BASE_ARGS.iter().copied())
            .args(args.iter().cloned())
            .current_dir(scratch.root())
            .timeout(self.timeout);
        tracing::debug!(args = ?cmd.get_args(), "ffmpeg exec");

        let mut parser = ProgressParser::default();
        cmd.execute_with_stderr_callback(
            |line| {
                if let Some(fraction) = parser.feed(line) {
                    progress(fraction);
                }
            },
            cancel,
        )
        .await
        .map(|_| ())
        .map_err(|e| match e {
            mf_core::Error::Tool { message, .. } => mf_core::Error::CommandFailed(message),
            other => other,
        })
    }

    async fn read_file(&mut self, name: &str) -> mf_core::Result<Vec<u8>> {
        let (_, scratch) = self.loaded()?;
        scratch.read_file(name).await
    }

    async fn delete_file(&mut self, name: &str) -> mf_core::Result<()> {
        let (_, scratch) = self.loaded()?;
        scratch.delete_file(name).await
    }
}

// ---------------------------------------------------------------------------
// Progress parsing
// ---------------------------------------------------------------------------

/// Turns ffmpeg stderr lines into completion fractions.
///
/// The input duration comes from the first `Duration:` line of the input
/// dump; each `progress=` line closes a block and yields
/// `out_time_us / duration`. `progress=end` always yields 1.0.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_us: Option<i64>,
    out_time_us: Option<i64>,
}

impl ProgressParser {
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Duration:") {
            if self.duration_us.is_none() {
                let stamp = rest.split(',').next().unwrap_or_default();
                self.duration_us = parse_timestamp_us(stamp.trim());
            }
        } else if let Some(val) = line.strip_prefix("out_time_us=") {
            self.out_time_us = val.trim().parse::<i64>().ok();
        } else if let Some(state) = line.strip_prefix("progress=") {
            if state.trim() == "end" {
                return Some(1.0);
            }
            if let (Some(out), Some(dur)) = (self.out_time_us, self.duration_us) {
                if dur > 0 {
                    return Some((out as f64 / dur as f64).clamp(0.0, 1.0));
                }
            }
        }

        None
    }
}

/// Parse `HH:MM:SS[.frac]` into microseconds. `N/A` and junk give `None`.
fn parse_timestamp_us(stamp: &str) -> Option<i64> {
    let mut parts = stamp.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !(0.0..60.0).contains(&seconds) || minutes >= 60 || hours < 0 || minutes < 0 {
        return None;
    }
    Some((hours * 3600 + minutes * 60) * 1_000_000 + (seconds * 1_000_000.0).round() as i64)
}
