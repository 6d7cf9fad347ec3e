//! A queued file and its conversion lifecycle.
//!
//! Status changes go through [`ConversionItem::transition`], which only
//! permits `pending -> converting`, `error -> converting`,
//! `converting -> converting` (progress), and
//! `converting -> complete | error`. Anything else is an
//! [`mf_core::Error::InvalidTransition`].

use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use mf_av::ConvertedOutput;
use mf_core::{allowed_outputs, Dimensions, DownloadId, ItemId, MediaCategory, OutputFormat};

use crate::input::InputFile;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ItemStatus {
    Pending,
    Converting {
        progress: u8,
    },
    Complete {
        output: ConvertedOutput,
        download: DownloadId,
    },
    Failed {
        error: String,
    },
}

/// Status without payload, for display and serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Converting,
    Complete,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Converting => write!(f, "converting"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::Converting { .. } => StatusKind::Converting,
            Self::Complete { .. } => StatusKind::Complete,
            Self::Failed { .. } => StatusKind::Error,
        }
    }

    /// Pending and failed items can be (re)converted and edited.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed { .. })
    }

    fn permits(&self, next: &ItemStatus) -> bool {
        use StatusKind::*;
        matches!(
            (self.kind(), next.kind()),
            (Pending, Converting)
                | (Error, Converting)
                | (Converting, Converting)
                | (Converting, Complete)
                | (Converting, Error)
        )
    }
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// A user edit to an item's conversion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEdit {
    OutputFormat(OutputFormat),
    /// `None` returns the side to automatic sizing.
    Width(Option<u32>),
    Height(Option<u32>),
    MaintainAspectRatio(bool),
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ConversionItem {
    pub id: ItemId,
    pub input: InputFile,
    pub effective_mime: String,
    pub category: MediaCategory,
    pub legacy: bool,
    pub output_format: OutputFormat,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub original: Option<Dimensions>,
    pub maintain_aspect_ratio: bool,
    status: ItemStatus,
    attempt: u64,
    cancel: Option<CancellationToken>,
}

impl ConversionItem {
    /// Build an item for an accepted file. Returns `None` when the
    /// registry has no outputs for its effective type.
    pub fn accept(input: InputFile, original: Option<Dimensions>) -> Option<Self> {
        let effective_mime = input.effective_mime_type();
        let output_format = *allowed_outputs(&effective_mime).first()?;
        Some(Self {
            id: ItemId::new(),
            category: mf_core::classify(&effective_mime),
            legacy: input.is_legacy_image(),
            input,
            effective_mime,
            output_format,
            target_width: None,
            target_height: None,
            original,
            maintain_aspect_ratio: true,
            status: ItemStatus::Pending,
            attempt: 0,
            cancel: None,
        })
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    /// Number of conversion attempts started so far.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn allowed_outputs(&self) -> &'static [OutputFormat] {
        allowed_outputs(&self.effective_mime)
    }

    pub fn download_id(&self) -> Option<DownloadId> {
        match self.status {
            ItemStatus::Complete { download, .. } => Some(download),
            _ => None,
        }
    }

    /// `<text before the first '.'>.<format>`, with `output` standing in
    /// for an empty prefix.
    pub fn download_name(&self) -> String {
        let stem = self.input.name.split('.').next().unwrap_or_default();
        let stem = if stem.is_empty() { "output" } else { stem };
        format!("{stem}.{}", self.output_format.extension())
    }

    fn transition(&mut self, next: ItemStatus) -> mf_core::Result<()> {
        if !self.status.permits(&next) {
            return Err(mf_core::Error::invalid_transition(
                self.status.kind(),
                next.kind(),
            ));
        }
        self.status = next;
        Ok(())
    }

    /// Enter `converting` for a new attempt. Returns the attempt number and
    /// the token that aborts it.
    pub(crate) fn begin(&mut self) -> mf_core::Result<(u64, CancellationToken)> {
        if !self.status.is_open() {
            return Err(mf_core::Error::invalid_transition(
                self.status.kind(),
                StatusKind::Converting,
            ));
        }
        self.transition(ItemStatus::Converting { progress: 0 })?;
        self.attempt += 1;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        Ok((self.attempt, token))
    }

    pub(crate) fn set_progress(&mut self, progress: u8) -> mf_core::Result<()> {
        self.transition(ItemStatus::Converting {
            progress: progress.min(100),
        })
    }

    pub(crate) fn complete(&mut self, output: ConvertedOutput, download: DownloadId) -> mf_core::Result<()> {
        self.transition(ItemStatus::Complete { output, download })?;
        self.cancel = None;
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: String) -> mf_core::Result<()> {
        self.transition(ItemStatus::Failed { error })?;
        self.cancel = None;
        Ok(())
    }

    /// Abort an in-flight attempt, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Apply a settings edit. Only open (pending or failed) items accept
    /// edits.
    pub(crate) fn apply_edit(&mut self, edit: ItemEdit) -> mf_core::Result<()> {
        if !self.status.is_open() {
            return Err(mf_core::Error::Validation(format!(
                "item {} cannot be edited while {}",
                self.id,
                self.status.kind()
            )));
        }

        match edit {
            ItemEdit::OutputFormat(format) => {
                if !self.allowed_outputs().contains(&format) {
                    return Err(mf_core::Error::Validation(format!(
                        "{format} is not a valid output for {}",
                        self.effective_mime
                    )));
                }
                self.output_format = format;
            }
            ItemEdit::Width(value) => {
                let value = positive(value, "width")?;
                self.target_width = value;
                if let (Some(w), Some(ratio)) = (value, self.locked_ratio()) {
                    self.target_height = Some(scaled(w as f64 / ratio));
                }
            }
            ItemEdit::Height(value) => {
                let value = positive(value, "height")?;
                self.target_height = value;
                if let (Some(h), Some(ratio)) = (value, self.locked_ratio()) {
                    self.target_width = Some(scaled(h as f64 * ratio));
                }
            }
            ItemEdit::MaintainAspectRatio(on) => self.maintain_aspect_ratio = on,
        }
        Ok(())
    }

    /// Width / height of the original, when the lock is on and it is known.
    fn locked_ratio(&self) -> Option<f64> {
        if !self.maintain_aspect_ratio {
            return None;
        }
        let original = self.original?;
        (original.width > 0 && original.height > 0)
            .then(|| original.width as f64 / original.height as f64)
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        let (progress, error, output_size) = match &self.status {
            ItemStatus::Pending => (None, None, None),
            ItemStatus::Converting { progress } => (Some(*progress), None, None),
            ItemStatus::Complete { output, .. } => (Some(100), None, Some(output.len())),
            ItemStatus::Failed { error } => (None, Some(error.clone()), None),
        };
        ItemSnapshot {
            id: self.id,
            name: self.input.name.clone(),
            size: self.input.len(),
            declared_mime: self.input.declared_mime.clone(),
            effective_mime: self.effective_mime.clone(),
            category: self.category,
            legacy: self.legacy,
            output_format: self.output_format,
            allowed_outputs: self.allowed_outputs().to_vec(),
            target_width: self.target_width,
            target_height: self.target_height,
            original: self.original,
            maintain_aspect_ratio: self.maintain_aspect_ratio,
            status: self.status.kind(),
            progress,
            error,
            output_size,
            download: self.download_id(),
        }
    }
}

fn positive(value: Option<u32>, side: &str) -> mf_core::Result<Option<u32>> {
    match value {
        Some(0) => Err(mf_core::Error::Validation(format!("{side} must be positive"))),
        other => Ok(other),
    }
}

fn scaled(v: f64) -> u32 {
    (v.round() as u32).max(1)
}

/// Read-only view of an item for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub name: String,
    pub size: usize,
    pub declared_mime: String,
    pub effective_mime: String,
    pub category: MediaCategory,
    pub legacy: bool,
    pub output_format: OutputFormat,
    pub allowed_outputs: Vec<OutputFormat>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub original: Option<Dimensions>,
    pub maintain_aspect_ratio: bool,
    pub status: StatusKind,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub output_size: Option<usize>,
    pub download: Option<DownloadId>,
}
