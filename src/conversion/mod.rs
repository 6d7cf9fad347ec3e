//! Conversion queue and state machine.
//!
//! This module handles the lifecycle of submitted files:
//!
//! - Item state machine (`pending -> converting -> complete | error`, with
//!   retry from `error`)
//! - Settings edits, including the aspect-ratio lock
//! - Backend routing (raster for images, the shared transcode engine for
//!   audio and video)
//! - Strictly sequential "convert all" and per-item retry
//! - Download handles that are released on removal and reset

mod executor;
mod item;
mod manager;

pub use executor::{ConversionExecutor, ConversionJob};
pub use item::{ConversionItem, ItemEdit, ItemSnapshot, ItemStatus, StatusKind};
pub use manager::{ConversionOutcome, ConversionQueue, ConvertAllSummary};
