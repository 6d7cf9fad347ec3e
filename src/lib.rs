//! Mediaforge - local media conversion queue
//!
//! This library crate exposes the queue for the CLI and for integration
//! testing.

pub mod conversion;
pub mod downloads;
pub mod input;

pub use conversion::{ConversionQueue, ConvertAllSummary, ItemEdit, ItemSnapshot, StatusKind};
pub use downloads::{Download, DownloadStore};
pub use input::InputFile;
