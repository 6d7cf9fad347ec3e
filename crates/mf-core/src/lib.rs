//! mf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other mediaforge crates,
//! providing type-safe identifiers, a unified error type, media-domain enums,
//! the format registry and capability classifier, application configuration,
//! and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;
pub mod registry;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
pub use registry::{allowed_outputs, classify, effective_mime_type, is_legacy_image};
