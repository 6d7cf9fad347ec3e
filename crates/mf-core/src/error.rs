//! Unified error type for mediaforge.
//!
//! All crates funnel their failures into [`Error`]. When a conversion fails,
//! the queue stores the error's `Display` output as the item's error detail,
//! so the messages here are user-facing.

use std::fmt;

/// Unified error type covering all failure modes in mediaforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The effective MIME type has no format registry entry.
    #[error("unsupported media type: {mime}")]
    Unsupported {
        /// The effective MIME type that was rejected (may be empty).
        mime: String,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "item", "download").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A state change that the item lifecycle does not permit.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the item was in.
        from: String,
        /// State that was requested.
        to: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, heif-convert, etc.) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The transcode engine could not be initialised.
    #[error("conversion engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Raster decode failed.
    #[error("failed to load image")]
    Decode(String),

    /// Raster encode failed.
    #[error("failed to convert image")]
    Encode(String),

    /// The transcode engine rejected or failed a command. The payload is the
    /// engine's own diagnostic, passed through unparsed.
    #[error("{0}")]
    CommandFailed(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Unsupported`].
    pub fn unsupported(mime: impl Into<String>) -> Self {
        Error::Unsupported { mime: mime.into() }
    }

    /// Convenience constructor for [`Error::InvalidTransition`].
    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Underlying diagnostic for decode/encode failures, which `Display`
    /// deliberately hides behind a short stage message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Decode(d) | Error::Encode(d) => Some(d),
            _ => None,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
