//! Error taxonomy for install-source acquisition.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by location resolution, transports, distro matching and
/// extraction. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unauthorized input, detected before any I/O.
    #[error("invalid install location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    /// The location could not be mounted or connected to.
    #[error("install location '{location}' is unavailable")]
    LocationUnavailable {
        location: String,
        #[source]
        source: anyhow::Error,
    },

    /// A file could not be read or the transfer was interrupted.
    #[error("failed to fetch '{path}'")]
    FetchFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// No distribution signature matched the content of the location.
    #[error("could not find an installable distribution at '{location}'")]
    UnrecognizedDistribution { location: String },

    /// A distribution matched but a file its layout promises is missing.
    #[error("{family} tree at '{location}' is missing expected file '{path}'")]
    ExtractionInconsistent {
        family: String,
        location: String,
        path: String,
    },

    /// The matched family cannot provide the requested artifact.
    #[error("{family} does not support {operation}")]
    Unsupported { family: String, operation: String },

    /// A fetched file does not match the digest announced by the tree.
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// The caller cancelled the acquisition.
    #[error("acquisition cancelled")]
    Cancelled,

    /// The acquisition exceeded the caller's deadline.
    #[error("acquisition timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O outside of a transfer (scratch dir, temp files).
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn invalid_location(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidLocation {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(location: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::LocationUnavailable {
            location: location.into(),
            source: source.into(),
        }
    }

    pub(crate) fn fetch_failed(path: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::FetchFailed {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidLocation { .. } => "invalid-location",
            Error::LocationUnavailable { .. } => "location-unavailable",
            Error::FetchFailed { .. } => "fetch-failed",
            Error::UnrecognizedDistribution { .. } => "unrecognized-distribution",
            Error::ExtractionInconsistent { .. } => "extraction-inconsistent",
            Error::Unsupported { .. } => "unsupported",
            Error::ChecksumMismatch { .. } => "checksum-mismatch",
            Error::Cancelled => "cancelled",
            Error::TimedOut(_) => "timed-out",
            Error::Config(_) => "config",
            Error::Io { .. } => "io",
        }
    }
}
