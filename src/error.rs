//! Error types for the edgequake-html2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TranscodeError`] is **fatal**: the run cannot proceed (engine
//!   unreachable, credentials rejected, output directory not writable, the
//!   engine aborted). Returned as `Err(TranscodeError)` from every session
//!   operation and from the top-level `convert*` functions.
//!
//! * [`ResourceError`] is **non-fatal**: a single referenced resource could not
//!   be supplied (absent from both search directories, rejected by path
//!   confinement, unreadable). It never escapes the resolver boundary: the
//!   engine is told the resource is missing and the conversion continues.
//!   The error is recorded in [`crate::output::ResourceRecord`] so callers can
//!   still see what went wrong.

use crate::session::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-html2pdf library.
#[derive(Debug, Error)]
pub enum TranscodeError {
    // ── Connection errors ─────────────────────────────────────────────────
    /// The endpoint string could not be parsed.
    #[error("Invalid engine endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// TCP connect failed, timed out, or the handshake was cut short.
    #[error("Connection to '{endpoint}' failed: {reason}\nCheck the server address and your network.")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The engine refused the supplied credentials.
    #[error("Engine at '{endpoint}' rejected the credentials for user '{user}'")]
    AuthenticationFailed { endpoint: String, user: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output destination (or its directory) is not writable.
    #[error("Permission denied writing '{path}'\nChoose another output path or fix the directory permissions.")]
    PermissionDenied { path: PathBuf },

    /// Creating, writing or committing the output file failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The receiving end of a channel output went away mid-run.
    #[error("Output channel closed by the receiver")]
    OutputClosed,

    // ── Input errors ──────────────────────────────────────────────────────
    /// The source document could not be read.
    #[error("Failed to read document '{path}': {source}")]
    DocumentReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The engine aborted the run.
    #[error("Engine error {code:#06x}: {message}")]
    Engine { code: u16, message: String },

    /// The engine sent something this client does not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A read or write on an established connection exceeded the I/O timeout.
    #[error("Timed out after {secs}s while {operation}\nIncrease --io-timeout.")]
    Timeout { operation: &'static str, secs: u64 },

    /// The connection broke during a run.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    // ── Usage errors ──────────────────────────────────────────────────────
    /// An operation was called in a state that does not allow it.
    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranscodeError {
    /// True for failures that happen before any transcoding was attempted.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            TranscodeError::InvalidEndpoint { .. }
                | TranscodeError::ConnectionFailed { .. }
                | TranscodeError::AuthenticationFailed { .. }
        )
    }

    /// True when the output destination could not be written because of
    /// filesystem permissions.
    pub fn is_permission_error(&self) -> bool {
        match self {
            TranscodeError::PermissionDenied { .. } => true,
            TranscodeError::OutputWriteFailed { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Map an I/O error raised while preparing or writing the output file.
    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            TranscodeError::PermissionDenied { path }
        } else {
            TranscodeError::OutputWriteFailed { path, source }
        }
    }
}

/// A non-fatal error for a single referenced resource.
///
/// The engine only ever sees "missing"; this type keeps the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ResourceError {
    /// Not present in the primary directory nor in the fallback directory.
    #[error("Resource '{uri}' not found")]
    NotFound { uri: String },

    /// The URI would resolve outside the configured search directories.
    #[error("Resource '{uri}' rejected: {reason}")]
    Rejected { uri: String, reason: String },

    /// The file exists but reading it failed.
    #[error("Resource '{uri}' could not be read from '{path}': {detail}")]
    ReadFailed {
        uri: String,
        path: PathBuf,
        detail: String,
    },
}

impl ResourceError {
    /// The URI the engine asked for.
    pub fn uri(&self) -> &str {
        match self {
            ResourceError::NotFound { uri }
            | ResourceError::Rejected { uri, .. }
            | ResourceError::ReadFailed { uri, .. } => uri,
        }
    }
}
