//! Progress-callback trait for transcoding events.
//!
//! Inject an [`Arc<dyn TranscodeProgressCallback>`] via
//! [`crate::config::SessionConfigBuilder::progress_callback`] to receive
//! events as the engine consumes the document, asks for resources and
//! produces output.
//!
//! # Example
//!
//! ```rust
//! use edgequake_html2pdf::{SessionConfig, TranscodeProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
//!
//! struct BytesRead(AtomicU64);
//!
//! impl TranscodeProgressCallback for BytesRead {
//!     fn on_main_read(&self, read: u64) {
//!         self.0.store(read, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = SessionConfig::builder()
//!     .progress_callback(Arc::new(BytesRead(AtomicU64::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{EngineMessage, ResourceStatus};
use std::sync::Arc;

/// Called by a session as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls arrive from the task driving the session, one
/// at a time.
pub trait TranscodeProgressCallback: Send + Sync {
    /// The handshake succeeded.
    fn on_connected(&self, endpoint: &str) {
        let _ = endpoint;
    }

    /// The engine announced the size of the main document, when it knows it.
    fn on_main_length(&self, total: u64) {
        let _ = total;
    }

    /// The engine reports how many bytes of the main document it has consumed.
    fn on_main_read(&self, read: u64) {
        let _ = read;
    }

    /// A resource request was answered.
    fn on_resource(&self, uri: &str, status: &ResourceStatus) {
        let _ = (uri, status);
    }

    /// The engine emitted a diagnostic message.
    fn on_message(&self, message: &EngineMessage) {
        let _ = message;
    }

    /// The run finished and the output was committed.
    fn on_complete(&self, output_bytes: u64) {
        let _ = output_bytes;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranscodeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SessionConfig`].
pub type ProgressCallback = Arc<dyn TranscodeProgressCallback>;
