//! One-call conversion entry points.
//!
//! Each function opens its own [`Session`], runs one document through it and
//! closes the session on every path, success or failure. Use
//! [`crate::session::Session`] directly to reuse a connection for several
//! documents, or [`crate::stream::convert_stream`] to consume the output as
//! it arrives.

use crate::config::SessionConfig;
use crate::error::TranscodeError;
use crate::output::TranscodeOutput;
use crate::resolver::{FileResolver, SearchPath};
use crate::session::Session;
use crate::sink::OutputDestination;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Convert an HTML file and write the result to `output`.
///
/// Resources referenced by the document are looked up on `search_path`.
/// The output file appears only when the conversion succeeded; a failed run
/// leaves no partial file behind.
///
/// # Errors
/// - `DocumentReadFailed` if `input` cannot be read
/// - `ConnectionFailed` / `AuthenticationFailed` if the engine is unreachable
/// - `PermissionDenied` if `output` cannot be written
/// - `Engine` if the engine aborts the conversion
///
/// Missing resources are not errors: see
/// [`TranscodeOutput::missing`](crate::output::TranscodeOutput::missing).
pub async fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    search_path: &SearchPath,
    config: &SessionConfig,
) -> Result<TranscodeOutput, TranscodeError> {
    let input = input.as_ref();
    let output = output.as_ref();
    info!("Starting conversion: {} → {}", input.display(), output.display());

    let document = tokio::fs::read(input)
        .await
        .map_err(|e| TranscodeError::DocumentReadFailed {
            path: input.to_path_buf(),
            source: e,
        })?;

    let uri = document_uri(input);
    run_once(
        config,
        OutputDestination::file(output),
        search_path,
        &uri,
        &document,
    )
    .await
}

/// Convert an in-memory document; the result is in
/// [`TranscodeOutput::data`](crate::output::TranscodeOutput::data).
///
/// `uri` names the document for the engine, e.g. `"index.html"`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_html2pdf::{convert_bytes, SearchPath, SessionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let html = std::fs::read("site/index.html")?;
/// let output = convert_bytes(&html, "index.html", &SearchPath::new("site"), &SessionConfig::default()).await?;
/// std::fs::write("index.pdf", output.data.unwrap_or_default())?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    document: &[u8],
    uri: &str,
    search_path: &SearchPath,
    config: &SessionConfig,
) -> Result<TranscodeOutput, TranscodeError> {
    run_once(config, OutputDestination::Memory, search_path, uri, document).await
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    search_path: &SearchPath,
    config: &SessionConfig,
) -> Result<TranscodeOutput, TranscodeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TranscodeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(input, output, search_path, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_once(
    config: &SessionConfig,
    destination: OutputDestination,
    search_path: &SearchPath,
    uri: &str,
    document: &[u8],
) -> Result<TranscodeOutput, TranscodeError> {
    let mut session = Session::new(config.clone());
    let result = async {
        session.connect().await?;
        session.set_output(destination)?;
        session.set_resolver(Arc::new(FileResolver::new(search_path.clone())))?;
        session.feed_document(uri, document).await
    }
    .await;
    session.close().await;
    result
}

/// The name the engine sees for a document read from disk.
pub(crate) fn document_uri(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.html".to_string())
}
