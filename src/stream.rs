//! Streaming conversion API: emit output bytes as the engine produces them.
//!
//! ## Why stream?
//!
//! Large documents take a while to lay out and their output can be big. A
//! stream lets callers forward bytes to a socket or an HTTP response while the
//! engine is still working, instead of buffering the whole artifact first.
//!
//! Connection and authentication errors are returned eagerly from
//! [`convert_stream`]; anything that fails later arrives as the final `Err`
//! item of the stream.

use crate::config::SessionConfig;
use crate::error::TranscodeError;
use crate::resolver::{FileResolver, SearchPath};
use crate::session::Session;
use crate::sink::OutputDestination;
use futures::stream::{self, Stream};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A boxed stream of output chunks.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TranscodeError>> + Send>>;

/// Chunks buffered between the session and a slow consumer.
const CHANNEL_CAPACITY: usize = 16;

/// Convert an in-memory document, streaming output chunks as they arrive.
///
/// Dropping the stream cancels the conversion: the background job notices
/// the closed channel, aborts the run and closes the session.
///
/// # Example
/// ```rust,no_run
/// use edgequake_html2pdf::{convert_stream, SearchPath, SessionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let html = std::fs::read("site/index.html")?;
/// let mut chunks = convert_stream(html, "index.html", SearchPath::new("site"), SessionConfig::default()).await?;
/// let mut pdf = Vec::new();
/// while let Some(chunk) = chunks.next().await {
///     pdf.extend_from_slice(&chunk?);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(
    document: Vec<u8>,
    uri: impl Into<String>,
    search_path: SearchPath,
    config: SessionConfig,
) -> Result<OutputStream, TranscodeError> {
    let uri = uri.into();
    info!("Starting streaming conversion: {}", uri);

    let mut session = Session::open(config).await?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let receiver_gone = tx.clone();
    let job = tokio::spawn(async move {
        let result = {
            let run = async {
                session.set_output(OutputDestination::Channel(tx))?;
                session.set_resolver(Arc::new(FileResolver::new(search_path)))?;
                session.feed_document(&uri, &document).await
            };
            tokio::select! {
                result = run => result,
                _ = receiver_gone.closed() => {
                    info!("Output stream dropped; cancelling {}", uri);
                    Err(TranscodeError::OutputClosed)
                }
            }
        };
        session.close().await;
        result.map(|output| output.stats)
    });

    let chunks = stream::unfold((rx, Some(job)), |(mut rx, job)| async move {
        if let Some(chunk) = rx.recv().await {
            return Some((Ok(chunk), (rx, job)));
        }
        // Channel drained: the job has dropped its sender. Report how it ended.
        let Some(job) = job else {
            return None;
        };
        match job.await {
            Ok(Ok(stats)) => {
                info!("Streaming conversion complete: {} bytes", stats.output_bytes);
                None
            }
            Ok(Err(e)) => Some((Err(e), (rx, None))),
            Err(e) => {
                warn!("Conversion task failed: {}", e);
                Some((
                    Err(TranscodeError::Internal(format!("conversion task failed: {e}"))),
                    (rx, None),
                ))
            }
        }
    });

    Ok(Box::pin(chunks))
}
