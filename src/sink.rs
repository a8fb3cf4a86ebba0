//! Scoped byte channels.
//!
//! Two kinds live here:
//!
//! * **Resource sinks**: handed to a [`crate::resolver::ResourceResolver`]
//!   for one resource request. The resolver either claims the request with
//!   [`ResourceResponse::found`], writes the bytes and [`ResourceSink::close`]s,
//!   or lets the response go, which reports the resource missing. Ownership
//!   makes a second release impossible and `Drop` makes a forgotten release
//!   impossible: whatever path the resolver takes, the slot is released
//!   exactly once.
//!
//! * **Output writers**: where converted bytes from the engine end up.
//!   File output goes to a temp file in the target directory and is renamed
//!   into place only on success, so a failed run never leaves a half-written
//!   artifact behind.

use crate::error::TranscodeError;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

// ── Resource side ────────────────────────────────────────────────────────

/// What the engine will be told about one resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Complete resource bytes, closed by the resolver.
    Data { mime_type: String, bytes: Vec<u8> },
    /// Nothing usable was written.
    Missing,
}

/// Engine-side state for one resource request.
#[derive(Debug)]
pub struct ResponseSlot {
    uri: String,
    delivery: Option<Delivery>,
    releases: u32,
}

impl ResponseSlot {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            delivery: None,
            releases: 0,
        }
    }

    /// Borrow the slot as the handle passed to a resolver.
    pub fn response(&mut self) -> ResourceResponse<'_> {
        ResourceResponse { slot: Some(self) }
    }

    /// How many times the handle was released. Exactly one after a resolver ran.
    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// The final answer; `Missing` if the handle was never released.
    pub fn into_delivery(self) -> Delivery {
        self.delivery.unwrap_or(Delivery::Missing)
    }

    fn release(&mut self, delivery: Delivery) {
        self.releases += 1;
        if self.delivery.is_none() {
            self.delivery = Some(delivery);
        }
    }
}

/// Response handle for one resource request.
///
/// Dropping it without calling [`found`](Self::found) reports the resource as
/// missing.
#[derive(Debug)]
pub struct ResourceResponse<'a> {
    slot: Option<&'a mut ResponseSlot>,
}

impl<'a> ResourceResponse<'a> {
    pub fn uri(&self) -> &str {
        self.slot.as_ref().map(|s| s.uri.as_str()).unwrap_or_default()
    }

    /// Claim the request and open a sink for its bytes.
    pub fn found(self) -> ResourceSink<'a> {
        self.found_with_mime("")
    }

    /// Like [`found`](Self::found), announcing a MIME type to the engine.
    pub fn found_with_mime(mut self, mime_type: impl Into<String>) -> ResourceSink<'a> {
        ResourceSink {
            slot: self.slot.take(),
            mime_type: mime_type.into(),
            buf: Vec::new(),
        }
    }
}

impl Drop for ResourceResponse<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.release(Delivery::Missing);
        }
    }
}

/// Write-then-close channel carrying one resource to the engine.
///
/// Only [`close`](Self::close) delivers the bytes. [`discard`](Self::discard)
/// and dropping the sink both release it with nothing delivered.
#[derive(Debug)]
pub struct ResourceSink<'a> {
    slot: Option<&'a mut ResponseSlot>,
    mime_type: String,
    buf: Vec<u8>,
}

impl ResourceSink<'_> {
    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Deliver everything written and release the handle.
    pub fn close(mut self) {
        if let Some(slot) = self.slot.take() {
            let bytes = std::mem::take(&mut self.buf);
            slot.release(Delivery::Data {
                mime_type: std::mem::take(&mut self.mime_type),
                bytes,
            });
        }
    }

    /// Release the handle without delivering anything.
    pub fn discard(mut self) {
        if let Some(slot) = self.slot.take() {
            slot.release(Delivery::Missing);
        }
    }
}

impl Write for ResourceSink<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.slot.is_none() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink already released"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ResourceSink<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            debug!(
                "Resource sink for '{}' dropped without close; reporting it missing",
                slot.uri
            );
            slot.release(Delivery::Missing);
        }
    }
}

// ── Output side ──────────────────────────────────────────────────────────

/// Where converted bytes are persisted.
#[derive(Debug, Clone)]
pub enum OutputDestination {
    /// Written atomically to this path.
    File(PathBuf),
    /// Kept in memory and returned in [`crate::output::TranscodeOutput::data`].
    Memory,
    /// Forwarded chunk by chunk as they arrive.
    Channel(mpsc::Sender<Vec<u8>>),
}

impl OutputDestination {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        OutputDestination::File(path.into())
    }
}

/// Open writer for one run.
#[derive(Debug)]
pub(crate) enum OutputWriter {
    File {
        target: PathBuf,
        file: tokio::fs::File,
        staged: TempPath,
    },
    Memory(Vec<u8>),
    Channel(mpsc::Sender<Vec<u8>>),
}

/// Result of committing an [`OutputWriter`].
#[derive(Debug)]
pub(crate) enum Committed {
    File(PathBuf),
    Memory(Vec<u8>),
    Channel,
}

impl OutputWriter {
    /// Prepare the destination. For files this creates the temp file next
    /// to the target, surfacing permission problems before any transcoding.
    pub(crate) async fn open(destination: &OutputDestination) -> Result<Self, TranscodeError> {
        match destination {
            OutputDestination::File(target) => {
                let target = target.clone();
                let staging = target.clone();
                let (file, staged) = tokio::task::spawn_blocking(move || {
                    let dir = parent_dir(&staging);
                    std::fs::create_dir_all(dir)?;
                    tempfile::Builder::new()
                        .prefix(".html2pdf-")
                        .suffix(".part")
                        .tempfile_in(dir)
                        .map(NamedTempFile::into_parts)
                })
                .await
                .map_err(|e| TranscodeError::Internal(format!("output staging task failed: {e}")))?
                .map_err(|e| TranscodeError::output(&target, e))?;
                debug!("Output staged at {}", staged.display());
                Ok(OutputWriter::File {
                    target,
                    file: tokio::fs::File::from_std(file),
                    staged,
                })
            }
            OutputDestination::Memory => Ok(OutputWriter::Memory(Vec::new())),
            OutputDestination::Channel(tx) => Ok(OutputWriter::Channel(tx.clone())),
        }
    }

    pub(crate) async fn write(&mut self, chunk: Vec<u8>) -> Result<(), TranscodeError> {
        match self {
            OutputWriter::File { target, file, .. } => file
                .write_all(&chunk)
                .await
                .map_err(|e| TranscodeError::output(target.as_path(), e)),
            OutputWriter::Memory(buf) => {
                buf.extend_from_slice(&chunk);
                Ok(())
            }
            OutputWriter::Channel(tx) => tx.send(chunk).await.map_err(|_| TranscodeError::OutputClosed),
        }
    }

    /// Make the output visible. Dropping the writer instead discards it.
    pub(crate) async fn commit(self) -> Result<Committed, TranscodeError> {
        match self {
            OutputWriter::File {
                target,
                mut file,
                staged,
            } => {
                file.flush()
                    .await
                    .map_err(|e| TranscodeError::output(&target, e))?;
                file.sync_all()
                    .await
                    .map_err(|e| TranscodeError::output(&target, e))?;
                drop(file);

                let destination = target.clone();
                tokio::task::spawn_blocking(move || staged.persist(&destination))
                    .await
                    .map_err(|e| TranscodeError::Internal(format!("output commit task failed: {e}")))?
                    .map_err(|e| TranscodeError::output(&target, e.error))?;
                Ok(Committed::File(target))
            }
            OutputWriter::Memory(buf) => Ok(Committed::Memory(buf)),
            OutputWriter::Channel(_) => Ok(Committed::Channel),
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
