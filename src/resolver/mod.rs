//! Resource resolution: answering the engine's requests for referenced files.
//!
//! The engine calls back once per image, stylesheet or font the document
//! references. A [`ResourceResolver`] receives the URI and a
//! [`ResourceResponse`] handle and either streams bytes into it or lets it go.
//!
//! [`FileResolver`] is the stock implementation: it looks the URI up on a
//! [`SearchPath`] (primary directory first, then the fallback) and streams the
//! file. Any local failure degrades to "missing" for the engine and is kept
//! as a [`ResourceError`] in the outcome; nothing escapes as a fatal error.

pub mod search_path;

pub use search_path::{confine_uri, Located, SearchPath};

use crate::error::ResourceError;
use crate::sink::ResourceResponse;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which tier of the search path supplied a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Primary,
    Fallback,
    /// Supplied by a custom resolver that does not use a search path.
    Other,
}

/// What a resolver did with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Bytes were written to the sink and the sink was closed.
    Found {
        path: PathBuf,
        origin: Origin,
        bytes: u64,
    },
    /// Nothing was delivered; the engine will treat the resource as missing.
    NotFound(ResourceError),
}

impl ResolutionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ResolutionOutcome::Found { .. })
    }
}

/// Supplies resource bytes to the engine on demand.
///
/// Implementations run on a blocking thread, one request at a time per
/// session, and may do synchronous file I/O. The response handle is released
/// exactly once whatever the implementation does with it: closing a sink
/// obtained from [`ResourceResponse::found`] delivers the bytes, every other
/// path reports the resource missing.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, uri: &str, response: ResourceResponse<'_>) -> ResolutionOutcome;
}

/// Resolves URIs against a [`SearchPath`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileResolver {
    search_path: SearchPath,
}

impl FileResolver {
    pub fn new(search_path: SearchPath) -> Self {
        Self { search_path }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }
}

impl ResourceResolver for FileResolver {
    fn resolve(&self, uri: &str, response: ResourceResponse<'_>) -> ResolutionOutcome {
        let located = match self.search_path.locate(uri) {
            Ok(located) => located,
            Err(e) => {
                match &e {
                    ResourceError::Rejected { reason, .. } => {
                        warn!("Refusing resource '{}': {}", uri, reason)
                    }
                    _ => debug!("Resource '{}' not found on the search path", uri),
                }
                return ResolutionOutcome::NotFound(e);
            }
        };

        let read_failed = |detail: String| {
            warn!(
                "Resource '{}' found at {} but unreadable: {}",
                uri,
                located.path.display(),
                detail
            );
            ResolutionOutcome::NotFound(ResourceError::ReadFailed {
                uri: uri.to_string(),
                path: located.path.clone(),
                detail,
            })
        };

        let file = match File::open(&located.path) {
            Ok(f) => f,
            Err(e) => return read_failed(e.to_string()),
        };

        match deliver_from(file, response, guess_mime_type(&located.path)) {
            Ok(bytes) => {
                debug!(
                    "Resource '{}' → {} ({:?}, {} bytes)",
                    uri,
                    located.path.display(),
                    located.origin,
                    bytes
                );
                ResolutionOutcome::Found {
                    path: located.path.clone(),
                    origin: located.origin,
                    bytes,
                }
            }
            Err(e) => read_failed(e.to_string()),
        }
    }
}

/// Copy `reader` into a sink claimed from `response`.
///
/// The sink is closed when the copy succeeds and discarded when it fails
/// part-way, so the engine never receives a truncated resource.
pub fn deliver_from<R: Read>(
    mut reader: R,
    response: ResourceResponse<'_>,
    mime_type: &str,
) -> io::Result<u64> {
    let mut sink = response.found_with_mime(mime_type);
    match io::copy(&mut reader, &mut sink) {
        Ok(n) => {
            sink.close();
            Ok(n)
        }
        Err(e) => {
            sink.discard();
            Err(e)
        }
    }
}

/// MIME type announced to the engine, by file extension. Empty when unknown,
/// which leaves sniffing to the engine.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "js" => "text/javascript",
        "html" | "htm" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        _ => "",
    }
}
