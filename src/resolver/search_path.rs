//! Two-tier lookup: primary resource directory, then optional fallback.
//!
//! ## Confinement
//!
//! The engine hands us URIs taken verbatim from the document. Joining them
//! onto a directory without checks would let `../../etc/passwd` or an
//! absolute path read anything the process can read. Every URI is therefore
//! normalised lexically first: `.` is dropped, `..` may only cancel a segment
//! that precedes it, and absolute paths or URIs with a scheme are rejected.
//! A hit is then canonicalised and must still sit under the canonical search
//! directory, which catches symlinks pointing outside. An escaping hit in
//! the primary directory counts as a miss there, so the fallback still gets
//! its turn; the rejection is reported only when no directory has the file.

use super::Origin;
use crate::error::ResourceError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Ordered pair of directories searched for resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

/// A resource file found on a [`SearchPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub origin: Origin,
}

impl SearchPath {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
        }
    }

    /// Directory consulted only when the primary lookup misses.
    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }

    /// Find the file backing `uri`, primary directory first.
    pub fn locate(&self, uri: &str) -> Result<Located, ResourceError> {
        let relative = confine_uri(uri)?;

        let tiers = std::iter::once((self.primary.as_path(), Origin::Primary))
            .chain(self.fallback.as_deref().map(|dir| (dir, Origin::Fallback)));

        let mut rejected = None;
        for (dir, origin) in tiers {
            let candidate = dir.join(&relative);
            if !candidate.is_file() {
                debug!("  {:?} lookup missed: {}", origin, candidate.display());
                continue;
            }
            if let Err(e) = ensure_inside(uri, dir, &candidate) {
                warn!("  {:?} hit ignored: {}", origin, e);
                rejected.get_or_insert(e);
                continue;
            }
            return Ok(Located {
                path: candidate,
                origin,
            });
        }

        Err(rejected.unwrap_or_else(|| ResourceError::NotFound {
            uri: uri.to_string(),
        }))
    }
}

/// Turn an engine URI into a relative path that cannot climb out of its root.
pub fn confine_uri(uri: &str) -> Result<PathBuf, ResourceError> {
    let reject = |reason: &str| ResourceError::Rejected {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let path_part = uri.split(['?', '#']).next().unwrap_or_default();
    if path_part.is_empty() {
        return Err(reject("empty path"));
    }
    if has_scheme(path_part) {
        return Err(reject("not a local reference"));
    }

    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(path_part).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(reject("escapes the search directory"));
                }
            }
            Component::Normal(seg) => segments.push(seg),
            Component::RootDir | Component::Prefix(_) => {
                return Err(reject("absolute paths are not allowed"));
            }
        }
    }

    if segments.is_empty() {
        return Err(reject("empty path"));
    }
    Ok(segments.iter().collect())
}

/// `scheme:` per RFC 3986, but single letters are left alone so Windows
/// drive paths fall through to the absolute-path check.
fn has_scheme(s: &str) -> bool {
    match s.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn ensure_inside(uri: &str, root: &Path, candidate: &Path) -> Result<(), ResourceError> {
    let escaped = |detail: String| ResourceError::Rejected {
        uri: uri.to_string(),
        reason: detail,
    };
    let root = root
        .canonicalize()
        .map_err(|e| escaped(format!("cannot canonicalise search directory: {e}")))?;
    let real = candidate
        .canonicalize()
        .map_err(|e| escaped(format!("cannot canonicalise candidate: {e}")))?;
    if real.starts_with(&root) {
        Ok(())
    } else {
        Err(escaped(format!(
            "resolves outside the search directory ({})",
            real.display()
        )))
    }
}
