//! Result types returned by a completed run.

use crate::error::ResourceError;
use crate::resolver::Origin;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeOutput {
    /// Converted bytes, only for [`crate::sink::OutputDestination::Memory`].
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    /// Where the artifact was committed, for file destinations.
    pub path: Option<PathBuf>,
    /// One record per resource request, in the order the engine asked.
    pub resources: Vec<ResourceRecord>,
    /// Diagnostics emitted by the engine.
    pub messages: Vec<EngineMessage>,
    pub stats: TranscodeStats,
}

impl TranscodeOutput {
    /// Records for resources that were delivered to the engine.
    pub fn found(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.resources
            .iter()
            .filter(|r| matches!(r.status, ResourceStatus::Found { .. }))
    }

    /// Records for resources the engine had to do without.
    pub fn missing(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.resources
            .iter()
            .filter(|r| matches!(r.status, ResourceStatus::Missing { .. }))
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscodeStats {
    /// Bytes of source document sent (0 for server-side main documents).
    pub document_bytes: u64,
    /// Bytes of converted output received.
    pub output_bytes: u64,
    /// MIME type announced by the engine, if any.
    pub mime_type: Option<String>,
    pub resources_found: usize,
    pub resources_missing: usize,
    pub duration_ms: u64,
}

/// How one resource request was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub uri: String,
    #[serde(flatten)]
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Bytes were streamed to the engine.
    Found {
        path: PathBuf,
        origin: Origin,
        bytes: u64,
    },
    /// The engine was told the resource is missing.
    Missing { reason: String },
}

impl ResourceStatus {
    pub(crate) fn missing(error: &ResourceError) -> Self {
        ResourceStatus::Missing {
            reason: error.to_string(),
        }
    }
}

/// Severity of an engine message, taken from the high nibble of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn from_code(code: u16) -> Self {
        match code >> 12 {
            0 | 1 => Severity::Info,
            2 => Severity::Warning,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

/// A diagnostic emitted by the engine during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMessage {
    pub code: u16,
    pub severity: Severity,
    pub message: String,
    pub args: Vec<String>,
}

impl EngineMessage {
    pub fn new(code: u16, message: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            code,
            severity: Severity::from_code(code),
            message: message.into(),
            args,
        }
    }
}
