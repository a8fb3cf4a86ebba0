//! # edgequake-html2pdf
//!
//! Convert HTML documents to PDF through a remote CTIP transcoding engine.
//!
//! ## Why this crate?
//!
//! The engine does the hard part (layout, fonts, pagination) but it runs on
//! another machine and cannot see your files. Every image, stylesheet or font
//! the document references has to be fetched back from the client while the
//! engine works. This crate drives that exchange: it streams the document in,
//! answers each resource callback from a primary directory with an optional
//! fallback (templates, shared assets), and persists the output atomically.
//! A missing resource never aborts a conversion.
//!
//! ## Pipeline Overview
//!
//! ```text
//! HTML
//!  │
//!  ├─ 1. Connect   TCP + CTIP handshake, credentials
//!  ├─ 2. Configure output destination, resolver, engine properties
//!  ├─ 3. Feed      document streamed in DATA chunks
//!  │     └─ Resolve  engine asks for resources → primary dir → fallback dir
//!  ├─ 4. Receive   output streamed to file (temp + rename) / memory / channel
//!  └─ 5. Close     always, also after errors
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_html2pdf::{convert_file, SearchPath, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .endpoint("ctip://cti.li/")
//!         .user("user")
//!         .password("kappa")
//!         .build()?;
//!     let search_path = SearchPath::new("site/").with_fallback("templates/");
//!     let output = convert_file("site/index.html", "index.pdf", &search_path, &config).await?;
//!     for missing in output.missing() {
//!         eprintln!("missing: {}", missing.uri);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `html2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-html2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod progress;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Endpoint, SessionConfig, SessionConfigBuilder};
pub use convert::{convert_bytes, convert_file, convert_sync};
pub use error::{ResourceError, TranscodeError};
pub use output::{
    EngineMessage, ResourceRecord, ResourceStatus, Severity, TranscodeOutput, TranscodeStats,
};
pub use progress::{NoopProgressCallback, ProgressCallback, TranscodeProgressCallback};
pub use resolver::{FileResolver, Origin, ResolutionOutcome, ResourceResolver, SearchPath};
pub use session::{MainSink, Session, SessionState};
pub use sink::{OutputDestination, ResourceResponse, ResourceSink};
pub use stream::{convert_stream, OutputStream};
