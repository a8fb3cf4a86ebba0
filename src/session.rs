//! Transcoding session: one engine connection, one conversion at a time.
//!
//! ## Lifecycle
//!
//! ```text
//!  Created ──connect──▶ Connected ──set_output──▶ Configured
//!                                                   │ transcode / transcode_server
//!                                                   ▼
//!                         Completed ◀──finish── Transcoding ──error/abort──▶ Failed
//!                              │                                              │
//!                              └──────────── reset ──▶ Connected ◀── reset ───┘
//!
//!  close(): any state ──▶ Closed (idempotent)
//! ```
//!
//! The engine drives resource callbacks while it consumes the document, so
//! every read from the connection may be a [`Response::ResourceRequest`]
//! that has to be answered before the run can continue. The resolver runs
//! on a blocking thread and the session waits for its answer: one request is
//! in flight at a time, as the engine expects.

use crate::config::SessionConfig;
use crate::error::{ResourceError, TranscodeError};
use crate::output::{
    EngineMessage, ResourceRecord, ResourceStatus, Severity, TranscodeOutput, TranscodeStats,
};
use crate::progress::{ProgressCallback, TranscodeProgressCallback};
use crate::protocol::{Connection, HandshakeReply, Request, Response};
use crate::resolver::{Origin, ResolutionOutcome, ResourceResolver};
use crate::sink::{Committed, Delivery, OutputDestination, OutputWriter, ResponseSlot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Connected,
    Configured,
    Transcoding,
    Completed,
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Connected => "connected",
            SessionState::Configured => "configured",
            SessionState::Transcoding => "transcoding",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One conversion job against one engine.
///
/// Sessions share nothing with each other; run as many as you like in
/// parallel. Always finish with [`close`](Self::close), also after errors.
///
/// # Example
/// ```rust,no_run
/// use edgequake_html2pdf::{FileResolver, OutputDestination, SearchPath, Session, SessionConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), edgequake_html2pdf::TranscodeError> {
/// let mut session = Session::new(SessionConfig::default());
/// let result = async {
///     session.connect().await?;
///     session.set_output(OutputDestination::file("out/report.pdf"))?;
///     session.set_resolver(Arc::new(FileResolver::new(
///         SearchPath::new("site/").with_fallback("templates/"),
///     )))?;
///     session
///         .feed_document("report.html", b"<img src=\"logo.png\">")
///         .await
/// }
/// .await;
/// session.close().await;
/// let output = result?;
/// println!("{} resources found", output.stats.resources_found);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    conn: Option<Connection<TcpStream>>,
    output: Option<OutputDestination>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    properties: Vec<(String, String)>,
    /// A run was abandoned mid-flight; the engine must be told before reuse.
    abort_pending: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state)
            .field("output", &self.output)
            .field("resolver", &self.resolver.as_ref().map(|_| "<dyn ResourceResolver>"))
            .field("properties", &self.properties)
            .finish()
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Created,
            conn: None,
            output: None,
            resolver: None,
            properties: Vec::new(),
            abort_pending: false,
        }
    }

    /// Create a session and connect it.
    pub async fn open(config: SessionConfig) -> Result<Self, TranscodeError> {
        let mut session = Self::new(config);
        session.connect().await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the TCP connection and authenticate.
    ///
    /// Failure leaves the session in `Created`; nothing was sent beyond the
    /// handshake and `close()` is still safe.
    pub async fn connect(&mut self) -> Result<(), TranscodeError> {
        self.expect_state("connect", &[SessionState::Created])?;

        let endpoint = self.config.endpoint.to_string();
        let limit = self.config.connect_timeout();
        let failed = |reason: String| TranscodeError::ConnectionFailed {
            endpoint: endpoint.clone(),
            reason,
        };

        info!("Connecting to {}", endpoint);
        let connecting = TcpStream::connect(self.config.endpoint.socket_addr());
        let stream = match tokio::time::timeout(limit, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(_) => return Err(failed(format!("timed out after {}s", limit.as_secs()))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY not set: {}", e);
        }

        let mut conn = Connection::new(stream, self.config.io_timeout());
        let reply = match tokio::time::timeout(
            limit,
            conn.handshake(&self.config.user, &self.config.password),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(failed(format!("handshake failed: {e}"))),
            Err(_) => return Err(failed("handshake timed out".to_string())),
        };

        if let HandshakeReply::Rejected(line) = reply {
            debug!("Handshake rejected: {:?}", line);
            conn.shutdown().await;
            return Err(TranscodeError::AuthenticationFailed {
                endpoint,
                user: self.config.user.clone(),
            });
        }

        self.conn = Some(conn);
        self.state = if self.output.is_some() {
            SessionState::Configured
        } else {
            SessionState::Connected
        };
        if let Some(cb) = &self.config.progress_callback {
            cb.on_connected(&endpoint);
        }
        info!("Connected to {} as '{}'", endpoint, self.config.user);
        Ok(())
    }

    /// Choose where converted bytes go. Required before transcoding.
    pub fn set_output(&mut self, destination: OutputDestination) -> Result<(), TranscodeError> {
        self.expect_state("set the output", CONFIGURABLE)?;
        debug!("Output destination: {:?}", destination);
        self.output = Some(destination);
        if self.state == SessionState::Connected {
            self.state = SessionState::Configured;
        }
        Ok(())
    }

    /// Register the resolver the engine calls back into for resources.
    ///
    /// Optional: without one, every resource request is answered missing.
    pub fn set_resolver(
        &mut self,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Result<(), TranscodeError> {
        self.expect_state("set the resolver", CONFIGURABLE)?;
        self.resolver = Some(resolver);
        Ok(())
    }

    /// Engine property sent before the next run, after those in the config.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TranscodeError> {
        self.expect_state("set a property", CONFIGURABLE)?;
        let name = name.into();
        if name.is_empty() {
            return Err(TranscodeError::InvalidConfig(
                "Property names must not be empty".into(),
            ));
        }
        self.properties.push((name, value.into()));
        Ok(())
    }

    /// Start a run and return the sink the document must be written into.
    ///
    /// `uri` names the document for the engine; relative resource references
    /// are resolved against it.
    pub async fn transcode(&mut self, uri: &str) -> Result<MainSink<'_>, TranscodeError> {
        self.expect_state("transcode", &[SessionState::Configured])?;
        let run = self
            .begin(Request::StartMain {
                uri: uri.to_string(),
            })
            .await?;
        Ok(MainSink {
            session: self,
            run: Some(run),
            settled: false,
        })
    }

    /// Write a whole document and wait for the converted output.
    ///
    /// The sink is released on every path: a failed write leaves the session
    /// `Failed` and the engine is told to abort on the next `reset` or `close`.
    pub async fn feed_document(
        &mut self,
        uri: &str,
        document: &[u8],
    ) -> Result<TranscodeOutput, TranscodeError> {
        let mut sink = self.transcode(uri).await?;
        sink.write(document).await?;
        sink.finish().await
    }

    /// Have the engine fetch the main document itself.
    ///
    /// Output handling and resource callbacks work as for [`transcode`](Self::transcode).
    pub async fn transcode_server(&mut self, uri: &str) -> Result<TranscodeOutput, TranscodeError> {
        self.expect_state("transcode", &[SessionState::Configured])?;
        let run = self
            .begin(Request::ServerMain {
                uri: uri.to_string(),
            })
            .await?;
        self.complete(run).await
    }

    /// Forget output, resolver and properties so the connection can serve
    /// another run.
    pub async fn reset(&mut self) -> Result<(), TranscodeError> {
        self.expect_state(
            "reset",
            &[
                SessionState::Connected,
                SessionState::Configured,
                SessionState::Completed,
                SessionState::Failed,
            ],
        )?;
        let abort_pending = std::mem::take(&mut self.abort_pending);
        let conn = self.connection()?;

        let result = async {
            if abort_pending {
                conn.send(&Request::Abort { force: true }).await?;
                drain_aborted_run(conn).await?;
            }
            conn.send(&Request::Reset).await
        }
        .await;

        if let Err(e) = result {
            self.state = SessionState::Failed;
            return Err(e);
        }

        self.output = None;
        self.resolver = None;
        self.properties.clear();
        self.state = SessionState::Connected;
        debug!("Session reset");
        Ok(())
    }

    /// Release the connection. Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut conn) = self.conn.take() {
            if std::mem::take(&mut self.abort_pending) {
                if let Err(e) = conn.send(&Request::Abort { force: true }).await {
                    debug!("Abort on close failed: {}", e);
                }
            }
            if let Err(e) = conn.send(&Request::Close).await {
                debug!("Close request failed: {}", e);
            }
            conn.shutdown().await;
            info!("Session closed");
        }
        self.output = None;
        self.resolver = None;
        self.state = SessionState::Closed;
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), TranscodeError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TranscodeError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn connection(&mut self) -> Result<&mut Connection<TcpStream>, TranscodeError> {
        self.conn
            .as_mut()
            .ok_or_else(|| TranscodeError::Internal("session has no connection".into()))
    }

    /// Open the output, send the run header and enter `Transcoding`.
    async fn begin(&mut self, start: Request) -> Result<Run, TranscodeError> {
        let destination = self.output.clone().ok_or_else(|| {
            TranscodeError::Internal("configured session without an output".into())
        })?;

        // Permission problems surface here, before the engine does any work.
        let writer = match OutputWriter::open(&destination).await {
            Ok(w) => w,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        let properties: Vec<(String, String)> = self
            .config
            .properties
            .iter()
            .chain(self.properties.iter())
            .cloned()
            .collect();
        let client_resources = self.resolver.is_some();
        let conn = self.connection()?;

        let sent = async {
            for (name, value) in properties {
                conn.send(&Request::Property { name, value }).await?;
            }
            conn.send(&Request::ClientResource {
                enabled: client_resources,
            })
            .await?;
            conn.send(&start).await
        }
        .await;

        if let Err(e) = sent {
            self.state = SessionState::Failed;
            return Err(e);
        }

        match &start {
            Request::StartMain { uri } | Request::ServerMain { uri } => {
                info!("Transcoding {}", uri)
            }
            _ => {}
        }
        self.state = SessionState::Transcoding;
        Ok(Run {
            writer: Some(writer),
            resolver: self.resolver.clone(),
            progress: self.config.progress_callback.clone(),
            chunk_size: self.config.frame_size(),
            resources: Vec::new(),
            messages: Vec::new(),
            stats: TranscodeStats::default(),
            started: Instant::now(),
            output_error: None,
            ended: false,
        })
    }

    /// Read the rest of the run, commit the output and enter `Completed`.
    async fn complete(&mut self, mut run: Run) -> Result<TranscodeOutput, TranscodeError> {
        let pumped = match self.connection() {
            Ok(conn) => run.pump(conn, Until::Eof).await,
            Err(e) => Err(e),
        };
        let result = match pumped {
            Ok(()) => run.into_output().await,
            Err(e) => {
                if !run.ended {
                    // Output is still in flight: stop the engine before reuse.
                    self.abort_pending = true;
                }
                Err(e)
            }
        };

        match result {
            Ok(output) => {
                self.state = SessionState::Completed;
                info!(
                    "Transcoding complete: {} bytes out, {} resources found, {} missing ({} ms)",
                    output.stats.output_bytes,
                    output.stats.resources_found,
                    output.stats.resources_missing,
                    output.stats.duration_ms
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_complete(output.stats.output_bytes);
                }
                Ok(output)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!("Session dropped without close(); the engine connection is cut");
        }
    }
}

const CONFIGURABLE: &[SessionState] = &[
    SessionState::Created,
    SessionState::Connected,
    SessionState::Configured,
];

// ── Main document sink ───────────────────────────────────────────────────

/// Write side of a run: the caller streams the document into it.
///
/// Call [`finish`](Self::finish) to signal end of input and collect the
/// output, or [`abort`](Self::abort) to cancel. Dropping the sink without
/// either marks the session `Failed` and discards any partial output.
pub struct MainSink<'s> {
    session: &'s mut Session,
    run: Option<Run>,
    /// The engine has ended the run; nothing is left to abort.
    settled: bool,
}

impl fmt::Debug for MainSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainSink")
            .field("state", &self.session.state)
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

impl MainSink<'_> {
    /// Send a chunk of the document, serving any resource requests the
    /// engine makes while it reads.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TranscodeError> {
        self.ensure_active("write")?;
        let result = async {
            let run = self.run.as_mut().ok_or_else(finished_sink)?;
            let conn = self.session.connection()?;
            for chunk in data.chunks(run.chunk_size) {
                conn.send_data(chunk).await?;
                run.stats.document_bytes += chunk.len() as u64;
                run.pump(conn, Until::Next).await?;
            }
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Signal end of input, wait for the engine to finish and commit the output.
    pub async fn finish(mut self) -> Result<TranscodeOutput, TranscodeError> {
        self.ensure_active("finish")?;
        let run = self.run.take().ok_or_else(finished_sink)?;
        if let Err(e) = self.session.connection()?.send(&Request::Eof).await {
            return self.settle(Err(e));
        }
        // `complete` owns the run now and records any abort still owed.
        self.settled = true;
        self.session.complete(run).await
    }

    /// Cancel the run. Partial output is discarded and the session is `Failed`.
    pub async fn abort(mut self) -> Result<(), TranscodeError> {
        self.ensure_active("abort")?;
        self.run = None;
        let result = async {
            let conn = self.session.connection()?;
            conn.send(&Request::Abort { force: false }).await?;
            drain_aborted_run(conn).await
        }
        .await;
        self.settled = result.is_ok();
        self.session.state = SessionState::Failed;
        info!("Transcoding aborted");
        result
    }

    /// Bytes of document sent so far.
    pub fn bytes_written(&self) -> u64 {
        self.run.as_ref().map(|r| r.stats.document_bytes).unwrap_or(0)
    }

    fn ensure_active(&self, operation: &'static str) -> Result<(), TranscodeError> {
        match self.session.state {
            SessionState::Transcoding => Ok(()),
            state => Err(TranscodeError::InvalidState { operation, state }),
        }
    }

    fn settle<T>(&mut self, result: Result<T, TranscodeError>) -> Result<T, TranscodeError> {
        if result.is_err() {
            self.session.state = SessionState::Failed;
            if self.run.as_ref().is_some_and(|run| run.ended) {
                self.settled = true;
            }
            self.run = None;
        }
        result
    }
}

impl Drop for MainSink<'_> {
    fn drop(&mut self) {
        if self.session.state == SessionState::Transcoding {
            warn!("Document sink dropped before finish(); discarding the run");
            self.session.state = SessionState::Failed;
        }
        if !self.settled {
            self.session.abort_pending = true;
        }
    }
}

fn finished_sink() -> TranscodeError {
    TranscodeError::Internal("document sink already finished".into())
}

// ── Run state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Until {
    /// The engine consumed the last DATA frame.
    Next,
    /// The engine finished producing output.
    Eof,
}

struct Run {
    writer: Option<OutputWriter>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    progress: Option<ProgressCallback>,
    chunk_size: usize,
    resources: Vec<ResourceRecord>,
    messages: Vec<EngineMessage>,
    stats: TranscodeStats,
    started: Instant,
    /// First output failure; the rest of the run is read and discarded.
    output_error: Option<TranscodeError>,
    /// The engine has sent EOF or ABORT; nothing of this run is left unread.
    ended: bool,
}

impl Run {
    /// Handle engine responses until `until` arrives.
    async fn pump(
        &mut self,
        conn: &mut Connection<TcpStream>,
        until: Until,
    ) -> Result<(), TranscodeError> {
        loop {
            match conn.recv().await? {
                Response::Next if until == Until::Next => return self.output_result(),
                Response::Eof if until == Until::Eof => {
                    self.ended = true;
                    return self.output_result();
                }
                Response::Next => debug!("Ignoring stray NEXT"),
                Response::Eof => {
                    self.ended = true;
                    return Err(TranscodeError::Protocol(
                        "engine ended the run before the document was complete".into(),
                    ))
                }
                Response::StartData { mime_type, .. } => {
                    if !mime_type.is_empty() {
                        debug!("Output type: {}", mime_type);
                        self.stats.mime_type = Some(mime_type);
                    }
                }
                Response::Data(bytes) => {
                    self.stats.output_bytes += bytes.len() as u64;
                    let failed = match self.writer.as_mut() {
                        Some(writer) => writer.write(bytes).await.err(),
                        None => None,
                    };
                    if let Some(e) = failed {
                        warn!("Output failed, discarding the rest of the run: {}", e);
                        self.writer = None;
                        self.output_error.get_or_insert(e);
                    }
                }
                Response::MainLength(total) => self.notify(|cb| cb.on_main_length(total)),
                Response::MainRead(read) => self.notify(|cb| cb.on_main_read(read)),
                Response::Message {
                    code,
                    message,
                    args,
                } => self.record_message(EngineMessage::new(code, message, args)),
                Response::ResourceRequest { uri } => self.serve_resource(conn, uri).await?,
                Response::Abort { code, message, .. } => {
                    error!("Engine aborted the run: {:#06x} {}", code, message);
                    self.ended = true;
                    return Err(TranscodeError::Engine { code, message });
                }
            }
        }
    }

    fn output_result(&mut self) -> Result<(), TranscodeError> {
        match self.output_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn record_message(&mut self, msg: EngineMessage) {
        match msg.severity {
            Severity::Info => info!("Engine: {} {:?}", msg.message, msg.args),
            Severity::Warning => warn!("Engine: {} {:?}", msg.message, msg.args),
            Severity::Error | Severity::Fatal => {
                error!("Engine: {} {:?}", msg.message, msg.args)
            }
        }
        self.notify(|cb| cb.on_message(&msg));
        self.messages.push(msg);
    }

    /// Answer one RESOURCE_REQUEST through the resolver.
    async fn serve_resource(
        &mut self,
        conn: &mut Connection<TcpStream>,
        uri: String,
    ) -> Result<(), TranscodeError> {
        debug!("Engine requests resource '{}'", uri);
        let (delivery, outcome) = match &self.resolver {
            Some(resolver) => {
                let resolver = Arc::clone(resolver);
                let task_uri = uri.clone();
                let task = tokio::task::spawn_blocking(move || {
                    let mut slot = ResponseSlot::new(task_uri.as_str());
                    let outcome = resolver.resolve(&task_uri, slot.response());
                    (slot.into_delivery(), outcome)
                });
                match task.await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!("Resolver failed for '{}': {}", uri, e);
                        (
                            Delivery::Missing,
                            ResolutionOutcome::NotFound(ResourceError::ReadFailed {
                                uri: uri.clone(),
                                path: PathBuf::new(),
                                detail: format!("resolver task failed: {e}"),
                            }),
                        )
                    }
                }
            }
            None => (
                Delivery::Missing,
                ResolutionOutcome::NotFound(ResourceError::NotFound { uri: uri.clone() }),
            ),
        };

        let status = match delivery {
            Delivery::Data { mime_type, bytes } => {
                let length = bytes.len() as u64;
                conn.send(&Request::StartResource {
                    uri: uri.clone(),
                    mime_type,
                    encoding: String::new(),
                    length: Some(length),
                })
                .await?;
                for chunk in bytes.chunks(self.chunk_size) {
                    conn.send_data(chunk).await?;
                }
                conn.send(&Request::Eof).await?;

                let (path, origin) = match outcome {
                    ResolutionOutcome::Found { path, origin, .. } => (path, origin),
                    ResolutionOutcome::NotFound(_) => (PathBuf::from(&uri), Origin::Other),
                };
                self.stats.resources_found += 1;
                ResourceStatus::Found {
                    path,
                    origin,
                    bytes: length,
                }
            }
            Delivery::Missing => {
                conn.send(&Request::MissingResource { uri: uri.clone() })
                    .await?;
                self.stats.resources_missing += 1;
                match outcome {
                    ResolutionOutcome::NotFound(e) => ResourceStatus::missing(&e),
                    ResolutionOutcome::Found { .. } => ResourceStatus::Missing {
                        reason: "resolver reported a hit but delivered no data".into(),
                    },
                }
            }
        };

        debug!("Resource '{}' answered: {:?}", uri, status);
        self.notify(|cb| cb.on_resource(&uri, &status));
        self.resources.push(ResourceRecord { uri, status });
        Ok(())
    }

    fn notify(&self, f: impl FnOnce(&dyn TranscodeProgressCallback)) {
        if let Some(cb) = &self.progress {
            f(cb.as_ref());
        }
    }

    async fn into_output(mut self) -> Result<TranscodeOutput, TranscodeError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| TranscodeError::Internal("output already committed".into()))?;
        let (path, data) = match writer.commit().await? {
            Committed::File(path) => (Some(path), None),
            Committed::Memory(bytes) => (None, Some(bytes)),
            Committed::Channel => (None, None),
        };
        self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
        Ok(TranscodeOutput {
            data,
            path,
            resources: self.resources,
            messages: self.messages,
            stats: self.stats,
        })
    }
}

/// After ABORT, skip output until the engine confirms, answering resource
/// requests as missing so it is never left waiting.
async fn drain_aborted_run(conn: &mut Connection<TcpStream>) -> Result<(), TranscodeError> {
    loop {
        match conn.recv().await? {
            Response::Abort { .. } | Response::Eof => return Ok(()),
            Response::ResourceRequest { uri } => {
                conn.send(&Request::MissingResource { uri }).await?
            }
            other => debug!("Discarding {:#04x} after abort", other.kind()),
        }
    }
}
