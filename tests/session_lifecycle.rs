//! Session state machine, cancellation and streaming against the fake engine.

mod common;

use common::FakeEngine;
use edgequake_html2pdf::{
    convert_stream, EngineMessage, FileResolver, Origin, OutputDestination, ResolutionOutcome,
    ResourceError, ResourceResolver, ResourceResponse, ResourceStatus, SearchPath, Session,
    SessionConfig, SessionState, TranscodeError, TranscodeProgressCallback,
};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

async fn connected(engine: &FakeEngine) -> Session {
    Session::open(engine.config()).await.unwrap()
}

fn resolver_for(dir: &TempDir) -> Arc<dyn ResourceResolver> {
    Arc::new(FileResolver::new(SearchPath::new(dir.path())))
}

// ── close() ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_is_idempotent_after_success() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    session.feed_document("a.html", b"<p>a</p>").await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(engine.wait_closed().await.closed);
}

#[tokio::test]
async fn test_wrong_password_is_an_authentication_failure() {
    let engine = FakeEngine::start().await;
    let config = SessionConfig::builder()
        .endpoint(engine.endpoint())
        .user(common::USER)
        .password("not-kappa")
        .build()
        .unwrap();

    let mut session = Session::new(config);
    let err = session.connect().await.unwrap_err();
    assert!(
        matches!(err, TranscodeError::AuthenticationFailed { ref user, .. } if user == "user"),
        "got {err:?}"
    );
    assert!(err.is_connection_error());
    assert_eq!(session.state(), SessionState::Created);
    assert_eq!(engine.log().authenticated, 0);
    session.close().await;
}

// ── State machine ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transcode_requires_an_output() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    assert_eq!(session.state(), SessionState::Connected);

    let err = session.feed_document("a.html", b"x").await.unwrap_err();
    assert!(matches!(
        err,
        TranscodeError::InvalidState {
            state: SessionState::Connected,
            ..
        }
    ));

    session.set_output(OutputDestination::Memory).unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    session.close().await;
}

#[tokio::test]
async fn test_output_set_before_connect_is_kept() {
    let engine = FakeEngine::start().await;
    let mut session = Session::new(engine.config());
    session.set_output(OutputDestination::Memory).unwrap();
    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    session.close().await;
}

#[tokio::test]
async fn test_completed_session_needs_reset_before_next_run() {
    let engine = FakeEngine::start().await;
    let res = TempDir::new().unwrap();
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    session.set_resolver(resolver_for(&res)).unwrap();
    session.feed_document("one.html", b"<p>1</p>").await.unwrap();

    assert!(matches!(
        session.set_output(OutputDestination::Memory),
        Err(TranscodeError::InvalidState {
            state: SessionState::Completed,
            ..
        })
    ));

    session.reset().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session.feed_document("two.html", b"<p>22</p>").await.unwrap();
    assert_eq!(output.stats.document_bytes, 9);

    session.close().await;
    let log = engine.wait_closed().await;
    assert_eq!(log.resets, 1);
    assert_eq!(log.main_uri.as_deref(), Some("two.html"));
    // The resolver was cleared by reset().
    assert_eq!(log.client_resource, Some(false));
    assert_eq!(log.connections, 1);
}

#[tokio::test]
async fn test_properties_are_sent_before_the_run_in_order() {
    let engine = FakeEngine::start().await;
    let mut config = engine.config();
    config
        .properties
        .push(("output.pdf.version".into(), "1.7".into()));
    let mut session = Session::open(config).await.unwrap();
    session.set_property("output.title", "Quarterly").unwrap();
    session.set_output(OutputDestination::Memory).unwrap();
    session.feed_document("q.html", b"<h1>Q3</h1>").await.unwrap();
    session.close().await;

    assert_eq!(
        engine.wait_closed().await.properties,
        vec![
            ("output.pdf.version".to_string(), "1.7".to_string()),
            ("output.title".to_string(), "Quarterly".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_without_resolver_every_resource_is_missing() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session
        .feed_document("a.html", br#"<img src="logo.png">"#)
        .await
        .unwrap();
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(log.client_resource, Some(false));
    assert_eq!(log.resource("logo.png"), Some(None));
    assert_eq!(output.stats.resources_missing, 1);
}

#[tokio::test]
async fn test_memory_output_is_byte_exact() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session.feed_document("a.html", b"<p>exact</p>").await.unwrap();
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(output.data.as_deref(), Some(log.output.as_slice()));
    assert_eq!(output.stats.output_bytes, log.output.len() as u64);
    assert!(output.path.is_none());
}

// ── Cancellation & failures ──────────────────────────────────────────────────

#[tokio::test]
async fn test_client_abort_then_reuse() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();

    let mut sink = session.transcode("long.html").await.unwrap();
    sink.write(b"<p>first part</p>").await.unwrap();
    assert_eq!(sink.bytes_written(), 17);
    sink.abort().await.unwrap();
    assert_eq!(session.state(), SessionState::Failed);

    session.reset().await.unwrap();
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session.feed_document("short.html", b"<p>ok</p>").await.unwrap();
    assert!(output.data.is_some());
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(log.aborts, 1);
    assert_eq!(log.resets, 1);
}

#[tokio::test]
async fn test_dropped_sink_fails_the_run_and_aborts_on_close() {
    let engine = FakeEngine::start().await;
    let out = TempDir::new().unwrap();
    let target = out.path().join("never.pdf");
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::file(&target)).unwrap();

    {
        let mut sink = session.transcode("dropped.html").await.unwrap();
        sink.write(b"<p>partial</p>").await.unwrap();
    }
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);

    session.close().await;
    let log = engine.wait_closed().await;
    assert_eq!(log.aborts, 1);
}

#[tokio::test]
async fn test_failed_output_does_not_leak_into_the_next_run() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    drop(rx);
    session.set_output(OutputDestination::Channel(tx)).unwrap();

    let err = session
        .feed_document("first.html", b"<p>first</p>")
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::OutputClosed), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);

    session.reset().await.unwrap();
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session
        .feed_document("second.html", b"<p>second</p>")
        .await
        .unwrap();
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(output.data.as_deref(), Some(log.output.as_slice()));
    assert!(String::from_utf8_lossy(&log.output).contains("source: second.html"));
    assert_eq!(output.stats.document_bytes, 13);
    assert_eq!(log.resets, 1);
}

#[tokio::test]
async fn test_out_of_range_chunk_size_is_clamped() {
    let engine = FakeEngine::start().await;
    let mut config = engine.config();
    config.chunk_size = 0;
    let html = "z".repeat(3000);

    let mut session = Session::open(config).await.unwrap();
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session
        .feed_document("zeros.html", html.as_bytes())
        .await
        .unwrap();
    session.close().await;

    assert_eq!(output.stats.document_bytes, 3000);
    assert_eq!(engine.wait_closed().await.document, html.as_bytes());
}

#[tokio::test]
async fn test_engine_abort_moves_session_to_failed() {
    let engine = FakeEngine::start().await;
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();

    let err = session
        .feed_document("bad.html", b"<!-- engine-abort -->")
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::Engine { code: 0x3001, .. }));
    assert_eq!(session.state(), SessionState::Failed);

    // Cleanup still works and nothing is left to abort.
    session.close().await;
    let log = engine.wait_closed().await;
    assert!(log.closed);
    assert_eq!(log.aborts, 0);
}

#[tokio::test]
async fn test_silent_engine_hits_the_io_timeout() {
    let engine = FakeEngine::start().await;
    let mut config = engine.config();
    config.io_timeout_secs = 1;
    let mut session = Session::open(config).await.unwrap();
    session.set_output(OutputDestination::Memory).unwrap();

    let err = session
        .feed_document("slow.html", b"<!-- engine-stall -->")
        .await
        .unwrap_err();
    assert!(matches!(err, TranscodeError::Timeout { .. }), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

// ── Server-side documents & streaming ────────────────────────────────────────

#[tokio::test]
async fn test_server_main_document_still_uses_the_resolver() {
    let engine = FakeEngine::start().await;
    let res = TempDir::new().unwrap();
    std::fs::write(res.path().join("server-logo.png"), b"PNGDATA").unwrap();

    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    session.set_resolver(resolver_for(&res)).unwrap();
    let output = session
        .transcode_server("http://intranet.example/report.html")
        .await
        .unwrap();
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(
        log.server_main_uri.as_deref(),
        Some("http://intranet.example/report.html")
    );
    assert_eq!(log.resource("server-logo.png"), Some(Some(b"PNGDATA".to_vec())));
    assert_eq!(output.stats.resources_found, 1);
    assert_eq!(output.stats.document_bytes, 0);
}

#[tokio::test]
async fn test_stream_yields_the_engine_output() {
    let engine = FakeEngine::start().await;
    let res = TempDir::new().unwrap();
    std::fs::write(res.path().join("logo.png"), b"PNG").unwrap();

    let mut chunks = convert_stream(
        br#"<img src="logo.png">"#.to_vec(),
        "index.html",
        SearchPath::new(res.path()),
        engine.config(),
    )
    .await
    .unwrap();

    let mut received = Vec::new();
    let mut count = 0;
    while let Some(chunk) = chunks.next().await {
        received.extend_from_slice(&chunk.unwrap());
        count += 1;
    }
    assert!(count >= 2, "output should arrive in several chunks");
    assert_eq!(received, engine.wait_closed().await.output);
}

#[tokio::test]
async fn test_dropping_the_stream_stops_the_conversion() {
    let engine = FakeEngine::start().await;
    let res = TempDir::new().unwrap();

    let chunks = convert_stream(
        b"<p>nobody is listening</p>".to_vec(),
        "gone.html",
        SearchPath::new(res.path()),
        engine.config(),
    )
    .await
    .unwrap();
    drop(chunks);

    let log = engine.wait_closed().await;
    assert!(log.closed);
    // The run never reached EOF, so the engine produced nothing.
    assert!(log.output.is_empty());
}

#[tokio::test]
async fn test_stream_reports_late_failure_as_last_item() {
    let engine = FakeEngine::start().await;
    let res = TempDir::new().unwrap();

    let chunks = convert_stream(
        b"<!-- engine-abort -->".to_vec(),
        "bad.html",
        SearchPath::new(res.path()),
        engine.config(),
    )
    .await
    .unwrap();

    let items: Vec<_> = chunks.collect().await;
    assert!(matches!(
        items.last(),
        Some(Err(TranscodeError::Engine { code: 0x3001, .. }))
    ));
}

// ── Resolver contract ────────────────────────────────────────────────────────

/// Exercises every way a resolver can treat its response handle.
#[derive(Default)]
struct ScriptedResolver {
    calls: AtomicUsize,
}

impl ResourceResolver for ScriptedResolver {
    fn resolve(&self, uri: &str, response: ResourceResponse<'_>) -> ResolutionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let not_found = || {
            ResolutionOutcome::NotFound(ResourceError::NotFound {
                uri: uri.to_string(),
            })
        };
        match uri {
            "inline.css" => {
                let mut sink = response.found_with_mime("text/css");
                sink.write_all(b"p { margin: 0 }").unwrap();
                sink.close();
                ResolutionOutcome::Found {
                    path: PathBuf::from("inline.css"),
                    origin: Origin::Other,
                    bytes: 15,
                }
            }
            "dropped.css" => {
                let mut sink = response.found();
                sink.write_all(b"half a stylesh").unwrap();
                not_found()
            }
            "discarded.css" => {
                response.found().discard();
                not_found()
            }
            "panics.css" => panic!("resolver bug"),
            _ => not_found(),
        }
    }
}

#[tokio::test]
async fn test_every_resolver_path_answers_the_engine_exactly_once() {
    let engine = FakeEngine::start().await;
    let resolver = Arc::new(ScriptedResolver::default());
    let mut session = connected(&engine).await;
    session.set_output(OutputDestination::Memory).unwrap();
    session.set_resolver(resolver.clone()).unwrap();

    let html = br#"<link href="inline.css"><link href="dropped.css">
<link href="discarded.css"><link href="panics.css"><link href="unknown.css">"#;
    let output = session.feed_document("r.html", html).await.unwrap();
    session.close().await;

    let log = engine.wait_closed().await;
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);
    assert_eq!(log.resources.len(), 5);
    assert_eq!(log.resource("inline.css"), Some(Some(b"p { margin: 0 }".to_vec())));
    for uri in ["dropped.css", "discarded.css", "panics.css", "unknown.css"] {
        assert_eq!(log.requests_for(uri), 1, "{uri}");
        assert_eq!(log.resource(uri), Some(None), "{uri}");
    }
    assert_eq!(output.stats.resources_found, 1);
    assert_eq!(output.stats.resources_missing, 4);
    assert!(matches!(
        output.resources[0].status,
        ResourceStatus::Found {
            origin: Origin::Other,
            bytes: 15,
            ..
        }
    ));
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tracker {
    connected: AtomicUsize,
    read: AtomicU64,
    length: AtomicU64,
    resources: AtomicUsize,
    warnings: AtomicUsize,
    completed: AtomicU64,
}

impl TranscodeProgressCallback for Tracker {
    fn on_connected(&self, _endpoint: &str) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }
    fn on_main_length(&self, total: u64) {
        self.length.store(total, Ordering::SeqCst);
    }
    fn on_main_read(&self, read: u64) {
        self.read.fetch_max(read, Ordering::SeqCst);
    }
    fn on_resource(&self, _uri: &str, _status: &ResourceStatus) {
        self.resources.fetch_add(1, Ordering::SeqCst);
    }
    fn on_message(&self, _message: &EngineMessage) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
    }
    fn on_complete(&self, output_bytes: u64) {
        self.completed.store(output_bytes, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_progress_events_follow_the_run() {
    let engine = FakeEngine::start().await;
    let tracker = Arc::new(Tracker::default());
    let mut config = engine.config();
    config.progress_callback = Some(tracker.clone());

    let html = br#"<img src="a.png"><img src="b.png">"#;
    let mut session = Session::open(config).await.unwrap();
    session.set_output(OutputDestination::Memory).unwrap();
    let output = session.feed_document("p.html", html).await.unwrap();
    session.close().await;

    assert_eq!(tracker.connected.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.read.load(Ordering::SeqCst), html.len() as u64);
    assert_eq!(tracker.length.load(Ordering::SeqCst), html.len() as u64);
    assert_eq!(tracker.resources.load(Ordering::SeqCst), 2);
    assert_eq!(tracker.warnings.load(Ordering::SeqCst), 2);
    assert_eq!(
        tracker.completed.load(Ordering::SeqCst),
        output.stats.output_bytes
    );
}
