//! In-process fake transcoding engine speaking the CTIP framing over loopback.
//!
//! It "converts" by echoing a small text report: the document size and what
//! happened to each resource it asked for. Resources are requested as soon
//! as a complete `src="..."` or `href="..."` reference has arrived, before
//! the DATA frame is acknowledged, which is how a real engine interleaves
//! callbacks with document consumption.
//!
//! Markers in the document change its behaviour:
//! - `<!-- engine-abort -->`  the engine aborts the run with code 0x3001
//! - `<!-- engine-stall -->`  the engine stops answering

#![allow(dead_code)]

use edgequake_html2pdf::protocol::{read_frame, read_line, write_frame, Request, Response};
use edgequake_html2pdf::{SessionConfig, TranscodeError};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const USER: &str = "user";
pub const PASSWORD: &str = "kappa";

/// Document the engine "fetches" for SERVER_MAIN requests.
pub const SERVER_DOCUMENT: &str = r#"<html><img src="server-logo.png"></html>"#;

/// Everything the engine observed, shared with the test.
#[derive(Debug, Default, Clone)]
pub struct EngineLog {
    pub connections: usize,
    pub authenticated: usize,
    pub properties: Vec<(String, String)>,
    pub client_resource: Option<bool>,
    pub main_uri: Option<String>,
    pub server_main_uri: Option<String>,
    pub document: Vec<u8>,
    /// `(uri, Some(bytes))` for delivered resources, `(uri, None)` for missing.
    pub resources: Vec<(String, Option<Vec<u8>>)>,
    /// Exact bytes sent back as output for the last run.
    pub output: Vec<u8>,
    pub aborts: usize,
    pub resets: usize,
    pub closed: bool,
}

impl EngineLog {
    /// How the engine saw `uri`: `Some(Some(bytes))`, `Some(None)` if missing,
    /// `None` if never requested.
    pub fn resource(&self, uri: &str) -> Option<Option<Vec<u8>>> {
        self.resources
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, b)| b.clone())
    }

    pub fn requests_for(&self, uri: &str) -> usize {
        self.resources.iter().filter(|(u, _)| u == uri).count()
    }
}

pub struct FakeEngine {
    pub addr: SocketAddr,
    log: Arc<Mutex<EngineLog>>,
    _handle: JoinHandle<()>,
}

impl FakeEngine {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(EngineLog::default()));
        let shared = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, log).await;
                });
            }
        });
        Self {
            addr,
            log,
            _handle: handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("ctip://{}/", self.addr)
    }

    /// Config with valid credentials and short timeouts.
    pub fn config(&self) -> SessionConfig {
        SessionConfig::builder()
            .endpoint(self.endpoint())
            .user(USER)
            .password(PASSWORD)
            .connect_timeout_secs(5)
            .io_timeout_secs(10)
            .build()
            .unwrap()
    }

    pub fn log(&self) -> EngineLog {
        self.log.lock().unwrap().clone()
    }

    /// Wait until the client's CLOSE has been processed.
    pub async fn wait_closed(&self) -> EngineLog {
        for _ in 0..200 {
            let log = self.log();
            if log.closed {
                return log;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.log()
    }
}

// ── Engine side ──────────────────────────────────────────────────────────

struct Run {
    uri: String,
    document: Vec<u8>,
    requested: Vec<String>,
}

async fn serve(mut stream: TcpStream, log: Arc<Mutex<EngineLog>>) -> Result<(), TranscodeError> {
    log.lock().unwrap().connections += 1;

    let header = read_line(&mut stream).await?;
    let auth = read_line(&mut stream).await?;
    let expected = format!("PLAIN: {USER} {PASSWORD}");
    if header != "CTIP/2.0 UTF-8" || auth != expected {
        stream.write_all(b"NG \n").await?;
        return Ok(());
    }
    stream.write_all(b"OK \n").await?;
    log.lock().unwrap().authenticated += 1;

    let mut run: Option<Run> = None;
    loop {
        let (kind, payload) = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(_) => return Ok(()),
        };
        match Request::decode(kind, &payload)? {
            Request::Property { name, value } => {
                log.lock().unwrap().properties.push((name, value));
            }
            Request::ClientResource { enabled } => {
                log.lock().unwrap().client_resource = Some(enabled);
            }
            Request::StartMain { uri } => {
                let mut l = log.lock().unwrap();
                l.main_uri = Some(uri.clone());
                l.document.clear();
                l.resources.clear();
                l.output.clear();
                drop(l);
                run = Some(Run {
                    uri,
                    document: Vec::new(),
                    requested: Vec::new(),
                });
            }
            Request::ServerMain { uri } => {
                {
                    let mut l = log.lock().unwrap();
                    l.server_main_uri = Some(uri.clone());
                    l.resources.clear();
                    l.output.clear();
                }
                let mut server_run = Run {
                    uri,
                    document: SERVER_DOCUMENT.as_bytes().to_vec(),
                    requested: Vec::new(),
                };
                request_new_references(&mut stream, &log, &mut server_run).await?;
                produce_output(&mut stream, &log, &server_run).await?;
            }
            Request::Data(bytes) => {
                let Some(current) = run.as_mut() else {
                    continue;
                };
                current.document.extend_from_slice(&bytes);
                log.lock().unwrap().document = current.document.clone();

                let text = String::from_utf8_lossy(&current.document).into_owned();
                if text.contains("<!-- engine-stall -->") {
                    // Never answer again, but keep the socket open.
                    std::future::pending::<()>().await;
                }
                request_new_references(&mut stream, &log, current).await?;
                if text.contains("<!-- engine-abort -->") {
                    send(
                        &mut stream,
                        Response::Abort {
                            force: false,
                            code: 0x3001,
                            message: "document rejected".into(),
                        },
                    )
                    .await?;
                    run = None;
                    continue;
                }
                send(&mut stream, Response::MainRead(current.document.len() as u64)).await?;
                send(&mut stream, Response::Next).await?;
            }
            Request::Eof => {
                if let Some(mut finished) = run.take() {
                    request_new_references(&mut stream, &log, &mut finished).await?;
                    produce_output(&mut stream, &log, &finished).await?;
                }
            }
            Request::Abort { force } => {
                log.lock().unwrap().aborts += 1;
                run = None;
                send(
                    &mut stream,
                    Response::Abort {
                        force,
                        code: 0,
                        message: "aborted by client".into(),
                    },
                )
                .await?;
            }
            Request::Reset => {
                log.lock().unwrap().resets += 1;
                run = None;
            }
            Request::Close => {
                log.lock().unwrap().closed = true;
                return Ok(());
            }
            other => {
                return Err(TranscodeError::Protocol(format!(
                    "unexpected request {other:?}"
                )))
            }
        }
    }
}

async fn send(stream: &mut TcpStream, response: Response) -> Result<(), TranscodeError> {
    write_frame(stream, response.kind(), &response.payload()).await
}

/// Ask for every complete reference not requested yet.
async fn request_new_references(
    stream: &mut TcpStream,
    log: &Arc<Mutex<EngineLog>>,
    run: &mut Run,
) -> Result<(), TranscodeError> {
    let text = String::from_utf8_lossy(&run.document).into_owned();
    for uri in references(&text) {
        if run.requested.contains(&uri) {
            continue;
        }
        run.requested.push(uri.clone());
        send(stream, Response::ResourceRequest { uri: uri.clone() }).await?;
        let answer = read_resource_answer(stream).await?;
        log.lock().unwrap().resources.push((uri, answer));
    }
    Ok(())
}

async fn read_resource_answer(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, TranscodeError> {
    let (kind, payload) = read_frame(stream).await?;
    match Request::decode(kind, &payload)? {
        Request::MissingResource { .. } => Ok(None),
        Request::StartResource { length, .. } => {
            let mut bytes = Vec::new();
            loop {
                let (kind, payload) = read_frame(stream).await?;
                match Request::decode(kind, &payload)? {
                    Request::Data(chunk) => bytes.extend_from_slice(&chunk),
                    Request::Eof => break,
                    other => {
                        return Err(TranscodeError::Protocol(format!(
                            "unexpected {other:?} inside a resource"
                        )))
                    }
                }
            }
            if let Some(expected) = length {
                assert_eq!(expected, bytes.len() as u64, "announced resource length");
            }
            Ok(Some(bytes))
        }
        other => Err(TranscodeError::Protocol(format!(
            "expected a resource answer, got {other:?}"
        ))),
    }
}

async fn produce_output(
    stream: &mut TcpStream,
    log: &Arc<Mutex<EngineLog>>,
    run: &Run,
) -> Result<(), TranscodeError> {
    let resources = log.lock().unwrap().resources.clone();

    let mut body = format!(
        "%PDF-FAKE\nsource: {}\ndocument-bytes: {}\n",
        run.uri,
        run.document.len()
    );
    for (uri, bytes) in &resources {
        match bytes {
            Some(b) => body.push_str(&format!("resource {uri}: {} bytes\n", b.len())),
            None => body.push_str(&format!("resource {uri}: missing\n")),
        }
    }
    body.push_str("%%EOF\n");
    let body = body.into_bytes();

    send(
        stream,
        Response::StartData {
            uri: run.uri.clone(),
            mime_type: "application/pdf".into(),
            encoding: String::new(),
            length: None,
        },
    )
    .await?;
    send(stream, Response::MainLength(run.document.len() as u64)).await?;
    let (first, second) = body.split_at(body.len() / 2);
    send(stream, Response::Data(first.to_vec())).await?;
    for (uri, bytes) in &resources {
        if bytes.is_none() {
            send(
                stream,
                Response::Message {
                    code: 0x2001,
                    message: format!("resource not found: {uri}"),
                    args: vec![uri.clone()],
                },
            )
            .await?;
        }
    }
    send(stream, Response::Data(second.to_vec())).await?;
    send(stream, Response::Eof).await?;

    log.lock().unwrap().output = body;
    Ok(())
}

/// `src="..."` and `href="..."` values whose closing quote has arrived.
pub fn references(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for attr in ["src=\"", "href=\""] {
        let mut rest = text;
        while let Some(start) = rest.find(attr) {
            let after = &rest[start + attr.len()..];
            match after.find('"') {
                Some(end) => {
                    found.push(after[..end].to_string());
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
    }
    found
}
