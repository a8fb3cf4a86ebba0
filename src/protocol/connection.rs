//! Framed, timeout-guarded connection to an engine.
//!
//! Generic over the stream so tests can drive it through an in-memory pipe.

use super::codec::{read_frame, read_line, write_frame};
use super::{Request, Response, PROTOCOL_HEADER};
use crate::error::TranscodeError;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// What the engine answered to the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    Accepted,
    Rejected(String),
}

/// One engine connection.
pub struct Connection<S> {
    stream: S,
    io_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Option<Duration>) -> Self {
        Self { stream, io_timeout }
    }

    /// Send the protocol header and credentials, then read the verdict.
    pub async fn handshake(
        &mut self,
        user: &str,
        password: &str,
    ) -> Result<HandshakeReply, TranscodeError> {
        let hello = format!("{PROTOCOL_HEADER}\nPLAIN: {user} {password}\n");
        let stream = &mut self.stream;
        with_timeout(self.io_timeout, "sending the handshake", async move {
            stream.write_all(hello.as_bytes()).await?;
            stream.flush().await?;
            Ok::<(), TranscodeError>(())
        })
        .await?;

        let line = with_timeout(
            self.io_timeout,
            "waiting for the handshake reply",
            read_line(&mut self.stream),
        )
        .await?;
        debug!("Handshake reply: {:?}", line);

        if line.trim_end() == "OK" {
            Ok(HandshakeReply::Accepted)
        } else {
            Ok(HandshakeReply::Rejected(line))
        }
    }

    pub async fn send(&mut self, request: &Request) -> Result<(), TranscodeError> {
        trace!("→ {:#04x}", request.kind());
        let payload = request.payload();
        with_timeout(
            self.io_timeout,
            "sending to the engine",
            write_frame(&mut self.stream, request.kind(), &payload),
        )
        .await
    }

    /// Send a DATA frame without copying the chunk into a [`Request`].
    pub async fn send_data(&mut self, chunk: &[u8]) -> Result<(), TranscodeError> {
        trace!("→ DATA {} bytes", chunk.len());
        with_timeout(
            self.io_timeout,
            "sending to the engine",
            write_frame(&mut self.stream, super::REQ_DATA, chunk),
        )
        .await
    }

    pub async fn recv(&mut self) -> Result<Response, TranscodeError> {
        let (kind, payload) = with_timeout(
            self.io_timeout,
            "waiting for the engine",
            read_frame(&mut self.stream),
        )
        .await
        .map_err(|e| match e {
            TranscodeError::Transport(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                TranscodeError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by the engine",
                ))
            }
            other => other,
        })?;
        trace!("← {:#04x} ({} bytes)", kind, payload.len());
        Response::decode(kind, &payload)
    }

    /// Best-effort shutdown of the write half.
    pub async fn shutdown(&mut self) {
        let stream = &mut self.stream;
        if let Err(e) = with_timeout(self.io_timeout, "closing the connection", async move {
            stream.shutdown().await?;
            Ok::<(), TranscodeError>(())
        })
        .await
        {
            debug!("Shutdown failed: {}", e);
        }
    }
}

async fn with_timeout<T, F>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, TranscodeError>
where
    F: Future<Output = Result<T, TranscodeError>>,
{
    match limit {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| TranscodeError::Timeout {
                operation,
                secs: d.as_secs(),
            })?,
        None => fut.await,
    }
}
