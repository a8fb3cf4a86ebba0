//! Frame and payload encoding.
//!
//! A frame is `u32 BE length`, one type byte, then `length - 1` payload bytes.
//! Inside a payload, strings are `u16 BE length` + UTF-8 and integers are
//! big-endian.

use crate::error::TranscodeError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted from the peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Longest handshake line accepted from the peer.
pub const MAX_LINE_LEN: usize = 1024;

/// Write one frame.
pub async fn write_frame<W>(w: &mut W, kind: u8, payload: &[u8]) -> Result<(), TranscodeError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(TranscodeError::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN}-byte limit"
        )));
    }
    let mut buf = Vec::with_capacity(4 + len);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf.push(kind);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read one frame, returning its type byte and payload.
pub async fn read_frame<R>(r: &mut R) -> Result<(u8, Vec<u8>), TranscodeError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(TranscodeError::Protocol("empty frame".into()));
    }
    if len > MAX_FRAME_LEN {
        return Err(TranscodeError::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN}-byte limit"
        )));
    }
    let kind = r.read_u8().await?;
    let mut payload = vec![0u8; len - 1];
    r.read_exact(&mut payload).await?;
    Ok((kind, payload))
}

/// Read one `\n`-terminated line, without the terminator.
///
/// Reads byte by byte so nothing past the line is consumed.
pub async fn read_line<R>(r: &mut R) -> Result<String, TranscodeError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let b = r.read_u8().await?;
        if b == b'\n' {
            break;
        }
        if line.len() == MAX_LINE_LEN {
            return Err(TranscodeError::Protocol("handshake line too long".into()));
        }
        line.push(b);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map_err(|_| TranscodeError::Protocol("handshake line is not UTF-8".into()))
}

// ── Payload builders ─────────────────────────────────────────────────────

/// Builds a frame payload.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Strings longer than `u16::MAX` bytes are truncated at a char boundary.
    pub fn str(mut self, s: &str) -> Self {
        let mut end = s.len().min(u16::MAX as usize);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.extend_from_slice(&(end as u16).to_be_bytes());
        self.buf.extend_from_slice(&s.as_bytes()[..end]);
        self
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received frame payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TranscodeError> {
        if self.buf.len() - self.pos < n {
            return Err(TranscodeError::Protocol(format!(
                "truncated payload: wanted {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, TranscodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, TranscodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i64(&mut self) -> Result<i64, TranscodeError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    pub fn str(&mut self) -> Result<String, TranscodeError> {
        let len = self.u16()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec())
            .map_err(|_| TranscodeError::Protocol("string field is not UTF-8".into()))
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}
