//! CTIP 2.0 style wire protocol spoken with the transcoding engine.
//!
//! ## Message Flow
//!
//! ```text
//! client                                   engine
//!   │ CTIP/2.0 UTF-8\n                       │
//!   │ PLAIN: user password\n                 │
//!   │                                  OK\n  │
//!   │ PROPERTY* CLIENT_RESOURCE START_MAIN   │
//!   │ DATA ───────────────────────────────▶  │
//!   │  ◀─────────── RESOURCE_REQUEST (0..n)  │
//!   │ START_RESOURCE DATA* EOF | MISSING ──▶ │
//!   │  ◀──────────────────────────── NEXT    │
//!   │ ... more DATA ...                      │
//!   │ EOF ────────────────────────────────▶  │
//!   │  ◀── START_DATA DATA* MESSAGE* ... EOF │
//!   │ CLOSE ──────────────────────────────▶  │
//! ```
//!
//! Both directions are typed here so the engine side can be simulated in
//! tests with the same codec.

pub mod codec;
pub mod connection;

pub use codec::{read_frame, read_line, write_frame, PayloadReader, PayloadWriter};
pub use connection::{Connection, HandshakeReply};

use crate::error::TranscodeError;

/// First handshake line sent by the client.
pub const PROTOCOL_HEADER: &str = "CTIP/2.0 UTF-8";

// Request (client → engine) frame types.
pub const REQ_PROPERTY: u8 = 0x01;
pub const REQ_START_MAIN: u8 = 0x02;
pub const REQ_SERVER_MAIN: u8 = 0x03;
pub const REQ_CLIENT_RESOURCE: u8 = 0x04;
pub const REQ_DATA: u8 = 0x11;
pub const REQ_START_RESOURCE: u8 = 0x21;
pub const REQ_MISSING_RESOURCE: u8 = 0x22;
pub const REQ_EOF: u8 = 0x31;
pub const REQ_ABORT: u8 = 0x32;
pub const REQ_RESET: u8 = 0x41;
pub const REQ_CLOSE: u8 = 0x42;

// Response (engine → client) frame types.
pub const RES_START_DATA: u8 = 0x01;
pub const RES_MESSAGE: u8 = 0x14;
pub const RES_MAIN_LENGTH: u8 = 0x15;
pub const RES_MAIN_READ: u8 = 0x16;
pub const RES_DATA: u8 = 0x17;
pub const RES_RESOURCE_REQUEST: u8 = 0x21;
pub const RES_EOF: u8 = 0x31;
pub const RES_ABORT: u8 = 0x32;
pub const RES_NEXT: u8 = 0x33;

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Property { name: String, value: String },
    StartMain { uri: String },
    ServerMain { uri: String },
    ClientResource { enabled: bool },
    Data(Vec<u8>),
    StartResource {
        uri: String,
        mime_type: String,
        encoding: String,
        length: Option<u64>,
    },
    MissingResource { uri: String },
    Eof,
    Abort { force: bool },
    Reset,
    Close,
}

impl Request {
    pub fn kind(&self) -> u8 {
        match self {
            Request::Property { .. } => REQ_PROPERTY,
            Request::StartMain { .. } => REQ_START_MAIN,
            Request::ServerMain { .. } => REQ_SERVER_MAIN,
            Request::ClientResource { .. } => REQ_CLIENT_RESOURCE,
            Request::Data(_) => REQ_DATA,
            Request::StartResource { .. } => REQ_START_RESOURCE,
            Request::MissingResource { .. } => REQ_MISSING_RESOURCE,
            Request::Eof => REQ_EOF,
            Request::Abort { .. } => REQ_ABORT,
            Request::Reset => REQ_RESET,
            Request::Close => REQ_CLOSE,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let w = PayloadWriter::new();
        match self {
            Request::Property { name, value } => w.str(name).str(value),
            Request::StartMain { uri }
            | Request::ServerMain { uri }
            | Request::MissingResource { uri } => w.str(uri),
            Request::ClientResource { enabled } => w.u8(u8::from(*enabled)),
            Request::Data(bytes) => w.bytes(bytes),
            Request::StartResource {
                uri,
                mime_type,
                encoding,
                length,
            } => w
                .str(uri)
                .str(mime_type)
                .str(encoding)
                .i64(encode_length(*length)),
            Request::Abort { force } => w.u8(u8::from(*force)),
            Request::Eof | Request::Reset | Request::Close => w,
        }
        .finish()
    }

    pub fn decode(kind: u8, payload: &[u8]) -> Result<Self, TranscodeError> {
        let mut r = PayloadReader::new(payload);
        let req = match kind {
            REQ_PROPERTY => Request::Property {
                name: r.str()?,
                value: r.str()?,
            },
            REQ_START_MAIN => Request::StartMain { uri: r.str()? },
            REQ_SERVER_MAIN => Request::ServerMain { uri: r.str()? },
            REQ_CLIENT_RESOURCE => Request::ClientResource {
                enabled: r.u8()? != 0,
            },
            REQ_DATA => Request::Data(r.rest().to_vec()),
            REQ_START_RESOURCE => Request::StartResource {
                uri: r.str()?,
                mime_type: r.str()?,
                encoding: r.str()?,
                length: decode_length(r.i64()?),
            },
            REQ_MISSING_RESOURCE => Request::MissingResource { uri: r.str()? },
            REQ_EOF => Request::Eof,
            REQ_ABORT => Request::Abort { force: r.u8()? != 0 },
            REQ_RESET => Request::Reset,
            REQ_CLOSE => Request::Close,
            other => {
                return Err(TranscodeError::Protocol(format!(
                    "unknown request type {other:#04x}"
                )))
            }
        };
        Ok(req)
    }
}

/// A frame sent by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    StartData {
        uri: String,
        mime_type: String,
        encoding: String,
        length: Option<u64>,
    },
    Message {
        code: u16,
        message: String,
        args: Vec<String>,
    },
    MainLength(u64),
    MainRead(u64),
    Data(Vec<u8>),
    ResourceRequest { uri: String },
    Eof,
    Abort {
        force: bool,
        code: u16,
        message: String,
    },
    Next,
}

impl Response {
    pub fn kind(&self) -> u8 {
        match self {
            Response::StartData { .. } => RES_START_DATA,
            Response::Message { .. } => RES_MESSAGE,
            Response::MainLength(_) => RES_MAIN_LENGTH,
            Response::MainRead(_) => RES_MAIN_READ,
            Response::Data(_) => RES_DATA,
            Response::ResourceRequest { .. } => RES_RESOURCE_REQUEST,
            Response::Eof => RES_EOF,
            Response::Abort { .. } => RES_ABORT,
            Response::Next => RES_NEXT,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let w = PayloadWriter::new();
        match self {
            Response::StartData {
                uri,
                mime_type,
                encoding,
                length,
            } => w
                .str(uri)
                .str(mime_type)
                .str(encoding)
                .i64(encode_length(*length)),
            Response::Message {
                code,
                message,
                args,
            } => args
                .iter()
                .fold(w.u16(*code).str(message).u16(args.len() as u16), |w, a| {
                    w.str(a)
                }),
            Response::MainLength(n) | Response::MainRead(n) => w.i64(encode_length(Some(*n))),
            Response::Data(bytes) => w.bytes(bytes),
            Response::ResourceRequest { uri } => w.str(uri),
            Response::Abort {
                force,
                code,
                message,
            } => w.u8(u8::from(*force)).u16(*code).str(message),
            Response::Eof | Response::Next => w,
        }
        .finish()
    }

    pub fn decode(kind: u8, payload: &[u8]) -> Result<Self, TranscodeError> {
        let mut r = PayloadReader::new(payload);
        let res = match kind {
            RES_START_DATA => Response::StartData {
                uri: r.str()?,
                mime_type: r.str()?,
                encoding: r.str()?,
                length: decode_length(r.i64()?),
            },
            RES_MESSAGE => {
                let code = r.u16()?;
                let message = r.str()?;
                let argc = r.u16()?;
                let args = (0..argc).map(|_| r.str()).collect::<Result<Vec<_>, _>>()?;
                Response::Message {
                    code,
                    message,
                    args,
                }
            }
            RES_MAIN_LENGTH => Response::MainLength(decode_length(r.i64()?).unwrap_or(0)),
            RES_MAIN_READ => Response::MainRead(decode_length(r.i64()?).unwrap_or(0)),
            RES_DATA => Response::Data(r.rest().to_vec()),
            RES_RESOURCE_REQUEST => Response::ResourceRequest { uri: r.str()? },
            RES_EOF => Response::Eof,
            RES_ABORT => Response::Abort {
                force: r.u8()? != 0,
                code: r.u16()?,
                message: r.str()?,
            },
            RES_NEXT => Response::Next,
            other => {
                return Err(TranscodeError::Protocol(format!(
                    "unknown response type {other:#04x}"
                )))
            }
        };
        Ok(res)
    }
}

/// `-1` on the wire means "unknown".
fn encode_length(length: Option<u64>) -> i64 {
    length
        .and_then(|n| i64::try_from(n).ok())
        .unwrap_or(-1)
}

fn decode_length(raw: i64) -> Option<u64> {
    u64::try_from(raw).ok()
}
