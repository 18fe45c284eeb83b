//! Wire format shared by the session server, the multi-port server and the
//! clients.
//!
//! Integers are 4-byte little-endian `i32`, timestamps 8-byte little-endian
//! `i64` Unix seconds. Strings are raw bytes followed by one NUL; there is no
//! length prefix and no escaping. Credentials travel in fixed 50-byte
//! zero-padded fields.

use std::borrow::Cow;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use crate::common::config::ProtocolConfig;

// Field sizes
pub const CREDENTIAL_FIELD_LEN: usize = 50;
pub const PAYLOAD_MAX_LEN: usize = 256;
pub const RESPONSE_MAX_LEN: usize = 4096;

// Authentication result codes
pub const AUTH_SUCCESS: i32 = 1;
pub const AUTH_FAILURE: i32 = 0;

// Selectors
pub const SELECTOR_QUIT: i32 = 0;
pub const SELECTOR_CLOCK: i32 = 1;
pub const SELECTOR_LIST_DIRECTORY: i32 = 2;
pub const SELECTOR_READ_FILE: i32 = 3;
pub const SELECTOR_ELAPSED_SINCE: i32 = 4;

// Status prefix values (only sent when `status_prefix` is enabled)
pub const STATUS_SUCCESS: u8 = 1;
pub const STATUS_FAILURE: u8 = 0;

/// Every textual error payload starts with this.
pub const ERROR_PREFIX: &str = "Erreur:";

pub fn write_i32<W: Write>(w: &mut W, value: i32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_i64<W: Write>(w: &mut W, value: i64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Writes `s` followed by one zero byte.
pub fn write_cstring<W: Write>(w: &mut W, s: &[u8]) -> io::Result<()> {
    w.write_all(s)?;
    w.write_all(&[0])
}

/// Reads until a zero byte or until `max_len` bytes were consumed.
///
/// The terminator is consumed but not returned. End of stream before any byte
/// is `UnexpectedEof`; end of stream after some bytes returns what arrived.
pub fn read_cstring<R: Read>(r: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut consumed = 0;

    for byte in r.bytes() {
        let byte = byte?;
        consumed += 1;
        if byte == 0 {
            return Ok(out);
        }
        out.push(byte);
        if consumed == max_len {
            return Ok(out);
        }
    }

    if consumed == 0 && max_len > 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed before string"));
    }
    Ok(out)
}

/// Writes exactly `len` bytes: `s` truncated or zero-padded.
pub fn write_fixed<W: Write>(w: &mut W, s: &[u8], len: usize) -> io::Result<()> {
    let mut field = vec![0u8; len];
    let n = s.len().min(len);
    field[..n].copy_from_slice(&s[..n]);
    w.write_all(&field)
}

/// Reads exactly `len` bytes and keeps everything before the first zero.
pub fn read_fixed<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut field = vec![0u8; len];
    r.read_exact(&mut field)?;
    truncate_at_nul(&mut field);
    Ok(field)
}

fn truncate_at_nul(bytes: &mut Vec<u8>) {
    if let Some(pos) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(pos);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Clock,
    ListDirectory,
    ReadFile,
    ElapsedSince,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Clock,
        ServiceKind::ListDirectory,
        ServiceKind::ReadFile,
        ServiceKind::ElapsedSince,
    ];

    pub fn selector(self) -> i32 {
        match self {
            ServiceKind::Clock => SELECTOR_CLOCK,
            ServiceKind::ListDirectory => SELECTOR_LIST_DIRECTORY,
            ServiceKind::ReadFile => SELECTOR_READ_FILE,
            ServiceKind::ElapsedSince => SELECTOR_ELAPSED_SINCE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Clock => "clock",
            ServiceKind::ListDirectory => "list",
            ServiceKind::ReadFile => "read",
            ServiceKind::ElapsedSince => "duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Quit,
    Service(ServiceKind),
    Unknown(i32),
}

impl From<i32> for Selector {
    fn from(value: i32) -> Self {
        match value {
            SELECTOR_QUIT => Selector::Quit,
            SELECTOR_CLOCK => Selector::Service(ServiceKind::Clock),
            SELECTOR_LIST_DIRECTORY => Selector::Service(ServiceKind::ListDirectory),
            SELECTOR_READ_FILE => Selector::Service(ServiceKind::ReadFile),
            SELECTOR_ELAPSED_SINCE => Selector::Service(ServiceKind::ElapsedSince),
            other => Selector::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    Clock,
    ListDirectory { path: PathBuf },
    ReadFile { name: PathBuf },
    /// `start` is Unix seconds.
    ElapsedSince { start: i64 },
}

impl ServiceRequest {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceRequest::Clock => ServiceKind::Clock,
            ServiceRequest::ListDirectory { .. } => ServiceKind::ListDirectory,
            ServiceRequest::ReadFile { .. } => ServiceKind::ReadFile,
            ServiceRequest::ElapsedSince { .. } => ServiceKind::ElapsedSince,
        }
    }

    /// Reads the payload that follows the selector (or that opens a
    /// connection on a dedicated service port).
    pub fn read_payload<R: Read>(kind: ServiceKind, r: &mut R) -> io::Result<Self> {
        Ok(match kind {
            ServiceKind::Clock => ServiceRequest::Clock,
            ServiceKind::ListDirectory => ServiceRequest::ListDirectory { path: read_path(r)? },
            ServiceKind::ReadFile => ServiceRequest::ReadFile { name: read_path(r)? },
            ServiceKind::ElapsedSince => ServiceRequest::ElapsedSince { start: read_i64(r)? },
        })
    }

    pub fn write_payload<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            ServiceRequest::Clock => Ok(()),
            ServiceRequest::ListDirectory { path } => write_path(w, path),
            ServiceRequest::ReadFile { name } => write_path(w, name),
            ServiceRequest::ElapsedSince { start } => write_i64(w, *start),
        }
    }
}

// Paths are raw bytes on the wire, whatever their encoding.
fn read_path<R: Read>(r: &mut R) -> io::Result<PathBuf> {
    Ok(PathBuf::from(OsString::from_vec(read_cstring(r, PAYLOAD_MAX_LEN)?)))
}

// The server stops reading at PAYLOAD_MAX_LEN; keep room for the terminator.
fn write_path<W: Write>(w: &mut W, path: &Path) -> io::Result<()> {
    let bytes = path.as_os_str().as_bytes();
    write_cstring(w, &bytes[..bytes.len().min(PAYLOAD_MAX_LEN - 1)])
}

/// One service answer: a text body that always fits the response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub success: bool,
    body: Vec<u8>,
}

impl ServiceResponse {
    /// Truncates `body` at the first zero byte and to `RESPONSE_MAX_LEN - 1`.
    pub fn new(success: bool, mut body: Vec<u8>) -> Self {
        truncate_at_nul(&mut body);
        body.truncate(RESPONSE_MAX_LEN - 1);
        Self { success, body }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(true, body.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(false, message.into().into_bytes())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn write_to<W: Write>(&self, w: &mut W, protocol: ProtocolConfig) -> io::Result<()> {
        if protocol.status_prefix {
            let status = if self.success { STATUS_SUCCESS } else { STATUS_FAILURE };
            w.write_all(&[status])?;
        }
        write_cstring(w, &self.body)?;
        w.flush()
    }

    pub fn read_from<R: Read>(r: &mut R, protocol: ProtocolConfig) -> io::Result<Self> {
        let flag = if protocol.status_prefix {
            let mut status = [0u8; 1];
            r.read_exact(&mut status)?;
            Some(status[0] == STATUS_SUCCESS)
        } else {
            None
        };

        let body = read_cstring(r, RESPONSE_MAX_LEN)?;
        let success = flag.unwrap_or_else(|| !body.starts_with(ERROR_PREFIX.as_bytes()));
        Ok(Self { success, body })
    }
}
