use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body. A frame larger than this is treated as
/// protocol corruption rather than a legitimate message; the largest real
/// messages are `unlock_list` batches, which stay far below this.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unknown {domain} kind {kind}")]
    UnknownKind { domain: &'static str, kind: u8 },

    #[error("invalid watch kind {0}")]
    InvalidWatchKind(i32),

    #[error("message truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("message length mismatch: declared {declared}, consumed {consumed}")]
    LengthMismatch { declared: usize, consumed: usize },

    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    #[error("frame length {0} exceeds maximum allowed size")]
    Oversized(usize),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Cursor over a received message body. All reads are bounds-checked; a
/// message must be consumed exactly to its end (see [`WireReader::finish`]).
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let chunk = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(chunk)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(WireError::NegativeLength(len));
        }
        let bytes = self.take(len as usize)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Assert the whole message was consumed; the protocol has no trailing
    /// padding, so leftover bytes mean the sender and receiver disagree about
    /// the message layout.
    pub fn finish(self) -> Result<(), WireError> {
        if self.pos != self.buf.len() {
            return Err(WireError::LengthMismatch {
                declared: self.buf.len(),
                consumed: self.pos,
            });
        }
        Ok(())
    }
}

/// Builder for a message body. Encoders size the buffer up front from the
/// computed message length and assert they filled it exactly.
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(len),
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish encoding, asserting the body came out at the pre-computed size.
    pub fn finish(self, expected: usize) -> Vec<u8> {
        debug_assert_eq!(
            self.buf.len(),
            expected,
            "encoded size disagrees with computed message length"
        );
        self.buf
    }
}

/// Serialized size of a length-prefixed string field.
pub(crate) fn string_len(s: &str) -> usize {
    4 + s.len()
}

/// Read one length-prefixed frame body. Returns `None` on a clean EOF at a
/// frame boundary; EOF inside a frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        // A frame body always carries at least the kind byte.
        return Err(WireError::Truncated {
            needed: 1,
            remaining: 0,
        });
    }
    if len > MAX_FRAME_BYTES {
        return Err(WireError::Oversized(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one frame: the 4-byte length header, then the body.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
