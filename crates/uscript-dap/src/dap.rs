//! Async DAP message framing.
//!
//! DAP messages are JSON bodies behind an HTTP-like header section:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! { ...json... }
//! ```

use std::io;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a message body; a larger Content-Length is rejected before
/// any allocation happens.
pub const MAX_DAP_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on a single header line.
pub const MAX_DAP_HEADER_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum DapError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("DAP message missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),

    #[error("DAP message Content-Length {0} exceeds maximum allowed size")]
    Oversized(usize),

    #[error("DAP header line exceeds maximum size")]
    HeaderLineTooLong,

    #[error("DAP header line is not UTF-8")]
    HeaderLineNotUtf8,

    #[error("EOF while reading DAP headers")]
    EofInHeaders,

    #[error("malformed DAP message: {0}")]
    Json(#[from] serde_json::Error),
}

/// The request envelope; arguments stay as raw JSON so each handler can
/// deserialize its own shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

pub struct DapReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read one framed JSON value; `None` on a clean EOF between messages.
    pub async fn read_value(&mut self) -> Result<Option<Value>, DapError> {
        let mut content_length: Option<usize> = None;
        let mut saw_header_line = false;

        loop {
            let Some(line) = self.read_line_limited(MAX_DAP_HEADER_LINE_BYTES).await? else {
                if !saw_header_line {
                    return Ok(None);
                }
                return Err(DapError::EofInHeaders);
            };
            saw_header_line = true;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("Content-Length") {
                    let value = value.trim();
                    content_length = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| DapError::InvalidContentLength(value.to_owned()))?,
                    );
                }
            }
        }

        let content_length = content_length.ok_or(DapError::MissingContentLength)?;
        if content_length > MAX_DAP_MESSAGE_BYTES {
            return Err(DapError::Oversized(content_length));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Read the next message as a request envelope.
    pub async fn read_request(&mut self) -> Result<Option<Request>, DapError> {
        let Some(value) = self.read_value().await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn read_line_limited(&mut self, max_len: usize) -> Result<Option<String>, DapError> {
        let mut line = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let take = newline.map(|pos| pos + 1).unwrap_or(available.len());
            if line.len() + take > max_len {
                return Err(DapError::HeaderLineTooLong);
            }

            line.extend_from_slice(&available[..take]);
            self.reader.consume(take);
            if newline.is_some() {
                break;
            }
        }

        String::from_utf8(line)
            .map(Some)
            .map_err(|_| DapError::HeaderLineNotUtf8)
    }
}

pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_value(&mut self, message: &Value) -> Result<(), DapError> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

pub fn make_response(
    seq: i64,
    request: &Request,
    success: bool,
    body: Option<Value>,
    message: Option<String>,
) -> Value {
    let mut response = json!({
        "seq": seq,
        "type": "response",
        "request_seq": request.seq,
        "command": request.command,
        "success": success,
    });
    if let Some(body) = body {
        response["body"] = body;
    }
    if let Some(message) = message {
        response["message"] = Value::String(message);
    }
    response
}

pub fn make_event(seq: i64, event: &str, body: Option<Value>) -> Value {
    let mut message = json!({
        "seq": seq,
        "type": "event",
        "event": event,
    });
    if let Some(body) = body {
        message["body"] = body;
    }
    message
}
