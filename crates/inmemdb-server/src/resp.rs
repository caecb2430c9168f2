use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// A single protocol frame.
///
/// Requests arrive as arrays of bulk strings; replies use every shape.
/// `Nil` covers both the `$-1` and `*-1` encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+text\r\n`
    Simple(Bytes),
    /// `-text\r\n`
    Error(Bytes),
    /// `:decimal\r\n`
    Integer(i64),
    /// `$len\r\n<bytes>\r\n`, binary safe
    Bulk(Bytes),
    /// `$-1\r\n`
    Nil,
    /// `*count\r\n<frames>`
    Array(Vec<Frame>),
}

impl Frame {
    /// The textual payload of a bulk or simple string frame.
    pub fn as_text(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(data) | Frame::Simple(data) => Some(data),
            _ => None,
        }
    }
}

/// A frame that cannot be parsed; the connection it arrived on is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown frame type byte {0:#04x}")]
    UnknownType(u8),

    #[error("invalid length prefix")]
    BadLength,
}

/// Parses one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it consumed, `Ok(None)` when
/// the buffer holds only a partial frame (nothing is consumed), or an
/// error when the bytes can never form a frame. Declared bulk lengths are
/// trusted, so payloads may contain CR and LF freely.
pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(&type_byte) = buf.first() else {
        return Ok(None);
    };
    if !matches!(type_byte, b'+' | b'-' | b':' | b'$' | b'*') {
        return Err(FrameError::UnknownType(type_byte));
    }

    let Some(line_len) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = &buf[1..line_len];
    let consumed = line_len + 2;

    match type_byte {
        b'+' => Ok(Some((Frame::Simple(Bytes::copy_from_slice(line)), consumed))),
        b'-' => Ok(Some((Frame::Error(Bytes::copy_from_slice(line)), consumed))),
        b':' => Ok(Some((Frame::Integer(lenient_i64(line)), consumed))),
        b'$' => {
            let len = lenient_i64(line);
            if len == -1 {
                return Ok(Some((Frame::Nil, consumed)));
            }
            if len < 0 {
                return Err(FrameError::BadLength);
            }
            let len = len as usize;
            let total = consumed + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&buf[consumed..consumed + len]);
            Ok(Some((Frame::Bulk(data), total)))
        }
        b'*' => {
            let count = lenient_i64(line);
            if count == -1 {
                return Ok(Some((Frame::Nil, consumed)));
            }
            if count < 0 {
                return Err(FrameError::BadLength);
            }

            let mut items = Vec::new();
            let mut total = consumed;
            for _ in 0..count {
                match parse(&buf[total..])? {
                    // Incomplete child means incomplete whole.
                    None => return Ok(None),
                    Some((frame, n)) => {
                        items.push(frame);
                        total += n;
                    }
                }
            }
            Ok(Some((Frame::Array(items), total)))
        }
        // Unknown bytes were rejected above.
        other => Err(FrameError::UnknownType(other)),
    }
}

/// Position of the first CRLF, as the length of the line before it.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

/// `strtoll`-style integer parse: optional leading whitespace and sign,
/// then digits until the first non-digit. No digits means zero.
pub(crate) fn lenient_i64(mut bytes: &[u8]) -> i64 {
    while let Some((b' ' | b'\t', rest)) = bytes.split_first() {
        bytes = rest;
    }

    let negative = match bytes.first() {
        Some(b'-') => {
            bytes = &bytes[1..];
            true
        }
        Some(b'+') => {
            bytes = &bytes[1..];
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value
            .saturating_mul(10)
            .saturating_add((byte - b'0') as i64);
    }

    if negative {
        -value
    } else {
        value
    }
}

/// Growable reply buffer; serialization appends frames in wire form.
///
/// Array replies are written as a header followed by each member, mirroring
/// how handlers produce them.
#[derive(Debug, Default)]
pub struct ReplyBuf {
    buf: BytesMut,
}

impl ReplyBuf {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn write_simple(&mut self, text: &str) {
        self.buf.extend_from_slice(b"+");
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn write_error(&mut self, text: &str) {
        self.buf.extend_from_slice(b"-");
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn write_integer(&mut self, value: i64) {
        self.buf
            .extend_from_slice(format!(":{}\r\n", value).as_bytes());
    }

    pub fn write_bulk(&mut self, data: &[u8]) {
        self.buf
            .extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn write_nil(&mut self) {
        self.buf.extend_from_slice(b"$-1\r\n");
    }

    pub fn write_array_header(&mut self, count: usize) {
        self.buf
            .extend_from_slice(format!("*{}\r\n", count).as_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
