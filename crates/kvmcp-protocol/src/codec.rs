//! Stream framing for JSON-RPC messages.
//!
//! [`JsonCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`.
//! The decoder accepts both newline-delimited JSON and raw successive JSON
//! values, so a single implementation serves stdio pipes and TCP sockets.
//! The encoder always writes compact JSON followed by `\n`.
//!
//! Framing is a single forward scan that survives partial reads: an object
//! or array ends where its brackets balance (strings and escapes are
//! tracked), anything else ends at the next newline or opening bracket.
//! Every byte is examined once, and a frame is parsed only after its end has
//! been found.
//!
//! A malformed document does not end the stream: it is reported as
//! [`Frame::Malformed`] and decoding resumes with the next value. An
//! unterminated object is cut at a newline that is directly followed by `{`
//! or `[`, since a raw newline can never appear inside a JSON string.
//! Only I/O failures and oversized messages surface as [`CodecError`].

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

/// Default limit on a single buffered message (10 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Frame codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Underlying read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message grew past the configured limit
    #[error("message exceeds maximum size of {max} bytes")]
    MessageTooLarge {
        /// Configured limit
        max: usize,
    },

    /// Outbound value could not be serialized
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One decoded unit from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A complete JSON document
    Message(Value),
    /// Bytes that were not valid JSON, with the parser's explanation
    Malformed(String),
}

/// Progress through the frame at the front of the buffer
#[derive(Debug, Clone, Copy, Default)]
struct Scan {
    /// Bytes of the current frame already examined
    index: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

/// Where a frame that starts with `{` or `[` ends
enum Boundary {
    /// Brackets balanced at this index (inclusive)
    Closed(usize),
    /// Newline at this index starts a new value before this one closed
    Cut(usize),
}

/// JSON value codec with a size limit
#[derive(Debug, Clone)]
pub struct JsonCodec {
    max_message_size: usize,
    scan: Scan,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonCodec {
    /// Codec with the default 10 MiB limit
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Codec with a custom limit
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            scan: Scan::default(),
        }
    }

    /// Configured limit
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn find_container_end(&mut self, src: &[u8]) -> Option<Boundary> {
        let scan = &mut self.scan;
        while let Some(&byte) = src.get(scan.index) {
            let at = scan.index;
            if byte == b'\n' {
                match src.get(at + 1) {
                    // revisit once the next byte is known
                    None => return None,
                    Some(b'{' | b'[') => return Some(Boundary::Cut(at)),
                    Some(_) => {}
                }
            }
            scan.index += 1;

            if scan.in_string {
                if scan.escaped {
                    scan.escaped = false;
                } else if byte == b'\\' {
                    scan.escaped = true;
                } else if byte == b'"' {
                    scan.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => scan.in_string = true,
                b'{' | b'[' => scan.depth += 1,
                b'}' | b']' => {
                    scan.depth = scan.depth.saturating_sub(1);
                    if scan.depth == 0 {
                        return Some(Boundary::Closed(at));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn decode_container(&mut self, src: &mut BytesMut) -> Option<Frame> {
        match self.find_container_end(src)? {
            Boundary::Closed(end) => Some(parse_frame(&src.split_to(end + 1))),
            Boundary::Cut(newline) => {
                let bytes = src.split_to(newline + 1);
                let reason = serde_json::from_slice::<Value>(&bytes)
                    .err()
                    .map_or_else(|| "unterminated message".to_string(), |e| e.to_string());
                Some(Frame::Malformed(reason))
            }
        }
    }

    /// Scalars and garbage run to the next newline or opening bracket.
    fn decode_bare(&mut self, src: &mut BytesMut) -> Option<Frame> {
        let from = self.scan.index;
        let Some(offset) = src[from..]
            .iter()
            .position(|b| matches!(b, b'\n' | b'{' | b'['))
        else {
            self.scan.index = src.len();
            return None;
        };
        let end = from + offset;
        let at_newline = src[end] == b'\n';
        let frame = parse_frame(&src.split_to(end));
        if at_newline {
            src.advance(1);
        }
        Some(frame)
    }

    fn reset(&mut self) {
        self.scan = Scan::default();
    }
}

fn is_blank(buf: &[u8]) -> bool {
    buf.iter().all(u8::is_ascii_whitespace)
}

fn parse_frame(bytes: &[u8]) -> Frame {
    match serde_json::from_slice(bytes) {
        Ok(value) => Frame::Message(value),
        Err(e) => Frame::Malformed(e.to_string()),
    }
}

impl Decoder for JsonCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scan.index == 0 {
            let leading = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
            src.advance(leading);
        }
        let Some(&first) = src.first() else {
            return Ok(None);
        };

        let frame = if matches!(first, b'{' | b'[') {
            self.decode_container(src)
        } else {
            self.decode_bare(src)
        };
        if frame.is_some() {
            self.reset();
            return Ok(frame);
        }

        if src.len() > self.max_message_size {
            tracing::warn!(
                buffered = src.len(),
                max = self.max_message_size,
                "incoming message exceeds maximum size, discarding buffer"
            );
            src.clear();
            self.reset();
            return Err(CodecError::MessageTooLarge {
                max: self.max_message_size,
            });
        }
        // Wait for the rest of the document
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.reset();
        if is_blank(src) {
            src.clear();
            return Ok(None);
        }
        let pending = src.split();
        Ok(Some(match serde_json::from_slice(&pending) {
            Ok(value) => Frame::Message(value),
            Err(_) => Frame::Malformed(format!(
                "stream ended inside a message ({} bytes pending)",
                pending.len()
            )),
        }))
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        serde_json::to_writer((&mut *dst).writer(), &item)?;
        if dst.len() - start > self.max_message_size {
            dst.truncate(start);
            return Err(CodecError::MessageTooLarge {
                max: self.max_message_size,
            });
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}
