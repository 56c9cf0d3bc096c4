//! Chunk decoders for monitor response bodies
//!
//! Turns transport chunks into log text. Chunk boundaries are arbitrary, so
//! both decoders hold back incomplete input (a partial frame, or a UTF-8
//! sequence split across chunks) until the next chunk completes it.

use agent_monitor_core::PayloadFormat;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{MonitorError, Result};

/// Decoder for one connection's body
#[derive(Debug)]
pub enum ChunkDecoder {
    Plain(Utf8Accumulator),
    Framed(FrameDecoder),
}

impl ChunkDecoder {
    pub fn new(format: PayloadFormat) -> Self {
        match format {
            PayloadFormat::Plain => Self::Plain(Utf8Accumulator::default()),
            PayloadFormat::Framed => Self::Framed(FrameDecoder::default()),
        }
    }

    /// Feed a chunk and return whatever text it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String> {
        match self {
            Self::Plain(utf8) => utf8.push(bytes),
            Self::Framed(frames) => frames.feed(bytes),
        }
    }

    /// Check that the body ended on a clean boundary
    pub fn finish(&self) -> Result<()> {
        let clean = match self {
            Self::Plain(utf8) => utf8.is_empty(),
            Self::Framed(frames) => frames.is_empty(),
        };
        if clean {
            Ok(())
        } else {
            Err(MonitorError::protocol("Response ended with incomplete data"))
        }
    }
}

/// Incremental UTF-8 decoding across chunk boundaries
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    pub fn push(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Truncated sequence at the end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(MonitorError::protocol(format!(
                    "Invalid UTF-8 in log output at byte {}",
                    e.valid_up_to()
                )))
            }
        };

        let rest = self.pending.split_off(valid);
        let complete = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(complete).map_err(|e| MonitorError::protocol(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One frame of a framed monitor body
#[derive(Debug, Deserialize)]
struct StreamFrame {
    /// Base64-encoded log bytes; absent on heartbeats
    #[serde(rename = "Data", default)]
    data: Option<String>,
    #[serde(rename = "FileEvent", default)]
    file_event: Option<String>,
}

/// Decoder for concatenated JSON frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of a frame that has not fully arrived
    buffer: Vec<u8>,
    /// Decoded frame payloads may themselves split UTF-8 sequences
    utf8: Utf8Accumulator,
}

impl FrameDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String> {
        self.buffer.extend_from_slice(bytes);

        let mut text = String::new();
        let mut consumed = 0;
        let mut frames =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<StreamFrame>();

        loop {
            match frames.next() {
                Some(Ok(frame)) => {
                    consumed = frames.byte_offset();
                    if let Some(event) = frame.file_event {
                        debug!("Monitor frame event: {}", event);
                    }
                    match frame.data {
                        Some(data) if !data.is_empty() => {
                            let raw = STANDARD.decode(data.as_bytes()).map_err(|e| {
                                MonitorError::protocol(format!("Invalid base64 in frame: {}", e))
                            })?;
                            text.push_str(&self.utf8.push(&raw)?);
                        }
                        _ => trace!("Monitor heartbeat frame"),
                    }
                }
                Some(Err(e)) if e.is_eof() => {
                    trace!("Partial frame buffered");
                    break;
                }
                Some(Err(e)) => {
                    return Err(MonitorError::protocol(format!(
                        "Failed to parse monitor frame: {}",
                        e
                    )));
                }
                None => {
                    consumed = frames.byte_offset();
                    break;
                }
            }
        }

        self.buffer.drain(..consumed);
        Ok(text)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace) && self.utf8.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> String {
        format!(r#"{{"Data":"{}","Offset":0}}"#, STANDARD.encode(text))
    }

    #[test]
    fn test_plain_passthrough() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Plain);
        assert_eq!(decoder.feed(b"hello ").unwrap(), "hello ");
        assert_eq!(decoder.feed(b"world\n").unwrap(), "world\n");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_plain_split_utf8() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Plain);
        let bytes = "caf\u{e9}".as_bytes();
        assert_eq!(decoder.feed(&bytes[..4]).unwrap(), "caf");
        assert!(decoder.finish().is_err());
        assert_eq!(decoder.feed(&bytes[4..]).unwrap(), "\u{e9}");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_plain_invalid_utf8() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Plain);
        assert!(matches!(
            decoder.feed(&[b'a', 0xFF, b'b']),
            Err(MonitorError::Protocol(_))
        ));
    }

    #[test]
    fn test_framed_multiple_frames() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Framed);
        let input = format!("{}{}\n{}", frame("a"), frame("b"), frame("c"));
        assert_eq!(decoder.feed(input.as_bytes()).unwrap(), "abc");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_framed_split_across_chunks() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Framed);
        let input = frame("line one\n");
        let (first, second) = input.as_bytes().split_at(7);

        assert_eq!(decoder.feed(first).unwrap(), "");
        assert!(decoder.finish().is_err());
        assert_eq!(decoder.feed(second).unwrap(), "line one\n");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_framed_heartbeat_ignored() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Framed);
        let input = format!("{{}}{}", frame("x"));
        assert_eq!(decoder.feed(input.as_bytes()).unwrap(), "x");
    }

    #[test]
    fn test_framed_malformed() {
        let mut decoder = ChunkDecoder::new(PayloadFormat::Framed);
        assert!(matches!(
            decoder.feed(b"[1, 2]"),
            Err(MonitorError::Protocol(_))
        ));

        let mut decoder = ChunkDecoder::new(PayloadFormat::Framed);
        assert!(matches!(
            decoder.feed(br#"{"Data":"!!not base64!!"}"#),
            Err(MonitorError::Protocol(_))
        ));
    }
}
