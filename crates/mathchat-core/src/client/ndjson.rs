//! Line-delimited JSON frame decoding for the chat stream.
//!
//! The backend emits one JSON record per line, but the transport hands
//! us arbitrary byte chunks: a chunk may carry half a record, several
//! records, or split a multi-byte character. The decoder buffers bytes
//! across chunks and only interprets complete lines, so the decoded
//! frame sequence is independent of chunk boundaries.

use bytes::{Buf, BytesMut};
use serde::Deserialize;

/// One decoded record from the wire.
///
/// All fields are optional; backends interleave heartbeat and
/// diagnostic records with payload records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub message: Option<FrameMessage>,
    /// Completion flag: the exchange is over.
    #[serde(default)]
    pub done: bool,
}

/// Per-channel deltas carried by a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FrameMessage {
    /// Reasoning-channel delta.
    #[serde(default)]
    pub thinking: Option<String>,
    /// Answer-channel delta.
    #[serde(default)]
    pub content: Option<String>,
}

/// Reassembles byte chunks into [`StreamFrame`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame completed by it.
    ///
    /// Malformed lines are discarded; the trailing partial line stays
    /// buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&byte| byte == b'\n') {
            let line = self.buf.copy_to_bytes(newline + 1);
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes the buffered trailing record, if any.
    ///
    /// Called once after the transport signals end-of-stream, for
    /// backends that do not terminate the final record with a newline.
    pub fn finish(mut self) -> Option<StreamFrame> {
        let rest = self.buf.split();
        parse_line(&rest)
    }
}

/// Parses one line into a frame. Empty and undecodable lines yield
/// `None`; the failure is local and never propagates.
fn parse_line(raw: &[u8]) -> Option<StreamFrame> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::debug!(error = %err, "discarding undecodable stream line");
            None
        }
    }
}
