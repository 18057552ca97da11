//! Framing: one JSON message per `\n`-terminated line.
//!
//! The reader consumes up to and including the next terminator and parses
//! the stripped payload; the writer emits the serialized message and the
//! terminator in a single write. Any error here ends the connection that
//! produced it.

use std::io::{BufRead, BufReader, Read, Write};

use thiserror::Error;

use super::message::PeerMessage;

/// Upper bound on one frame. A full-document `sync` is the largest message;
/// this comfortably covers the document sizes an interactive editor holds.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("frame exceeds {max_frame_bytes} bytes")]
    FrameTooLarge { max_frame_bytes: usize },
}

pub struct MessageReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R) -> MessageReader<R> {
        MessageReader::with_max_frame_bytes(inner, MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(inner: R, max_frame_bytes: usize) -> MessageReader<R> {
        MessageReader {
            reader: BufReader::new(inner),
            max_frame_bytes,
        }
    }

    /// Read the next frame. `Ok(None)` is a clean end of stream (the peer
    /// closed between frames); EOF inside a frame is an error.
    pub fn read_next(&mut self) -> Result<Option<PeerMessage>, WireError> {
        let mut frame: Vec<u8> = Vec::new();
        loop {
            let (consumed, terminated) = {
                let available = self.reader.fill_buf()?;
                if available.is_empty() {
                    if frame.is_empty() {
                        return Ok(None);
                    }
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "frame truncated before terminator",
                    )
                    .into());
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        frame.extend_from_slice(&available[..i]);
                        (i + 1, true)
                    }
                    None => {
                        frame.extend_from_slice(available);
                        (available.len(), false)
                    }
                }
            };
            self.reader.consume(consumed);

            if frame.len() > self.max_frame_bytes {
                return Err(WireError::FrameTooLarge {
                    max_frame_bytes: self.max_frame_bytes,
                });
            }
            if terminated {
                let message = serde_json::from_slice(&frame)?;
                return Ok(Some(message));
            }
        }
    }
}

pub struct MessageWriter<W> {
    writer: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(writer: W) -> MessageWriter<W> {
        MessageWriter { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Serialize, terminate, and send `message` as one write. Returns the
    /// frame length in bytes.
    pub fn write_message(&mut self, message: &PeerMessage) -> Result<usize, WireError> {
        let mut frame = serde_json::to_vec(message)?;
        frame.push(b'\n');
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(frame.len())
    }
}
