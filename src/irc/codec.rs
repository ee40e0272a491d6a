//! Framing of the server socket into [`Message`]s.
//!
//! Lines end in `\n` with an optional `\r`. Invalid UTF-8 is decoded lossily,
//! and blank or malformed lines are skipped rather than ending the stream.
//! A line longer than the configured limit is a protocol error.

use crate::irc::message::Message;
use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Longest accepted line, terminator included. Room for IRCv3 tags on top of
/// the classic 512 bytes.
pub const MAX_LINE_LENGTH: usize = 8191;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct IrcLineCodec {
    // Where the newline scan resumes on the next call.
    next_index: usize,
    max_len: usize,
}

impl IrcLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_len
    }
}

impl Default for IrcLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcLineCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(CodecError::LineTooLong { limit: self.max_len });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if line.len() > self.max_len {
                return Err(CodecError::LineTooLong { limit: self.max_len });
            }

            let text = String::from_utf8_lossy(&line);
            if text.trim().is_empty() {
                continue;
            }
            match Message::parse(&text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => debug!(error = %e, "dropping malformed line"),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding partial line at end of stream");
            src.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<Message> for IrcLineCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let line = message.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
