//! Decoding of streamed chat responses into typed events.
//!
//! The backend has shipped two wire formats over time. Both are consumed
//! through [`EventDecoder`] so the rest of the client never sees raw bytes:
//!
//! - [`StructuredDecoder`]: `data: <json>` lines terminated by `data: [DONE]`
//! - [`LegacyDecoder`]: loosely quoted `data: {content: '...'}` fragments with
//!   no terminator

mod legacy;
mod structured;

pub use legacy::LegacyDecoder;
pub use structured::StructuredDecoder;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::state::Source;

/// Literal payload that ends a structured stream.
pub const DONE_TOKEN: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Next piece of the bot reply, in arrival order
    Content(String),
    /// Citations for the reply currently being streamed
    Sources(Vec<Source>),
    /// Terminator seen; nothing after it is processed
    Done,
}

/// Incremental byte-stream decoder.
///
/// Chunks may split lines, records and even UTF-8 sequences anywhere; the
/// decoder carries the incomplete remainder over to the next call.
pub trait EventDecoder: Send {
    /// Feed one network chunk and return the events it completes.
    fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent>;

    /// Flush whatever is left once the transport reports end of body.
    fn finish(&mut self) -> Vec<StreamEvent>;

    /// True once the terminator has been observed.
    fn is_done(&self) -> bool;
}

/// Which wire format the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    #[default]
    Structured,
    Legacy,
}

impl StreamProtocol {
    pub fn decoder(&self) -> Box<dyn EventDecoder> {
        match self {
            StreamProtocol::Structured => Box::new(StructuredDecoder::new()),
            StreamProtocol::Legacy => Box::new(LegacyDecoder::new()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Structured => "structured",
            StreamProtocol::Legacy => "legacy",
        }
    }

}

impl FromStr for StreamProtocol {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" => Ok(StreamProtocol::Structured),
            "legacy" => Ok(StreamProtocol::Legacy),
            other => Err(ClientError::Config(format!("unknown stream protocol: {}", other))),
        }
    }
}

/// Text decoder that keeps an incomplete trailing UTF-8 sequence for the
/// next chunk instead of mangling it.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        // Truncated sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    pub(crate) fn flush(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
