//! Error types for the MIDI transport boundary.
//!
//! The codec and routing engine are total; these errors only come out of
//! framing raw bytes handed over by a port before they reach the engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("invalid MIDI message length: expected 3 bytes, got {len}")]
    InvalidMessageLength { len: usize },

    #[error("malformed MIDI message: byte {position} is 0x{byte:02X}")]
    MalformedMessage { position: usize, byte: u8 },

    #[error("system message 0x{status:02X} is not routed")]
    SystemMessage { status: u8 },
}

pub type Result<T> = std::result::Result<T, MessageError>;
