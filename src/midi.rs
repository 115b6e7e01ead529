//! MIDI utilities and message types
//!
//! Provides the 3-byte channel-voice message, its decoded form, and the
//! encode/decode pair used by the router. Framing of raw port bytes into a
//! [`RawMessage`] is the only fallible step and lives here too.

use std::fmt;

use crate::error::{MessageError, Result};

/// Kind nibble for Note Off
pub const NOTE_OFF: u8 = 0x8;
/// Kind nibble for Note On
pub const NOTE_ON: u8 = 0x9;
/// Kind nibble for Control Change
pub const CONTROL_CHANGE: u8 = 0xB;
/// Kind nibble for Program Change (2 bytes on the wire)
pub const PROGRAM_CHANGE: u8 = 0xC;
/// Kind nibble for Channel Pressure (2 bytes on the wire)
pub const CHANNEL_PRESSURE: u8 = 0xD;

/// Controller number of the sustain (damper) pedal
pub const SUSTAIN_PEDAL: u8 = 64;

/// MIDI channel (0-15 internally, shown 1-16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Channel(u8);

impl Channel {
    /// Build a channel from a 0-based index, `None` if out of range
    pub const fn new(index: u8) -> Option<Self> {
        if index < 16 {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Build a channel from the 1-16 numbering used in configs and UIs
    pub const fn from_one_based(number: u8) -> Option<Self> {
        if number >= 1 && number <= 16 {
            Some(Self(number - 1))
        } else {
            None
        }
    }

    /// Build a channel from the low nibble of a status byte
    pub const fn from_status(status: u8) -> Self {
        Self(status & 0x0F)
    }

    /// 0-based channel index
    pub const fn index(self) -> u8 {
        self.0
    }

    /// 1-based channel number
    pub const fn number(self) -> u8 {
        self.0 + 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Message kind carried in the status byte's high nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    ControlChange,
    /// Any other nibble, kept verbatim so it re-encodes unchanged
    Other(u8),
}

impl MessageKind {
    /// Map a kind nibble (0-15) to a message kind
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            NOTE_OFF => MessageKind::NoteOff,
            NOTE_ON => MessageKind::NoteOn,
            CONTROL_CHANGE => MessageKind::ControlChange,
            other => MessageKind::Other(other),
        }
    }

    /// Kind nibble for the status byte
    pub const fn nibble(self) -> u8 {
        match self {
            MessageKind::NoteOff => NOTE_OFF,
            MessageKind::NoteOn => NOTE_ON,
            MessageKind::ControlChange => CONTROL_CHANGE,
            MessageKind::Other(nibble) => nibble & 0x0F,
        }
    }
}

/// Raw 3-byte MIDI message: status, data 1, data 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawMessage([u8; 3]);

impl RawMessage {
    pub const fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self([status, data1, data2])
    }

    pub const fn status(&self) -> u8 {
        self.0[0]
    }

    pub const fn data1(&self) -> u8 {
        self.0[1]
    }

    pub const fn data2(&self) -> u8 {
        self.0[2]
    }

    pub const fn bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Bytes to put on the wire
    ///
    /// Program Change and Channel Pressure carry a single data byte, so only
    /// the first two bytes are transmitted for those kinds.
    pub fn wire_bytes(&self) -> &[u8] {
        match self.status() >> 4 {
            PROGRAM_CHANGE | CHANNEL_PRESSURE => &self.0[..2],
            _ => &self.0,
        }
    }

    /// Frame bytes delivered by a MIDI port
    ///
    /// Accepts exactly-3-byte channel messages, plus the 2-byte Program
    /// Change and Channel Pressure messages (padded with a zero data byte).
    /// System messages are rejected so callers can drop them.
    pub fn from_wire(data: &[u8]) -> Result<Self> {
        let status = *data
            .first()
            .ok_or(MessageError::InvalidMessageLength { len: 0 })?;

        if status >= 0xF0 {
            return Err(MessageError::SystemMessage { status });
        }

        match (status >> 4, data.len()) {
            (PROGRAM_CHANGE | CHANNEL_PRESSURE, 2) => Self::try_from([data[0], data[1], 0].as_slice()),
            _ => Self::try_from(data),
        }
    }
}

impl TryFrom<&[u8]> for RawMessage {
    type Error = MessageError;

    fn try_from(data: &[u8]) -> Result<Self> {
        let bytes: [u8; 3] = data
            .try_into()
            .map_err(|_| MessageError::InvalidMessageLength { len: data.len() })?;

        if bytes[0] < 0x80 {
            return Err(MessageError::MalformedMessage {
                position: 0,
                byte: bytes[0],
            });
        }
        for (position, &byte) in bytes.iter().enumerate().skip(1) {
            if byte > 0x7F {
                return Err(MessageError::MalformedMessage { position, byte });
            }
        }

        Ok(Self(bytes))
    }
}

/// Structured view of a raw message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    pub kind: MessageKind,
    pub channel: Channel,
    pub data1: u8,
    pub data2: u8,
}

impl DecodedEvent {
    /// Re-encode this event onto another channel
    pub fn encode_on(&self, channel: Channel) -> RawMessage {
        encode(self.kind, channel, self.data1, self.data2)
    }
}

/// Split a raw message into kind, channel and data bytes
pub fn decode(msg: RawMessage) -> DecodedEvent {
    DecodedEvent {
        kind: MessageKind::from_nibble(msg.status() >> 4),
        channel: Channel::from_status(msg.status()),
        data1: msg.data1(),
        data2: msg.data2(),
    }
}

/// Build a raw message from its parts
pub fn encode(kind: MessageKind, channel: Channel, data1: u8, data2: u8) -> RawMessage {
    RawMessage::new((kind.nibble() << 4) | channel.index(), data1, data2)
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageKind::NoteOff => {
                write!(f, "NoteOff ch:{} n:{} v:{}", self.channel, self.data1, self.data2)
            }
            MessageKind::NoteOn => {
                write!(f, "NoteOn ch:{} n:{} v:{}", self.channel, self.data1, self.data2)
            }
            MessageKind::ControlChange => {
                write!(f, "CC ch:{} cc:{} v:{}", self.channel, self.data1, self.data2)
            }
            MessageKind::Other(nibble) => write!(
                f,
                "0x{:X}_ ch:{} d1:{} d2:{}",
                nibble, self.channel, self.data1, self.data2
            ),
        }
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hex(self.wire_bytes()))
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
