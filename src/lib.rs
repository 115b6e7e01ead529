//! Sustain GW - MIDI router with sustain retention
//!
//! Routes MIDI from one input device (or every device) to one output device,
//! filtering by input channel, remapping to a fixed output channel and
//! holding note-offs while sustain is on, either following the pedal
//! (momentary) or locked on by the operator (latched).

pub mod cli;
pub mod config;
pub mod error;
pub mod midi;
pub mod ports;
pub mod router;
pub mod session;

pub use error::MessageError;
pub use midi::{decode, encode, Channel, DecodedEvent, MessageKind, RawMessage};
pub use router::{ChannelFilter, MessageSink, Router, SustainMode};
pub use session::{CommandOutcome, Session};
