//! Router module - Core routing of inbound MIDI to the output sink
//!
//! The Router owns the whole routing session:
//! - Input channel filtering (hard drop, no state change)
//! - Output channel remapping of everything it emits
//! - Sustain retention: note-offs withheld while sustain is active and
//!   released when the pedal lifts or latch mode is turned off
//!
//! It is a plain synchronous state machine. Callers feed it one message at a
//! time from a single queue and forward whatever it returns to a sink.

mod sustain;

pub use sustain::{HeldNotes, SustainMode, SustainState};

#[cfg(test)]
mod tests;

use std::fmt;

use tracing::{trace, warn};

use crate::midi::{decode, encode, Channel, MessageKind, RawMessage, SUSTAIN_PEDAL};

/// Release velocity written into every Note Off the router emits
pub const RELEASE_VELOCITY: u8 = 64;

/// Which inbound channels are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelFilter {
    #[default]
    Any,
    Only(Channel),
}

impl ChannelFilter {
    /// Whether a message on `channel` passes the filter
    pub fn accepts(self, channel: Channel) -> bool {
        match self {
            ChannelFilter::Any => true,
            ChannelFilter::Only(selected) => selected == channel,
        }
    }
}

impl fmt::Display for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFilter::Any => f.write_str("any"),
            ChannelFilter::Only(channel) => write!(f, "{}", channel),
        }
    }
}

/// Destination for routed messages
///
/// Sends are fire-and-forget from the router's point of view: a failed send
/// is logged and routing carries on with the next message.
pub trait MessageSink {
    fn send(&mut self, msg: &RawMessage) -> anyhow::Result<()>;
}

impl MessageSink for Vec<RawMessage> {
    fn send(&mut self, msg: &RawMessage) -> anyhow::Result<()> {
        self.push(*msg);
        Ok(())
    }
}

/// Routing session: configuration plus sustain state
#[derive(Debug, Clone, Default)]
pub struct Router {
    input_filter: ChannelFilter,
    output_channel: Channel,
    sustain: SustainState,
    held_notes: HeldNotes,
}

impl Router {
    /// Create a router with session defaults (any channel in, channel 1 out, momentary sustain)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_filter(&self) -> ChannelFilter {
        self.input_filter
    }

    pub fn output_channel(&self) -> Channel {
        self.output_channel
    }

    pub fn sustain_mode(&self) -> SustainMode {
        self.sustain.mode()
    }

    pub fn is_sustain_active(&self) -> bool {
        self.sustain.is_active()
    }

    /// Notes whose release is being withheld, in the order they were held
    pub fn held_notes(&self) -> &[u8] {
        self.held_notes.as_slice()
    }

    /// Applies from the next inbound message on
    pub fn set_input_filter(&mut self, filter: ChannelFilter) {
        self.input_filter = filter;
    }

    /// Applies to everything emitted from now on, including pending releases
    pub fn set_output_channel(&mut self, channel: Channel) {
        self.output_channel = channel;
    }

    /// Route one inbound message and return the messages to send
    pub fn handle_inbound(&mut self, msg: RawMessage) -> Vec<RawMessage> {
        let event = decode(msg);

        if !self.input_filter.accepts(event.channel) {
            trace!("Router DROP (channel {} filtered): {}", event.channel, event);
            return Vec::new();
        }

        match event.kind {
            MessageKind::NoteOn => {
                // Re-striking a held note cancels its pending release
                self.held_notes.remove(event.data1);
                vec![event.encode_on(self.output_channel)]
            }
            MessageKind::NoteOff => {
                if self.sustain.is_active() {
                    self.held_notes.insert(event.data1);
                    trace!("Holding note {} while sustain is active", event.data1);
                    Vec::new()
                } else {
                    vec![self.note_off(event.data1)]
                }
            }
            MessageKind::ControlChange if event.data1 == SUSTAIN_PEDAL => {
                self.on_sustain_pedal(event.data2)
            }
            MessageKind::ControlChange | MessageKind::Other(_) => {
                vec![event.encode_on(self.output_channel)]
            }
        }
    }

    /// Route one inbound message straight into a sink
    ///
    /// Returns the number of messages the sink accepted.
    pub fn route<S: MessageSink + ?Sized>(&mut self, msg: RawMessage, sink: &mut S) -> usize {
        let outbound = self.handle_inbound(msg);
        send_all(sink, &outbound)
    }

    /// Canonical Note Off on the output channel
    fn note_off(&self, note: u8) -> RawMessage {
        encode(MessageKind::NoteOff, self.output_channel, note, RELEASE_VELOCITY)
    }

    /// Snapshot of the session for status displays
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            input_filter: self.input_filter,
            output_channel: self.output_channel,
            mode: self.sustain.mode(),
            sustain_active: self.sustain.is_active(),
            held_notes: self.held_notes.as_slice().to_vec(),
        }
    }
}

/// Forward messages to a sink, logging failures
pub fn send_all<S: MessageSink + ?Sized>(sink: &mut S, messages: &[RawMessage]) -> usize {
    let mut sent = 0;
    for msg in messages {
        match sink.send(msg) {
            Ok(()) => sent += 1,
            Err(e) => warn!("Failed to send {}: {}", msg, e),
        }
    }
    sent
}

/// Point-in-time view of a [`Router`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStatus {
    pub input_filter: ChannelFilter,
    pub output_channel: Channel,
    pub mode: SustainMode,
    pub sustain_active: bool,
    pub held_notes: Vec<u8>,
}

impl fmt::Display for RouterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in: {} | out: {} | sustain: {} ({}) | held: {:?}",
            self.input_filter,
            self.output_channel,
            self.mode,
            if self.sustain_active { "on" } else { "off" },
            self.held_notes
        )
    }
}
