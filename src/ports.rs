//! MIDI port transport
//!
//! Opens the input side (one device, or every device merged onto a single
//! queue) and the output side, and frames raw port bytes into
//! [`RawMessage`]s before they reach the router.

use anyhow::{anyhow, Context, Result};
use colored::*;
use midir::{
    Ignore, MidiIO, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::MessageError;
use crate::midi::{format_hex, RawMessage};
use crate::router::MessageSink;

/// Capacity of the merged inbound queue
pub const INBOUND_QUEUE_SIZE: usize = 1000;

const CLIENT_NAME: &str = "Sustain-GW";

/// A framed message and the port it came from
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub port: Arc<str>,
    pub message: RawMessage,
}

/// Case-insensitive substring match on port names
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.trim().to_lowercase())
}

/// Find the port named `pattern`, else the first whose name contains it
pub fn find_port_by_substring<T: MidiIO>(io: &T, pattern: &str) -> Option<(T::Port, String)> {
    let candidates: Vec<(T::Port, String)> = io
        .ports()
        .into_iter()
        .filter_map(|port| io.port_name(&port).ok().map(|name| (port, name)))
        .filter(|(_, name)| matches_pattern(name, pattern))
        .collect();

    let exact = candidates
        .iter()
        .position(|(_, name)| name.eq_ignore_ascii_case(pattern.trim()));
    let found = candidates.into_iter().nth(exact.unwrap_or(0));

    if let Some((_, name)) = &found {
        debug!("Found port '{}' matching pattern '{}'", name, pattern);
    }
    found
}

/// The port at `index` in enumeration order, with its name
///
/// Identical devices can share a name, so positions are the only unique key.
pub fn nth_port<T: MidiIO>(io: &T, index: usize) -> Option<(T::Port, String)> {
    let port = io.ports().into_iter().nth(index)?;
    let name = io.port_name(&port).ok()?;
    Some((port, name))
}

fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|port| io.port_name(port).ok())
        .collect()
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME))?;
    Ok(port_names(&midi_in))
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(&format!("{}-Scanner", CLIENT_NAME))?;
    Ok(port_names(&midi_out))
}

/// Print input and output ports for `--list-ports`
pub fn print_ports() -> Result<()> {
    println!("\n{}", "=== MIDI Ports ===".bold().cyan());

    println!("\n{}", "Inputs:".bold());
    let inputs = list_input_ports()?;
    if inputs.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (index, name) in inputs.iter().enumerate() {
        println!("  [{}] {}", index.to_string().yellow(), name.green());
    }

    println!("\n{}", "Outputs:".bold());
    let outputs = list_output_ports()?;
    if outputs.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (index, name) in outputs.iter().enumerate() {
        println!("  [{}] {}", index.to_string().yellow(), name.green());
    }

    println!();
    Ok(())
}

/// Frame bytes from a port callback, dropping anything the router does not take
pub fn frame_inbound(port: &Arc<str>, data: &[u8]) -> Option<InboundEvent> {
    match RawMessage::from_wire(data) {
        Ok(message) => Some(InboundEvent {
            port: port.clone(),
            message,
        }),
        Err(MessageError::SystemMessage { status }) => {
            trace!("Ignoring system message 0x{:02X} from {}", status, port);
            None
        }
        Err(e) => {
            debug!("Dropping {} from {}: {}", format_hex(data), port, e);
            None
        }
    }
}

/// Push an event onto the merged queue from a midir callback thread
///
/// Waits for queue space, never drops. Must not be called from inside the
/// tokio runtime.
pub fn forward_inbound(tx: &mpsc::Sender<InboundEvent>, event: InboundEvent) {
    if let Err(e) = tx.blocking_send(event) {
        warn!("Inbound queue closed, dropping message from {}", e.0.port);
    }
}

fn new_input() -> Result<MidiInput> {
    let mut midi_in = MidiInput::new(&format!("{}-Input", CLIENT_NAME))
        .context("Failed to create MIDI input")?;
    midi_in.ignore(Ignore::All);
    Ok(midi_in)
}

/// Open input connections feeding one queue
pub struct InputPorts {
    connections: Vec<MidiInputConnection<()>>,
    names: Vec<String>,
}

impl InputPorts {
    /// Connect to the port matching `pattern`, or to every port when `any_device` is set
    pub fn connect(pattern: &str, any_device: bool, tx: mpsc::Sender<InboundEvent>) -> Result<Self> {
        let mut ports = Self {
            connections: Vec::new(),
            names: Vec::new(),
        };

        if any_device {
            let scanner = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME))?;
            for index in 0..scanner.port_count() {
                if let Err(e) = ports.connect_index(index, tx.clone()) {
                    warn!("Skipping input #{}: {:#}", index, e);
                }
            }
            if ports.connections.is_empty() {
                anyhow::bail!("No MIDI input ports available");
            }
        } else {
            let midi_in = new_input()?;
            let (port, name) = find_port_by_substring(&midi_in, pattern)
                .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;
            ports.connect_port(midi_in, port, name, tx)?;
        }

        Ok(ports)
    }

    fn connect_index(&mut self, index: usize, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let midi_in = new_input()?;
        let (port, name) =
            nth_port(&midi_in, index).ok_or_else(|| anyhow!("Input port #{} disappeared", index))?;
        self.connect_port(midi_in, port, name, tx)
    }

    fn connect_port(
        &mut self,
        midi_in: MidiInput,
        port: MidiInputPort,
        name: String,
        tx: mpsc::Sender<InboundEvent>,
    ) -> Result<()> {
        info!("Connecting to input port: {}", name);

        let port_label: Arc<str> = Arc::from(name.as_str());
        let connection = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    if let Some(event) = frame_inbound(&port_label, data) {
                        forward_inbound(&tx, event);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port '{}': {}", name, e))?;

        self.connections.push(connection);
        self.names.push(name);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Close every input connection
    pub fn close(self) {
        for connection in self.connections {
            connection.close();
        }
    }
}

/// Output connection used as the router's sink
pub struct OutputPort {
    name: String,
    connection: MidiOutputConnection,
}

impl OutputPort {
    /// Connect to the output port matching `pattern`
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(&format!("{}-Output", CLIENT_NAME))
            .context("Failed to create MIDI output")?;

        let (port, name) = find_port_by_substring(&midi_out, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", name);

        let connection = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to output port '{}': {}", name, e))?;

        Ok(Self { name, connection })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn close(self) {
        self.connection.close();
    }
}

impl MessageSink for OutputPort {
    fn send(&mut self, msg: &RawMessage) -> Result<()> {
        trace!("TX -> {}: {}", self.name, msg);
        self.connection
            .send(msg.wire_bytes())
            .map_err(|e| anyhow!("MIDI send to '{}' failed: {}", self.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midir::PortInfoError;

    /// Port list where handles are indices and names may repeat
    struct FakePorts(Vec<&'static str>);

    impl MidiIO for FakePorts {
        type Port = usize;

        fn ports(&self) -> Vec<usize> {
            (0..self.0.len()).collect()
        }

        fn port_count(&self) -> usize {
            self.0.len()
        }

        fn port_name(&self, port: &usize) -> std::result::Result<String, PortInfoError> {
            self.0
                .get(*port)
                .map(|name| name.to_string())
                .ok_or(PortInfoError::InvalidPort)
        }
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("volca fm:volca fm MIDI 1 20:0", "Volca"));
        assert!(matches_pattern("KeyStep 32", " keystep "));
        assert!(!matches_pattern("Midi Through Port-0", "volca"));
    }

    #[test]
    fn test_frame_inbound_keeps_port_name() {
        let port: Arc<str> = Arc::from("KeyStep");
        let event = frame_inbound(&port, &[0x91, 60, 100]).unwrap();

        assert_eq!(&*event.port, "KeyStep");
        assert_eq!(event.message, RawMessage::new(0x91, 60, 100));
    }

    #[test]
    fn test_frame_inbound_drops_unroutable() {
        let port: Arc<str> = Arc::from("KeyStep");

        assert!(frame_inbound(&port, &[0xF8]).is_none());
        assert!(frame_inbound(&port, &[0x90, 60]).is_none());
        assert!(frame_inbound(&port, &[0x90, 60, 200]).is_none());
        assert!(frame_inbound(&port, &[0xC0, 12]).is_some());
    }

    #[test]
    fn test_nth_port_tells_identical_devices_apart() {
        let io = FakePorts(vec!["nanoKEY2", "nanoKEY2", "KeyStep 32"]);

        let connected: Vec<usize> = (0..io.port_count())
            .filter_map(|index| nth_port(&io, index))
            .map(|(port, _)| port)
            .collect();
        assert_eq!(connected, vec![0, 1, 2]);

        assert_eq!(nth_port(&io, 1), Some((1, "nanoKEY2".to_string())));
        assert_eq!(nth_port(&io, 3), None);
    }

    #[test]
    fn test_find_port_prefers_exact_name() {
        let io = FakePorts(vec!["KeyStep 32 MIDI", "KeyStep 32"]);

        assert_eq!(find_port_by_substring(&io, "keystep 32"), Some((1, "KeyStep 32".to_string())));
        assert_eq!(find_port_by_substring(&io, "MIDI"), Some((0, "KeyStep 32 MIDI".to_string())));
        assert_eq!(find_port_by_substring(&io, "volca"), None);
    }

    #[tokio::test]
    async fn test_forward_waits_for_queue_space() {
        let (tx, mut rx) = mpsc::channel(1);
        let port: Arc<str> = Arc::from("KeyStep");

        let callback = std::thread::spawn(move || {
            for note in [60, 64, 67] {
                let event = frame_inbound(&port, &[0x80, note, 0]).unwrap();
                forward_inbound(&tx, event);
            }
        });

        let mut notes = Vec::new();
        while let Some(event) = rx.recv().await {
            notes.push(event.message.data1());
        }
        callback.join().unwrap();

        assert_eq!(notes, vec![60, 64, 67]);
    }

    #[test]
    fn test_forward_to_closed_queue_drops_quietly() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let port: Arc<str> = Arc::from("KeyStep");
        forward_inbound(&tx, frame_inbound(&port, &[0x90, 60, 100]).unwrap());
    }
}
