//! MIDI output port
//!
//! Enumerates midir output ports and sends instrument events to one of them.

use midir::{MidiOutput as MidirOutput, MidiOutputConnection};

use super::events::{MidiEvent, MidiOutput};

/// Information about a MIDI output port
#[derive(Debug, Clone, serde::Serialize)]
pub struct MidiPortInfo {
    /// Port index (for connection)
    pub index: usize,
    pub name: String,
}

/// List available MIDI output ports
pub fn list_ports() -> Result<Vec<MidiPortInfo>, String> {
    let midi_out = MidirOutput::new("pluckpad-enumerate")
        .map_err(|e| format!("Failed to create MIDI output: {}", e))?;

    let ports = midi_out.ports();
    let mut infos = Vec::with_capacity(ports.len());
    for (index, port) in ports.iter().enumerate() {
        let name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown Port {}", index));
        infos.push(MidiPortInfo { index, name });
    }
    Ok(infos)
}

/// Open connection to an output port
pub struct MidiPortOutput {
    connection: MidiOutputConnection,
    port_name: String,
    send_errors: usize,
}

impl MidiPortOutput {
    /// Connect to the first port whose name contains `name` (case-insensitive)
    pub fn connect(name: &str) -> Result<Self, String> {
        let midi_out = MidirOutput::new("pluckpad")
            .map_err(|e| format!("Failed to create MIDI output: {}", e))?;

        let wanted = name.to_lowercase();
        let ports = midi_out.ports();
        let (port, port_name) = ports
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok().map(|n| (port, n)))
            .find(|(_, n)| n.to_lowercase().contains(&wanted))
            .ok_or_else(|| format!("No MIDI output port matching '{}'", name))?;

        log::info!("Connecting to MIDI output: {}", port_name);
        let connection = midi_out
            .connect(port, "pluckpad-out")
            .map_err(|e| format!("Failed to connect to MIDI output: {}", e))?;

        log::info!("Connected to MIDI output: {}", port_name);
        Ok(Self {
            connection,
            port_name,
            send_errors: 0,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Messages the port refused
    pub fn send_errors(&self) -> usize {
        self.send_errors
    }

    /// Close the port
    pub fn close(self) {
        log::info!("Disconnecting from MIDI output: {}", self.port_name);
        self.connection.close();
    }
}

impl MidiOutput for MidiPortOutput {
    fn send(&mut self, event: MidiEvent) {
        if let Err(e) = self.connection.send(&event.to_bytes()) {
            self.send_errors += 1;
            log::error!("MIDI send to {} failed ({}): {}", self.port_name, event, e);
        }
    }
}
