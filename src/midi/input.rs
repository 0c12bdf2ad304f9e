//! MIDI input
//!
//! [`MidiInputHub`] is the editor side of MIDI input: it tracks which ports
//! are present, reports hot-plug changes, and queues raw messages sent from
//! driver callbacks so they are handled on the editor's own event queue.
//! With the `midi-io` feature, [`hardware::MidirInput`] opens every hardware
//! port through `midir` and forwards into the hub.

use std::sync::mpsc::{channel, Receiver, Sender};

/// Maximum messages drained per call
pub const MIDI_BUFFER_SIZE: usize = 1024;

/// Information about a MIDI input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MidiPortInfo {
    pub id: String,
    pub name: String,
}

impl MidiPortInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A port appeared or went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortChange {
    Connected(MidiPortInfo),
    Disconnected(MidiPortInfo),
}

/// Sending half handed to driver callbacks
pub type MidiSender = Sender<Vec<u8>>;

/// Port registry and message queue
#[derive(Debug)]
pub struct MidiInputHub {
    ports: Vec<MidiPortInfo>,
    sender: MidiSender,
    receiver: Receiver<Vec<u8>>,
}

impl MidiInputHub {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            ports: Vec::new(),
            sender,
            receiver,
        }
    }

    /// A sender for a driver callback, possibly on another thread
    pub fn sender(&self) -> MidiSender {
        self.sender.clone()
    }

    /// Queue a raw message
    pub fn push(&self, bytes: &[u8]) {
        // The hub owns the receiver, so sending cannot fail
        let _ = self.sender.send(bytes.to_vec());
    }

    /// Take queued messages in arrival order, up to [`MIDI_BUFFER_SIZE`]
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.receiver.try_iter().take(MIDI_BUFFER_SIZE).collect()
    }

    pub fn ports(&self) -> &[MidiPortInfo] {
        &self.ports
    }

    /// Replace the port list with the current enumeration and report the
    /// difference. Ports are matched by id.
    pub fn update_ports(&mut self, current: Vec<MidiPortInfo>) -> Vec<PortChange> {
        let mut changes: Vec<PortChange> = self
            .ports
            .iter()
            .filter(|old| !current.iter().any(|p| p.id == old.id))
            .cloned()
            .map(PortChange::Disconnected)
            .collect();
        changes.extend(
            current
                .iter()
                .filter(|new| !self.ports.iter().any(|p| p.id == new.id))
                .cloned()
                .map(PortChange::Connected),
        );
        for change in &changes {
            match change {
                PortChange::Connected(p) => tracing::info!(port = %p.name, "MIDI input connected"),
                PortChange::Disconnected(p) => {
                    tracing::info!(port = %p.name, "MIDI input disconnected")
                }
            }
        }
        self.ports = current;
        changes
    }
}

impl Default for MidiInputHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "midi-io")]
pub mod hardware {
    //! Hardware MIDI input through `midir`

    use super::{MidiPortInfo, MidiSender};
    use midir::{Ignore, MidiInput, MidiInputConnection};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum MidiIoError {
        #[error("failed to create MIDI input: {0}")]
        Init(#[from] midir::InitError),

        #[error("failed to connect to MIDI port '{port}': {reason}")]
        Connect { port: String, reason: String },
    }

    /// List available MIDI input ports
    pub fn list_ports() -> Result<Vec<MidiPortInfo>, MidiIoError> {
        let midi_in = MidiInput::new("patchwork-scanner")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo::new(port.id(), name))
            })
            .collect())
    }

    /// Open connections to every input port
    pub struct MidirInput {
        connections: Vec<(MidiPortInfo, MidiInputConnection<()>)>,
    }

    impl MidirInput {
        /// Connect every port currently present, forwarding raw messages to
        /// `sender`. Ports that fail to open are skipped with a warning.
        pub fn open_all(sender: MidiSender) -> Result<Self, MidiIoError> {
            let mut connections = Vec::new();
            for info in list_ports()? {
                match Self::open(&info, sender.clone()) {
                    Ok(connection) => connections.push((info, connection)),
                    Err(err) => tracing::warn!(%err, "skipping MIDI port"),
                }
            }
            Ok(Self { connections })
        }

        fn open(info: &MidiPortInfo, sender: MidiSender) -> Result<MidiInputConnection<()>, MidiIoError> {
            let mut midi_in = MidiInput::new("patchwork")?;
            midi_in.ignore(Ignore::Sysex | Ignore::Time);
            let port = midi_in
                .find_port_by_id(info.id.clone())
                .ok_or_else(|| MidiIoError::Connect {
                    port: info.name.clone(),
                    reason: "port vanished".to_string(),
                })?;
            midi_in
                .connect(
                    &port,
                    "patchwork-input",
                    move |_timestamp_us, bytes, _| {
                        let _ = sender.send(bytes.to_vec());
                    },
                    (),
                )
                .map_err(|e| MidiIoError::Connect {
                    port: info.name.clone(),
                    reason: e.to_string(),
                })
        }

        /// Ports with an open connection
        pub fn ports(&self) -> Vec<MidiPortInfo> {
            self.connections.iter().map(|(info, _)| info.clone()).collect()
        }

        /// Close every connection
        pub fn close(self) {
            for (_, connection) in self.connections {
                connection.close();
            }
        }
    }
}
