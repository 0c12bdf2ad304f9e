//! MIDI
//!
//! Message parsing, the learn/playback engine and its mapping table, and the
//! input hub that collects raw messages from ports.

pub mod input;
pub mod learn;
pub mod mapping;
pub mod message;

pub use input::{MidiInputHub, MidiPortInfo, MidiSender, PortChange};
pub use learn::{MidiAction, MidiEngine, MidiOutcome};
pub use mapping::{LearnTarget, MappingKey, MappingTable, MidiMapping, GATE_PARAM};
pub use message::{note_to_frequency, MidiMessage};
