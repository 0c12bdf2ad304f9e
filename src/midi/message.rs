//! Raw MIDI byte parsing

/// Channel voice messages the editor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Also produced by a Note-On with velocity 0
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    /// Parse raw MIDI bytes.
    ///
    /// Returns `None` for anything other than a complete note or
    /// control-change message. Data bytes are masked to 7 bits.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let &[status, data1, data2, ..] = bytes else {
            return None;
        };
        let channel = status & 0x0F;
        let (data1, data2) = (data1 & 0x7F, data2 & 0x7F);

        match status & 0xF0 {
            0x90 if data2 > 0 => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            0x80 | 0x90 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                controller: data1,
                value: data2,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }

    /// Encode back to three raw bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }
}

/// Equal-tempered frequency of a MIDI note, A4 (69) = 440 Hz
pub fn note_to_frequency(note: u8) -> f64 {
    440.0 * libm::pow(2.0, (note as f64 - 69.0) / 12.0)
}
