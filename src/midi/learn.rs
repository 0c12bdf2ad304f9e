//! MIDI learn and playback
//!
//! Two state machines over one [`MappingTable`]:
//!
//! - **Capture**: while learn mode is on and a target is armed, the first
//!   qualifying message becomes a mapping and disarms the target.
//! - **Playback**: while learn mode is off, incoming messages are matched
//!   against the table and turned into [`MidiAction`]s.
//!
//! The engine never touches modules. The caller applies the actions.

use super::mapping::{LearnTarget, MappingKey, MappingTable, MidiMapping};
use super::message::{note_to_frequency, MidiMessage};
use crate::param::Range;

/// A write produced by playback
#[derive(Debug, Clone, PartialEq)]
pub enum MidiAction {
    SetParam {
        module: String,
        param: String,
        value: f64,
    },
    Attack {
        module: String,
    },
    Release {
        module: String,
    },
}

/// What the engine did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum MidiOutcome {
    /// A new mapping was recorded
    Captured(MidiMapping),
    /// Playback produced these actions (possibly none)
    Played(Vec<MidiAction>),
    /// Not a message the engine reacts to in its current state
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
struct Armed {
    target: LearnTarget,
    range: Range,
    note_param: Option<String>,
}

/// Learn-mode state plus the mapping table
#[derive(Debug, Default)]
pub struct MidiEngine {
    learning: bool,
    armed: Option<Armed>,
    table: MappingTable,
}

impl MidiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Flip learn mode. Leaving learn mode disarms.
    pub fn toggle_learn(&mut self) -> bool {
        self.set_learning(!self.learning);
        self.learning
    }

    pub fn set_learning(&mut self, on: bool) {
        self.learning = on;
        if !on {
            self.armed = None;
        }
        tracing::debug!(learning = on, "learn mode");
    }

    /// Leave learn mode
    pub fn escape(&mut self) {
        self.set_learning(false);
    }

    /// Arm `target`, replacing any armed target.
    ///
    /// `range` is the output range a captured CC mapping will carry.
    /// `note_param` is the module parameter a captured Note mapping drives;
    /// without one a Note-On leaves a parameter target armed. Returns `false`
    /// when learn mode is off.
    pub fn arm(&mut self, target: LearnTarget, range: Range, note_param: Option<&str>) -> bool {
        if !self.learning {
            return false;
        }
        tracing::debug!(learn_target = %target.key(), ?note_param, "armed");
        self.armed = Some(Armed {
            target,
            range,
            note_param: note_param.map(str::to_string),
        });
        true
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<&LearnTarget> {
        self.armed.as_ref().map(|a| &a.target)
    }

    /// Feed raw MIDI bytes
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> MidiOutcome {
        match MidiMessage::from_bytes(bytes) {
            Some(message) => self.handle(message),
            None => MidiOutcome::Ignored,
        }
    }

    pub fn handle(&mut self, message: MidiMessage) -> MidiOutcome {
        if self.learning {
            self.capture(message)
        } else {
            MidiOutcome::Played(self.play(message))
        }
    }

    fn capture(&mut self, message: MidiMessage) -> MidiOutcome {
        let Some(armed) = &self.armed else {
            return MidiOutcome::Ignored;
        };
        let mapping = match (message, &armed.target) {
            (
                MidiMessage::ControlChange {
                    channel,
                    controller,
                    ..
                },
                LearnTarget::Param { module, param },
            ) => MidiMapping::Cc {
                channel,
                cc: controller,
                module_key: module.clone(),
                param_key: param.clone(),
                min: armed.range.min,
                max: armed.range.max,
            },
            (MidiMessage::NoteOn { channel, .. }, LearnTarget::Param { module, .. }) => {
                let Some(note_param) = &armed.note_param else {
                    return MidiOutcome::Ignored;
                };
                MidiMapping::Note {
                    channel,
                    module_key: module.clone(),
                    param_key: note_param.clone(),
                }
            }
            (MidiMessage::NoteOn { channel, .. }, LearnTarget::Gate { module }) => {
                MidiMapping::Gate {
                    channel,
                    module_key: module.clone(),
                }
            }
            _ => return MidiOutcome::Ignored,
        };

        self.armed = None;
        if let Some(previous) = self.table.insert(mapping.clone()) {
            tracing::debug!(?previous, "mapping replaced");
        }
        tracing::info!(?mapping, "mapping captured");
        MidiOutcome::Captured(mapping)
    }

    fn play(&self, message: MidiMessage) -> Vec<MidiAction> {
        let mut actions = Vec::new();
        match message {
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => {
                let key = MappingKey::Cc {
                    channel,
                    cc: controller,
                };
                if let Some(MidiMapping::Cc {
                    module_key,
                    param_key,
                    min,
                    max,
                    ..
                }) = self.table.get(&key)
                {
                    actions.push(MidiAction::SetParam {
                        module: module_key.clone(),
                        param: param_key.clone(),
                        value: min + (value as f64 / 127.0) * (max - min),
                    });
                }
            }
            MidiMessage::NoteOn { channel, note, .. } => {
                if let Some(MidiMapping::Note {
                    module_key,
                    param_key,
                    ..
                }) = self.table.get(&MappingKey::Note { channel })
                {
                    actions.push(MidiAction::SetParam {
                        module: module_key.clone(),
                        param: param_key.clone(),
                        value: note_to_frequency(note),
                    });
                }
                actions.extend(self.table.gates(channel).map(|g| MidiAction::Attack {
                    module: g.module().to_string(),
                }));
            }
            MidiMessage::NoteOff { channel, .. } => {
                actions.extend(self.table.gates(channel).map(|g| MidiAction::Release {
                    module: g.module().to_string(),
                }));
            }
        }
        actions
    }

    pub fn is_mapped(&self, target: &LearnTarget) -> bool {
        self.table.is_mapped(target)
    }

    /// Replace every mapping
    pub fn load(&mut self, mappings: Vec<MidiMapping>) {
        tracing::debug!(count = mappings.len(), "mappings loaded");
        self.table.load(mappings);
    }

    /// Current mappings in a stable order
    pub fn mappings(&self) -> Vec<MidiMapping> {
        self.table.to_vec()
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Forget a removed module: drop its mappings and disarm it
    pub fn remove_module(&mut self, module: &str) {
        self.table.remove_module(module);
        if self.armed().is_some_and(|t| t.module() == module) {
            self.armed = None;
        }
    }
}
