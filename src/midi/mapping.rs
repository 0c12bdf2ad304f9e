//! MIDI mappings and the mapping table

use crate::ids::target_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Something a MIDI message can be mapped onto
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LearnTarget {
    /// A module parameter
    Param { module: String, param: String },
    /// A module's attack/release gate
    Gate { module: String },
}

impl LearnTarget {
    pub fn param(module: impl Into<String>, param: impl Into<String>) -> Self {
        LearnTarget::Param {
            module: module.into(),
            param: param.into(),
        }
    }

    pub fn gate(module: impl Into<String>) -> Self {
        LearnTarget::Gate {
            module: module.into(),
        }
    }

    pub fn module(&self) -> &str {
        match self {
            LearnTarget::Param { module, .. } | LearnTarget::Gate { module } => module,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, LearnTarget::Gate { .. })
    }

    /// `"module::param"`, or `"module::gate"` for a gate
    pub fn key(&self) -> String {
        match self {
            LearnTarget::Param { module, param } => target_key(module, param),
            LearnTarget::Gate { module } => target_key(module, GATE_PARAM),
        }
    }
}

/// Parameter slot used to address a gate in learn keys
pub const GATE_PARAM: &str = "gate";

fn default_max() -> f64 {
    1.0
}

/// A persisted binding from a MIDI message pattern to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MidiMapping {
    #[serde(rename_all = "camelCase")]
    Cc {
        channel: u8,
        cc: u8,
        module_key: String,
        param_key: String,
        #[serde(default)]
        min: f64,
        #[serde(default = "default_max")]
        max: f64,
    },
    #[serde(rename_all = "camelCase")]
    Note {
        channel: u8,
        module_key: String,
        param_key: String,
    },
    #[serde(rename_all = "camelCase")]
    Gate { channel: u8, module_key: String },
}

impl MidiMapping {
    pub fn key(&self) -> MappingKey {
        match self {
            MidiMapping::Cc { channel, cc, .. } => MappingKey::Cc {
                channel: *channel,
                cc: *cc,
            },
            MidiMapping::Note { channel, .. } => MappingKey::Note { channel: *channel },
            MidiMapping::Gate {
                channel,
                module_key,
            } => MappingKey::Gate {
                channel: *channel,
                module: module_key.clone(),
            },
        }
    }

    pub fn target(&self) -> LearnTarget {
        match self {
            MidiMapping::Cc {
                module_key,
                param_key,
                ..
            }
            | MidiMapping::Note {
                module_key,
                param_key,
                ..
            } => LearnTarget::param(module_key.clone(), param_key.clone()),
            MidiMapping::Gate { module_key, .. } => LearnTarget::gate(module_key.clone()),
        }
    }

    pub fn module(&self) -> &str {
        match self {
            MidiMapping::Cc { module_key, .. }
            | MidiMapping::Note { module_key, .. }
            | MidiMapping::Gate { module_key, .. } => module_key,
        }
    }
}

/// Lookup key; at most one mapping per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MappingKey {
    Cc { channel: u8, cc: u8 },
    Note { channel: u8 },
    Gate { channel: u8, module: String },
}

/// The mapping table shared by capture and playback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    mappings: BTreeMap<MappingKey, MidiMapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mapping, returning the one it replaced
    pub fn insert(&mut self, mapping: MidiMapping) -> Option<MidiMapping> {
        self.mappings.insert(mapping.key(), mapping)
    }

    pub fn get(&self, key: &MappingKey) -> Option<&MidiMapping> {
        self.mappings.get(key)
    }

    /// Replace the whole table. Later duplicates of a key win.
    pub fn load(&mut self, mappings: impl IntoIterator<Item = MidiMapping>) {
        self.mappings.clear();
        for mapping in mappings {
            self.insert(mapping);
        }
    }

    /// Current mappings in key order
    pub fn to_vec(&self) -> Vec<MidiMapping> {
        self.mappings.values().cloned().collect()
    }

    pub fn is_mapped(&self, target: &LearnTarget) -> bool {
        self.mappings.values().any(|m| m.target() == *target)
    }

    /// Gate mappings listening on `channel`, in module order
    pub fn gates(&self, channel: u8) -> impl Iterator<Item = &MidiMapping> {
        self.mappings
            .range(
                MappingKey::Gate {
                    channel,
                    module: String::new(),
                }..,
            )
            .take_while(move |(k, _)| matches!(k, MappingKey::Gate { channel: c, .. } if *c == channel))
            .map(|(_, m)| m)
    }

    /// Drop every mapping targeting `module`
    pub fn remove_module(&mut self, module: &str) -> usize {
        let before = self.mappings.len();
        self.mappings.retain(|_, m| m.module() != module);
        before - self.mappings.len()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cc(channel: u8, cc: u8, module: &str) -> MidiMapping {
        MidiMapping::Cc {
            channel,
            cc,
            module_key: module.into(),
            param_key: "frequency".into(),
            min: 20.0,
            max: 20_000.0,
        }
    }

    fn gate(channel: u8, module: &str) -> MidiMapping {
        MidiMapping::Gate {
            channel,
            module_key: module.into(),
        }
    }

    #[test]
    fn test_wire_format() {
        let mapping = cc(2, 74, "Oscillator 0");
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            json!({
                "kind": "cc",
                "channel": 2,
                "cc": 74,
                "moduleKey": "Oscillator 0",
                "paramKey": "frequency",
                "min": 20.0,
                "max": 20000.0
            })
        );

        let note: MidiMapping = serde_json::from_value(json!({
            "kind": "note",
            "channel": 0,
            "moduleKey": "Oscillator 0",
            "paramKey": "frequency"
        }))
        .unwrap();
        assert_eq!(note.key(), MappingKey::Note { channel: 0 });
    }

    #[test]
    fn test_cc_range_defaults() {
        let mapping: MidiMapping = serde_json::from_value(json!({
            "kind": "cc",
            "channel": 0,
            "cc": 1,
            "moduleKey": "Gain 0",
            "paramKey": "gain"
        }))
        .unwrap();
        assert!(matches!(mapping, MidiMapping::Cc { min, max, .. } if min == 0.0 && max == 1.0));
    }

    #[test]
    fn test_insert_overwrites_same_key() {
        let mut table = MappingTable::new();
        assert!(table.insert(cc(0, 1, "Oscillator 0")).is_none());
        let replaced = table.insert(cc(0, 1, "Oscillator 1"));
        assert_eq!(replaced, Some(cc(0, 1, "Oscillator 0")));
        assert_eq!(table.len(), 1);
        assert!(table.is_mapped(&LearnTarget::param("Oscillator 1", "frequency")));
        assert!(!table.is_mapped(&LearnTarget::param("Oscillator 0", "frequency")));
    }

    #[test]
    fn test_gates_per_channel() {
        let mut table = MappingTable::new();
        table.load(vec![
            gate(1, "Envelope 1"),
            gate(0, "Envelope 0"),
            gate(1, "Envelope 0"),
            cc(1, 7, "Gain 0"),
        ]);
        let on_one: Vec<_> = table.gates(1).map(|m| m.module().to_string()).collect();
        assert_eq!(on_one, vec!["Envelope 0", "Envelope 1"]);
        assert_eq!(table.gates(0).count(), 1);
        assert_eq!(table.gates(5).count(), 0);
    }

    #[test]
    fn test_load_replaces_and_empty_clears() {
        let mut table = MappingTable::new();
        table.insert(cc(0, 1, "Oscillator 0"));
        table.load(vec![gate(0, "Envelope 0")]);
        assert_eq!(table.to_vec(), vec![gate(0, "Envelope 0")]);
        assert!(table.is_mapped(&LearnTarget::gate("Envelope 0")));

        table.load(Vec::new());
        assert!(table.is_empty());
        assert!(!table.is_mapped(&LearnTarget::gate("Envelope 0")));
    }

    #[test]
    fn test_remove_module() {
        let mut table = MappingTable::new();
        table.load(vec![cc(0, 1, "Oscillator 0"), gate(0, "Envelope 0")]);
        assert_eq!(table.remove_module("Oscillator 0"), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_target_keys() {
        assert_eq!(
            LearnTarget::param("Oscillator 0", "frequency").key(),
            "Oscillator 0::frequency"
        );
        assert_eq!(LearnTarget::gate("Envelope 0").key(), "Envelope 0::gate");
        assert!(LearnTarget::gate("Envelope 0").is_gate());
    }
}
