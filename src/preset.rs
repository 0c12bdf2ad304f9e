//! Preset Codec
//!
//! A [`Preset`] is a portable snapshot of a patch: every module with its
//! position and parameter payload, every completed cable, and optionally the
//! MIDI mapping table. The persisted form is JSON:
//!
//! ```json
//! {
//!   "name": "Bass",
//!   "modules": [{ "key": "Oscillator 0", "type": "Oscillator", "inputOnly": false,
//!                 "position": { "x": 40.0, "y": 80.0 }, "params": { "frequency": 110.0 } }],
//!   "connections": [{ "fromModID": "Oscillator 0", "toModID": "Output" }],
//!   "midiMappings": { "mappings": [] }
//! }
//! ```
//!
//! Restoring is asynchronous: modules may finish initializing late, so
//! cables are wired by a [`Reconnector`] that polls readiness.

use crate::graph::{PatchGraph, Point};
use crate::ids::OUTPUT_ID;
use crate::midi::MidiMapping;
use crate::module::SynthModule;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One module in a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub input_only: bool,
    pub position: Point,
    pub params: Map<String, Value>,
}

/// One completed cable in a preset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(rename = "fromModID")]
    pub from_mod_id: String,
    #[serde(rename = "toModID")]
    pub to_mod_id: String,
}

impl ConnectionRecord {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_mod_id: from.into(),
            to_mod_id: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMappings {
    pub mappings: Vec<MidiMapping>,
}

/// Serializable patch snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub modules: Vec<ModuleRecord>,
    pub connections: Vec<ConnectionRecord>,
    #[serde(
        rename = "midiMappings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub midi_mappings: Option<MidiMappings>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            connections: Vec::new(),
            midi_mappings: None,
        }
    }

    /// Snapshot modules, completed cables and mappings
    pub fn capture<'a>(
        name: impl Into<String>,
        modules: impl IntoIterator<Item = (&'a str, &'a dyn SynthModule, Point)>,
        graph: &PatchGraph,
        mappings: Option<Vec<MidiMapping>>,
    ) -> Self {
        let modules = modules
            .into_iter()
            .map(|(key, module, position)| ModuleRecord {
                key: key.to_string(),
                module_type: module.type_name().to_string(),
                input_only: module.input_only(),
                position,
                params: module.serialize(),
            })
            .collect();
        let connections = graph
            .connections()
            .into_iter()
            .map(|(from, to)| ConnectionRecord::new(from, to))
            .collect();
        Self {
            name: name.into(),
            modules,
            connections,
            midi_mappings: mappings.map(|mappings| MidiMappings { mappings }),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Decode a preset, or `None` when the value is structurally invalid.
    ///
    /// Beyond the field shapes, module keys must be unique and non-empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let preset: Preset = match serde_json::from_value(value.clone()) {
            Ok(preset) => preset,
            Err(err) => {
                tracing::debug!(%err, "malformed preset");
                return None;
            }
        };
        let mut keys = HashSet::new();
        if preset
            .modules
            .iter()
            .any(|m| m.key.is_empty() || !keys.insert(m.key.as_str()))
        {
            tracing::debug!(name = %preset.name, "preset has empty or duplicate module keys");
            return None;
        }
        Some(preset)
    }

    pub fn from_json(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        Self::from_value(&value)
    }

    pub fn module(&self, key: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.key == key)
    }
}

/// Outcome of one reconnection poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectStatus {
    /// Not due yet, or some endpoints are still not ready
    Waiting,
    /// Every endpoint is ready; wire these
    Ready(Vec<ConnectionRecord>),
    /// Gave up; wire `ready`, drop `skipped`
    TimedOut {
        ready: Vec<ConnectionRecord>,
        skipped: Vec<ConnectionRecord>,
    },
}

/// Polls module readiness until a preset's cables can be wired
#[derive(Debug, Clone)]
pub struct Reconnector {
    pending: Vec<ConnectionRecord>,
    deadline: f64,
    next_attempt: f64,
    retry: f64,
}

impl Reconnector {
    /// Start waiting at `now` (seconds)
    pub fn new(connections: Vec<ConnectionRecord>, now: f64, timeout: f64, retry: f64) -> Self {
        Self {
            pending: connections,
            deadline: now + timeout.max(0.0),
            next_attempt: now,
            retry: retry.max(0.0),
        }
    }

    pub fn pending(&self) -> &[ConnectionRecord] {
        &self.pending
    }

    /// Check readiness if an attempt is due.
    ///
    /// `is_ready` is asked about module and dock ids. The terminal sink is
    /// always ready. Once this returns anything but `Waiting` the
    /// reconnector is spent.
    pub fn poll(&mut self, now: f64, is_ready: impl Fn(&str) -> bool) -> ReconnectStatus {
        if self.pending.is_empty() {
            return ReconnectStatus::Ready(Vec::new());
        }
        if now < self.next_attempt {
            return ReconnectStatus::Waiting;
        }
        self.next_attempt = now + self.retry;

        let ready = |c: &ConnectionRecord| {
            is_ready(&c.from_mod_id) && (c.to_mod_id == OUTPUT_ID || is_ready(&c.to_mod_id))
        };
        if self.pending.iter().all(ready) {
            return ReconnectStatus::Ready(std::mem::take(&mut self.pending));
        }
        if now >= self.deadline {
            let (ready, skipped): (Vec<_>, Vec<_>) =
                std::mem::take(&mut self.pending).into_iter().partition(ready);
            for c in &skipped {
                tracing::warn!(from = %c.from_mod_id, to = %c.to_mod_id, "connection skipped, endpoint never became ready");
            }
            return ReconnectStatus::TimedOut { ready, skipped };
        }
        ReconnectStatus::Waiting
    }
}
