//! Workspace
//!
//! The editor-facing facade. A [`Workspace`] owns the audio host, the live
//! modules, the patch graph, the MIDI engine and the advisory queue, and
//! keeps them consistent: removing a module drops its cables and mappings,
//! MIDI playback writes land on module parameters, and presets are captured
//! from and restored into the whole set.
//!
//! Everything runs on the caller's thread. Time-driven work (deferred
//! permission requests, preset reconnection, advisory expiry, sequencer
//! clocks) advances only when [`Workspace::poll`] and
//! [`Workspace::run_timers`] are called.

use crate::advisory::{Advisories, Severity};
use crate::config::EditorConfig;
use crate::error::{HostError, ModuleError, PatchError, Rejection, WorkspaceError};
use crate::graph::{CableId, CableSource, CableTarget, PatchGraph, Point};
use crate::host::{AudioHost, Endpoint};
use crate::ids::{dock_module, is_param_dock, module_key, split_module_key, OUTPUT_ID};
use crate::midi::{
    LearnTarget, MidiAction, MidiEngine, MidiInputHub, MidiOutcome, MidiPortInfo, MidiSender,
    PortChange,
};
use crate::module::SynthModule;
use crate::modules::{Sequencer, Step};
use crate::param::{ListenerKey, ParamValue};
use crate::preset::{ConnectionRecord, Preset, ReconnectStatus, Reconnector};
use crate::registry::ModuleRegistry;
use crate::store::{export_preset, import_preset, PresetStore};
use std::collections::HashMap;
use std::path::Path;

/// A module placed on the canvas
pub struct PlacedModule {
    pub key: String,
    pub module: Box<dyn SynthModule>,
    pub position: Point,
}

/// Editor state around one audio host
pub struct Workspace<H: AudioHost> {
    host: H,
    registry: ModuleRegistry,
    config: EditorConfig,
    modules: Vec<PlacedModule>,
    counters: HashMap<String, usize>,
    /// Modules whose input-device permission is still unanswered
    deferred: Vec<String>,
    graph: PatchGraph,
    midi: MidiEngine,
    midi_input: MidiInputHub,
    advisories: Advisories,
    reconnector: Option<Reconnector>,
}

impl<H: AudioHost> Workspace<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, EditorConfig::default())
    }

    pub fn with_config(host: H, config: EditorConfig) -> Self {
        Self::with_registry(host, config, ModuleRegistry::new())
    }

    pub fn with_registry(host: H, config: EditorConfig, registry: ModuleRegistry) -> Self {
        let advisories = Advisories::new(
            config.advisory_ttl().as_secs_f64(),
            config.max_advisories,
        );
        Self {
            host,
            registry,
            config,
            modules: Vec::new(),
            counters: HashMap::new(),
            deferred: Vec::new(),
            graph: PatchGraph::new(),
            midi: MidiEngine::new(),
            midi_input: MidiInputHub::new(),
            advisories,
            reconnector: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn graph(&self) -> &PatchGraph {
        &self.graph
    }

    pub fn midi(&self) -> &MidiEngine {
        &self.midi
    }

    pub fn advisories(&self) -> &Advisories {
        &self.advisories
    }

    pub fn dismiss_advisory(&mut self, id: u64) -> bool {
        self.advisories.dismiss(id)
    }

    fn advise(&mut self, message: impl Into<String>, severity: Severity) {
        let now = self.host.current_time();
        self.advisories.raise(message, severity, now);
    }

    // =========================================================================
    // Modules
    // =========================================================================

    pub fn module(&self, key: &str) -> Option<&dyn SynthModule> {
        self.placed(key).map(|p| p.module.as_ref())
    }

    pub fn module_mut(&mut self, key: &str) -> Option<&mut (dyn SynthModule + 'static)> {
        self.placed_mut(key).map(|p| p.module.as_mut())
    }

    fn placed(&self, key: &str) -> Option<&PlacedModule> {
        self.modules.iter().find(|p| p.key == key)
    }

    fn placed_mut(&mut self, key: &str) -> Option<&mut PlacedModule> {
        self.modules.iter_mut().find(|p| p.key == key)
    }

    /// Module ids in placement order
    pub fn module_keys(&self) -> Vec<&str> {
        self.modules.iter().map(|p| p.key.as_str()).collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn position(&self, key: &str) -> Option<Point> {
        self.placed(key).map(|p| p.position)
    }

    /// Whether the module waits on an input-device permission
    pub fn is_deferred(&self, key: &str) -> bool {
        self.deferred.iter().any(|k| k == key)
    }

    fn next_key(&mut self, type_name: &str) -> String {
        let counter = self.counters.entry(type_name.to_string()).or_insert(0);
        loop {
            let key = module_key(type_name, *counter);
            *counter += 1;
            if !self.modules.iter().any(|p| p.key == key) {
                return key;
            }
        }
    }

    /// Keep generated ids clear of ids restored from a preset
    fn reserve_key(&mut self, key: &str) {
        if let (type_name, Some(index)) = split_module_key(key) {
            let counter = self.counters.entry(type_name.to_string()).or_insert(0);
            *counter = (*counter).max(index + 1);
        }
    }

    /// Instantiate and initialize a module of `type_name` at `position`.
    ///
    /// Returns the new module id. A module whose input-device permission is
    /// pending is placed but stays uninitialized until [`poll`](Self::poll)
    /// sees the permission granted. A denied permission removes the module
    /// and raises an advisory.
    pub fn add_module(&mut self, type_name: &str, position: Point) -> Result<String, WorkspaceError> {
        let module = self.registry.create(type_name)?;
        let key = self.next_key(type_name);
        self.place(key.clone(), module, position)?;
        Ok(key)
    }

    fn place(
        &mut self,
        key: String,
        mut module: Box<dyn SynthModule>,
        position: Point,
    ) -> Result<(), WorkspaceError> {
        match module.init(&mut self.host) {
            Ok(()) => {
                module.refresh(&mut self.host);
                tracing::info!(module = %key, "module added");
            }
            Err(ModuleError::Host(HostError::PermissionPending)) => {
                tracing::info!(module = %key, "module waiting for input permission");
                self.deferred.push(key.clone());
            }
            Err(ModuleError::Host(HostError::PermissionDenied)) => {
                tracing::warn!(module = %key, "input permission denied");
                self.advise(format!("{key}: input permission denied"), Severity::Error);
                return Err(ModuleError::Host(HostError::PermissionDenied).into());
            }
            Err(err) => return Err(err.into()),
        }
        self.modules.push(PlacedModule {
            key,
            module,
            position,
        });
        Ok(())
    }

    /// Remove a module with its cables and mappings, then release its nodes
    pub fn remove_module(&mut self, key: &str) -> Result<(), WorkspaceError> {
        let index = self
            .modules
            .iter()
            .position(|p| p.key == key)
            .ok_or_else(|| WorkspaceError::UnknownModule(key.to_string()))?;
        let removed = self.graph.remove_module(key, &mut self.host);
        self.midi.remove_module(key);
        self.deferred.retain(|k| k != key);
        let mut placed = self.modules.remove(index);
        placed.module.dispose(&mut self.host);
        tracing::info!(module = %key, cables = removed.len(), "module removed");
        Ok(())
    }

    /// Current steps of a sequencing module
    pub fn steps(&self, key: &str) -> Option<&[Step]> {
        self.module(key)
            .and_then(|m| m.as_sequencer())
            .map(Sequencer::steps)
    }

    fn sequencer_mut(&mut self, key: &str) -> Result<&mut Sequencer, WorkspaceError> {
        let placed = self
            .placed_mut(key)
            .ok_or_else(|| WorkspaceError::UnknownModule(key.to_string()))?;
        placed
            .module
            .as_sequencer_mut()
            .ok_or_else(|| WorkspaceError::NotASequencer(key.to_string()))
    }

    /// Resize a sequencer; returns the new steps
    pub fn set_step_count(&mut self, key: &str, count: usize) -> Result<Vec<Step>, WorkspaceError> {
        Ok(self.sequencer_mut(key)?.set_step_count(count))
    }

    pub fn set_step_note(
        &mut self,
        key: &str,
        index: usize,
        note: u8,
    ) -> Result<Vec<Step>, WorkspaceError> {
        Ok(self.sequencer_mut(key)?.set_step_note(index, note))
    }

    pub fn toggle_step(&mut self, key: &str, index: usize) -> Result<Vec<Step>, WorkspaceError> {
        Ok(self.sequencer_mut(key)?.toggle_step(index))
    }

    pub fn move_module(&mut self, key: &str, position: Point) -> Result<(), WorkspaceError> {
        let placed = self
            .placed_mut(key)
            .ok_or_else(|| WorkspaceError::UnknownModule(key.to_string()))?;
        placed.position = position;
        Ok(())
    }

    /// Remove every module and cable. MIDI mappings are kept.
    pub fn clear(&mut self) {
        self.graph.clear(&mut self.host);
        self.reconnector = None;
        self.deferred.clear();
        for mut placed in self.modules.drain(..) {
            placed.module.dispose(&mut self.host);
        }
        self.counters.clear();
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    pub fn param(&self, key: &str, name: &str) -> Option<ParamValue> {
        self.module(key)?.param(name).map(|p| p.value())
    }

    /// Write a parameter. Returns whether the value changed.
    pub fn set_param(
        &mut self,
        key: &str,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<bool, WorkspaceError> {
        let placed = self
            .modules
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| WorkspaceError::UnknownModule(key.to_string()))?;
        let changed = placed.module.set_param(name, value.into())?;
        if changed {
            placed.module.refresh(&mut self.host);
        }
        Ok(changed)
    }

    /// Observe a parameter's accepted values
    pub fn subscribe(
        &mut self,
        key: &str,
        name: &str,
        listener: impl FnMut(&ParamValue) + 'static,
    ) -> Result<ListenerKey, WorkspaceError> {
        let module = self
            .module_mut(key)
            .ok_or_else(|| WorkspaceError::UnknownModule(key.to_string()))?;
        let type_name = module.type_name();
        let param = module
            .param_mut(name)
            .ok_or_else(|| ModuleError::UnknownParam {
                module: type_name,
                param: name.to_string(),
            })?;
        Ok(param.subscribe(listener))
    }

    // =========================================================================
    // Cables
    // =========================================================================

    /// Start a cable from a module's output
    pub fn begin_cable(&mut self, module: &str, anchor: Point) -> Result<CableId, WorkspaceError> {
        let placed = self
            .placed(module)
            .ok_or_else(|| WorkspaceError::UnknownModule(module.to_string()))?;
        let output = placed.module.node()?;
        Ok(self.graph.begin(CableSource {
            module: module.to_string(),
            anchor,
            output,
        }))
    }

    /// Complete the pending cable onto a module, a parameter dock or the
    /// output sink.
    ///
    /// Any rejection raises an advisory carrying its reason and leaves the
    /// graph idle.
    pub fn complete_cable(
        &mut self,
        destination: &str,
        anchor: Point,
    ) -> Result<CableId, WorkspaceError> {
        let Some(pending) = self.graph.pending() else {
            return Err(PatchError::NotPending.into());
        };
        let source = pending.source.module.clone();

        let resolved = self
            .graph
            .check(&source, destination)
            .and_then(|_| self.resolve(destination).ok_or(Rejection::NoInput));
        let endpoint = match resolved {
            Ok(endpoint) => endpoint,
            Err(rejection) => {
                self.graph.cancel();
                tracing::warn!(%source, %destination, %rejection, "cable rejected");
                self.advise(rejection.to_string(), Severity::Warning);
                return Err(PatchError::Rejected(rejection).into());
            }
        };

        let target = CableTarget {
            id: destination.to_string(),
            anchor,
            endpoint,
        };
        match self.graph.complete(target, &mut self.host) {
            Ok(id) => Ok(id),
            Err(PatchError::Rejected(rejection)) => {
                self.advise(rejection.to_string(), Severity::Warning);
                Err(PatchError::Rejected(rejection).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Live endpoint behind a destination id
    fn resolve(&self, destination: &str) -> Option<Endpoint> {
        if destination == OUTPUT_ID {
            return Some(Endpoint::input(self.host.destination()));
        }
        let module = self.module(dock_module(destination))?;
        if is_param_dock(destination) {
            module.param_node()
        } else {
            module.input()
        }
    }

    pub fn cancel_cable(&mut self) -> bool {
        self.graph.cancel()
    }

    pub fn delete_cable(&mut self, id: CableId) -> Result<(), WorkspaceError> {
        self.graph.delete(id, &mut self.host)?;
        Ok(())
    }

    /// Connect two ids directly, as when restoring a preset
    pub fn connect(&mut self, from: &str, to: &str) -> Result<CableId, WorkspaceError> {
        self.begin_cable(from, Point::default())?;
        self.complete_cable(to, Point::default())
    }

    // =========================================================================
    // MIDI
    // =========================================================================

    pub fn toggle_learn(&mut self) -> bool {
        self.midi.toggle_learn()
    }

    /// Leave learn mode and disarm
    pub fn escape(&mut self) {
        self.midi.escape();
    }

    /// Arm a parameter for capture.
    ///
    /// A captured CC mapping spans the parameter's own range, or the
    /// configured default range for non-numeric parameters. A captured Note
    /// mapping drives the module's note parameter, whichever parameter was
    /// armed. Returns `false` when learn mode is off or the parameter does
    /// not exist.
    pub fn arm_param(&mut self, module: &str, param: &str) -> bool {
        let Some(placed) = self.module(module) else {
            return false;
        };
        let Some(found) = placed.param(param) else {
            return false;
        };
        let range = found.range().unwrap_or(self.config.default_cc_range);
        let note_param = placed.note_param();
        self.midi
            .arm(LearnTarget::param(module, param), range, note_param)
    }

    /// Arm a module's gate for capture
    pub fn arm_gate(&mut self, module: &str) -> bool {
        if !self.module(module).is_some_and(|m| m.is_gate_target()) {
            return false;
        }
        let range = self.config.default_cc_range;
        self.midi.arm(LearnTarget::gate(module), range, None)
    }

    pub fn is_mapped(&self, target: &LearnTarget) -> bool {
        self.midi.is_mapped(target)
    }

    /// Handle one raw MIDI message and apply any playback actions
    pub fn handle_midi(&mut self, bytes: &[u8]) -> MidiOutcome {
        let outcome = self.midi.handle_bytes(bytes);
        match &outcome {
            MidiOutcome::Captured(mapping) => {
                tracing::info!(key = ?mapping.key(), module = %mapping.module(), "MIDI mapping learned");
            }
            MidiOutcome::Played(actions) => {
                for action in actions {
                    self.apply(action);
                }
            }
            MidiOutcome::Ignored => {}
        }
        outcome
    }

    fn apply(&mut self, action: &MidiAction) {
        let host = &mut self.host;
        match action {
            MidiAction::SetParam {
                module,
                param,
                value,
            } => {
                let Some(placed) = self.modules.iter_mut().find(|p| &p.key == module) else {
                    return;
                };
                let changed = placed
                    .module
                    .param_mut(param)
                    .is_some_and(|p| p.set_number(*value));
                if changed {
                    placed.module.refresh(host);
                }
            }
            MidiAction::Attack { module } => {
                if let Some(placed) = self.modules.iter_mut().find(|p| &p.key == module) {
                    placed.module.attack(host);
                }
            }
            MidiAction::Release { module } => {
                if let Some(placed) = self.modules.iter_mut().find(|p| &p.key == module) {
                    placed.module.release(host);
                }
            }
        }
    }

    /// Sender for a MIDI driver callback
    pub fn midi_sender(&self) -> MidiSender {
        self.midi_input.sender()
    }

    /// Handle every queued MIDI message. Returns how many were handled.
    pub fn process_midi(&mut self) -> usize {
        let queued = self.midi_input.drain();
        let count = queued.len();
        for bytes in queued {
            self.handle_midi(&bytes);
        }
        count
    }

    /// Report the current MIDI ports, raising an advisory per change
    pub fn update_midi_ports(&mut self, ports: Vec<MidiPortInfo>) -> Vec<PortChange> {
        let changes = self.midi_input.update_ports(ports);
        for change in &changes {
            let message = match change {
                PortChange::Connected(p) => format!("MIDI connected: {}", p.name),
                PortChange::Disconnected(p) => format!("MIDI disconnected: {}", p.name),
            };
            self.advise(message, Severity::Info);
        }
        changes
    }

    pub fn midi_ports(&self) -> &[MidiPortInfo] {
        self.midi_input.ports()
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Deliver due host timers to the modules that own them
    pub fn run_timers(&mut self) {
        for timer in self.host.due_timers() {
            let owner = self.modules.iter_mut().find(|p| {
                p.module
                    .core()
                    .live()
                    .is_some_and(|live| live.timers.contains(&timer))
            });
            if let Some(placed) = owner {
                placed.module.on_timer(timer, &mut self.host);
            }
        }
    }

    /// Advance deferred work: expire advisories, retry modules waiting on
    /// permission, and wire preset cables whose endpoints became ready.
    pub fn poll(&mut self) {
        let now = self.host.current_time();
        self.advisories.expire(now);
        self.retry_deferred();
        self.poll_reconnect(now);
    }

    fn retry_deferred(&mut self) {
        for key in std::mem::take(&mut self.deferred) {
            let Some(placed) = self.modules.iter_mut().find(|p| p.key == key) else {
                continue;
            };
            match placed.module.init(&mut self.host) {
                Ok(()) => {
                    placed.module.refresh(&mut self.host);
                    tracing::info!(module = %key, "input permission granted");
                }
                Err(ModuleError::Host(HostError::PermissionPending)) => self.deferred.push(key),
                Err(err) => {
                    tracing::warn!(module = %key, %err, "module setup aborted");
                    self.advise(format!("{key}: {err}"), Severity::Error);
                    if let Err(err) = self.remove_module(&key) {
                        tracing::warn!(module = %key, %err, "failed to remove module");
                    }
                }
            }
        }
    }

    /// Whether a cable endpoint id refers to a live module
    fn is_ready(&self, id: &str) -> bool {
        self.module(dock_module(id))
            .is_some_and(|m| m.core().is_initialized())
    }

    fn poll_reconnect(&mut self, now: f64) {
        let Some(mut reconnector) = self.reconnector.take() else {
            return;
        };
        match reconnector.poll(now, |id| self.is_ready(id)) {
            ReconnectStatus::Waiting => self.reconnector = Some(reconnector),
            ReconnectStatus::Ready(connections) => self.wire(connections),
            ReconnectStatus::TimedOut { ready, skipped } => {
                self.wire(ready);
                self.advise(
                    format!("{} connection(s) could not be restored", skipped.len()),
                    Severity::Warning,
                );
            }
        }
    }

    fn wire(&mut self, connections: Vec<ConnectionRecord>) {
        for c in connections {
            if let Err(err) = self.connect(&c.from_mod_id, &c.to_mod_id) {
                tracing::warn!(from = %c.from_mod_id, to = %c.to_mod_id, %err, "connection not restored");
            }
        }
    }

    /// Whether preset cables are still waiting to be wired
    pub fn is_reconnecting(&self) -> bool {
        self.reconnector.is_some()
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Capture the current patch, including MIDI mappings
    pub fn snapshot(&self, name: &str) -> Preset {
        Preset::capture(
            name,
            self.modules
                .iter()
                .map(|p| (p.key.as_str(), p.module.as_ref() as &dyn SynthModule, p.position)),
            &self.graph,
            Some(self.midi.mappings()),
        )
    }

    /// Replace the current patch with `preset`.
    ///
    /// Modules are recreated and restored immediately. Cables are wired by
    /// [`poll`](Self::poll) once their endpoints are live, or dropped when the
    /// reconnect timeout passes first. Unknown module types are skipped.
    pub fn load_preset(&mut self, preset: &Preset) {
        self.clear();
        self.midi.disarm();
        tracing::info!(name = %preset.name, modules = preset.modules.len(), "loading preset");

        for record in &preset.modules {
            let mut module = match self.registry.create(&record.module_type) {
                Ok(module) => module,
                Err(err) => {
                    tracing::warn!(module = %record.key, %err, "module skipped");
                    self.advise(err.to_string(), Severity::Warning);
                    continue;
                }
            };
            if let Err(err) = module.deserialize(&record.params) {
                tracing::warn!(module = %record.key, %err, "module state not restored");
                self.advise(err.to_string(), Severity::Warning);
            }
            self.reserve_key(&record.key);
            if let Err(err) = self.place(record.key.clone(), module, record.position) {
                tracing::warn!(module = %record.key, %err, "module skipped");
            }
        }

        if let Some(mappings) = &preset.midi_mappings {
            self.midi.load(mappings.mappings.clone());
        }

        let now = self.host.current_time();
        self.reconnector = Some(Reconnector::new(
            preset.connections.clone(),
            now,
            self.config.reconnect_timeout().as_secs_f64(),
            self.config.reconnect_retry().as_secs_f64(),
        ));
        self.poll_reconnect(now);
    }

    /// Save a snapshot under `name`
    pub fn save(&self, store: &mut dyn PresetStore, name: &str) -> Result<(), WorkspaceError> {
        store.save(&self.snapshot(name))?;
        tracing::info!(name, "preset saved");
        Ok(())
    }

    /// Load the preset stored under `name`
    pub fn load(&mut self, store: &dyn PresetStore, name: &str) -> Result<(), WorkspaceError> {
        let preset = store
            .load(name)?
            .ok_or_else(|| WorkspaceError::PresetNotFound(name.to_string()))?;
        self.load_preset(&preset);
        Ok(())
    }

    pub fn export(&self, name: &str, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        export_preset(&self.snapshot(name), path)?;
        Ok(())
    }

    /// Load a preset file. Returns its name.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<String, WorkspaceError> {
        let preset = import_preset(path)?;
        self.load_preset(&preset);
        Ok(preset.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Automation, HeadlessHost, Permission};
    use crate::midi::MidiMapping;
    use crate::store::MemoryStore;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("patchwork=debug")
            .try_init();
    }

    fn workspace() -> Workspace<HeadlessHost> {
        init_tracing();
        Workspace::new(HeadlessHost::new())
    }

    fn number(ws: &Workspace<HeadlessHost>, key: &str, param: &str) -> f64 {
        ws.param(key, param).and_then(|v| v.as_number()).unwrap()
    }

    fn latest_advisory(ws: &Workspace<HeadlessHost>) -> String {
        ws.advisories().latest().map(|a| a.message.clone()).unwrap_or_default()
    }

    #[test]
    fn test_keys_count_per_type() {
        let mut ws = workspace();
        assert_eq!(ws.add_module("Gain", Point::default()).unwrap(), "Gain 0");
        assert_eq!(ws.add_module("Gain", Point::default()).unwrap(), "Gain 1");
        assert_eq!(ws.add_module("Filter", Point::default()).unwrap(), "Filter 0");
        assert!(matches!(
            ws.add_module("Theremin", Point::default()),
            Err(WorkspaceError::Module(ModuleError::UnknownType(_)))
        ));
        assert_eq!(ws.module_keys(), vec!["Gain 0", "Gain 1", "Filter 0"]);
    }

    #[test]
    fn test_gain_to_filter() {
        let mut ws = workspace();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        let filter = ws.add_module("Filter", Point::default()).unwrap();

        ws.begin_cable(&gain, Point::new(1.0, 1.0)).unwrap();
        ws.complete_cable(&filter, Point::new(2.0, 2.0)).unwrap();

        assert_eq!(ws.graph().cable_count(), 1);
        assert!(ws.graph().pending().is_none());
        assert!(ws.advisories().is_empty());
        let from = ws.module(&gain).unwrap().node().unwrap();
        let to = ws.module(&filter).unwrap().node().unwrap();
        assert!(ws.host().is_connected(from, Endpoint::input(to)));
    }

    #[test]
    fn test_rejections_raise_advisories() {
        let mut ws = workspace();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        let filter = ws.add_module("Filter", Point::default()).unwrap();
        let osc = ws.add_module("Oscillator", Point::default()).unwrap();

        ws.begin_cable(&gain, Point::default()).unwrap();
        assert!(ws.complete_cable(&gain, Point::default()).is_err());
        assert_eq!(latest_advisory(&ws), "Cannot connect to itself");
        assert_eq!(ws.graph().cable_count(), 0);

        ws.connect(&gain, &filter).unwrap();
        assert!(ws.connect(&gain, &filter).is_err());
        assert_eq!(latest_advisory(&ws), "Already connected");
        assert_eq!(ws.graph().cable_count(), 1);

        // Oscillators expose no input dock
        assert!(ws.connect(&gain, &osc).is_err());
        assert_eq!(latest_advisory(&ws), "Module has no input");
        assert!(ws.graph().pending().is_none());
        assert_eq!(ws.host().edge_count(), 1);
    }

    #[test]
    fn test_complete_without_pending() {
        let mut ws = workspace();
        ws.add_module("Gain", Point::default()).unwrap();
        assert!(matches!(
            ws.complete_cable("Gain 0", Point::default()),
            Err(WorkspaceError::Patch(PatchError::NotPending))
        ));
    }

    #[test]
    fn test_modulation_and_output() {
        let mut ws = workspace();
        let lfo = ws.add_module("LFO", Point::default()).unwrap();
        let osc = ws.add_module("Oscillator", Point::default()).unwrap();
        let comp = ws.add_module("Compressor", Point::default()).unwrap();

        ws.connect(&lfo, &crate::ids::param_dock(&osc)).unwrap();
        ws.connect(&osc, OUTPUT_ID).unwrap();
        // Compressors have no modulation input
        assert!(ws.connect(&lfo, &crate::ids::param_dock(&comp)).is_err());
        assert_eq!(latest_advisory(&ws), "Module has no input");

        assert_eq!(ws.graph().cable_count(), 2);
        let osc_node = ws.module(&osc).unwrap().node().unwrap();
        let sink = ws.host().destination();
        assert!(ws.host().is_connected(osc_node, Endpoint::input(sink)));
    }

    #[test]
    fn test_delete_then_reconnect() {
        let mut ws = workspace();
        ws.add_module("Gain", Point::default()).unwrap();
        ws.add_module("Filter", Point::default()).unwrap();
        let id = ws.connect("Gain 0", "Filter 0").unwrap();
        ws.delete_cable(id).unwrap();
        assert_eq!(ws.host().edge_count(), 0);

        ws.connect("Gain 0", "Filter 0").unwrap();
        assert_eq!(ws.graph().cable_count(), 1);
        assert!(ws.advisories().is_empty());
    }

    #[test]
    fn test_remove_module_cascades() {
        let mut ws = workspace();
        ws.add_module("Oscillator", Point::default()).unwrap();
        ws.add_module("Gain", Point::default()).unwrap();
        ws.add_module("Filter", Point::default()).unwrap();
        ws.connect("Oscillator 0", "Gain 0").unwrap();
        ws.connect("Gain 0", "Filter 0").unwrap();
        ws.connect("Filter 0", OUTPUT_ID).unwrap();

        ws.toggle_learn();
        assert!(ws.arm_param("Gain 0", "gain"));
        ws.handle_midi(&[0xB0, 7, 64]);
        assert!(ws.is_mapped(&LearnTarget::param("Gain 0", "gain")));

        ws.remove_module("Gain 0").unwrap();
        assert_eq!(ws.graph().connections(), vec![("Filter 0".to_string(), OUTPUT_ID.to_string())]);
        assert!(!ws.is_mapped(&LearnTarget::param("Gain 0", "gain")));
        assert_eq!(ws.host().edge_count(), 1);
        assert!(matches!(
            ws.remove_module("Gain 0"),
            Err(WorkspaceError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_set_param_and_subscribe() {
        let mut ws = workspace();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ws.subscribe(&gain, "gain", move |v| {
            sink.borrow_mut().push(v.as_number().unwrap_or_default())
        })
        .unwrap();

        assert!(ws.set_param(&gain, "gain", 5.0).unwrap());
        assert!(!ws.set_param(&gain, "gain", 2.0).unwrap());
        assert_eq!(number(&ws, &gain, "gain"), 2.0);
        assert_eq!(*seen.borrow(), vec![2.0]);
        assert!(matches!(
            ws.set_param(&gain, "cutoff", 1.0),
            Err(WorkspaceError::Module(ModuleError::UnknownParam { .. }))
        ));
    }

    #[test]
    fn test_cc_learn_and_playback() {
        let mut ws = workspace();
        let osc = ws.add_module("Oscillator", Point::default()).unwrap();

        assert!(!ws.arm_param(&osc, "frequency"));
        ws.toggle_learn();
        assert!(ws.arm_param(&osc, "frequency"));

        let outcome = ws.handle_midi(&[0xB2, 74, 100]);
        assert_eq!(
            outcome,
            MidiOutcome::Captured(MidiMapping::Cc {
                channel: 2,
                cc: 74,
                module_key: "Oscillator 0".into(),
                param_key: "frequency".into(),
                min: 20.0,
                max: 20000.0,
            })
        );
        assert!(ws.midi().armed().is_none());

        ws.toggle_learn();
        ws.handle_midi(&[0xB2, 74, 0]);
        assert_eq!(number(&ws, &osc, "frequency"), 20.0);
        ws.handle_midi(&[0xB2, 74, 127]);
        assert_eq!(number(&ws, &osc, "frequency"), 20000.0);
    }

    #[test]
    fn test_note_learn_and_playback() {
        let mut ws = workspace();
        let osc = ws.add_module("Oscillator", Point::default()).unwrap();
        ws.toggle_learn();
        ws.arm_param(&osc, "frequency");
        ws.handle_midi(&[0x90, 60, 100]);
        ws.escape();

        ws.handle_midi(&[0x90, 69, 100]);
        assert_relative_eq!(number(&ws, &osc, "frequency"), 440.0, epsilon = 1e-9);
        ws.handle_midi(&[0x90, 57, 100]);
        assert_relative_eq!(number(&ws, &osc, "frequency"), 220.0, epsilon = 1e-9);
    }

    #[test]
    fn test_note_learn_drives_frequency_whatever_is_armed() {
        let mut ws = workspace();
        let filter = ws.add_module("Filter", Point::default()).unwrap();
        ws.toggle_learn();
        assert!(ws.arm_param(&filter, "Q"));
        let outcome = ws.handle_midi(&[0x90, 60, 100]);
        assert!(matches!(
            outcome,
            MidiOutcome::Captured(MidiMapping::Note { ref param_key, .. }) if param_key == "frequency"
        ));
        ws.toggle_learn();

        ws.handle_midi(&[0x90, 69, 100]);
        assert_relative_eq!(number(&ws, &filter, "frequency"), 440.0, epsilon = 1e-9);
        assert_eq!(number(&ws, &filter, "Q"), 1.0);
    }

    #[test]
    fn test_note_learn_ignored_without_frequency() {
        let mut ws = workspace();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        ws.toggle_learn();
        ws.arm_param(&gain, "gain");
        assert_eq!(ws.handle_midi(&[0x90, 60, 100]), MidiOutcome::Ignored);
        assert!(ws.midi().armed().is_some());
        assert!(ws.midi().mappings().is_empty());
    }

    #[test]
    fn test_gate_drives_envelope() {
        let mut ws = workspace();
        let env = ws.add_module("Envelope", Point::default()).unwrap();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        assert!(!ws.arm_gate(&gain));

        ws.toggle_learn();
        assert!(!ws.arm_gate(&gain));
        assert!(ws.arm_gate(&env));
        assert!(matches!(
            ws.handle_midi(&[0x91, 60, 90]),
            MidiOutcome::Captured(MidiMapping::Gate { channel: 1, .. })
        ));
        ws.toggle_learn();

        let node = ws.module(&env).unwrap().node().unwrap();
        ws.handle_midi(&[0x91, 64, 90]);
        let scheduled = ws.host().automation(node, "gain");
        assert!(scheduled
            .iter()
            .any(|a| matches!(a, Automation::LinearRamp { value, .. } if *value == 1.0)));

        ws.handle_midi(&[0x81, 64, 0]);
        let scheduled = ws.host().automation(node, "gain");
        assert!(matches!(
            scheduled.last(),
            Some(Automation::LinearRamp { value, .. }) if *value == 0.0
        ));
    }

    #[test]
    fn test_queued_midi() {
        let mut ws = workspace();
        let osc = ws.add_module("Oscillator", Point::default()).unwrap();
        ws.toggle_learn();
        ws.arm_param(&osc, "frequency");
        ws.handle_midi(&[0xB0, 1, 0]);
        ws.toggle_learn();

        let sender = ws.midi_sender();
        sender.send(vec![0xB0, 1, 127]).unwrap();
        sender.send(vec![0xF8]).unwrap();
        assert_eq!(ws.process_midi(), 2);
        assert_eq!(number(&ws, &osc, "frequency"), 20000.0);
        assert_eq!(ws.process_midi(), 0);
    }

    #[test]
    fn test_port_changes_raise_advisories() {
        let mut ws = workspace();
        ws.update_midi_ports(vec![MidiPortInfo::new("a", "Keys")]);
        assert_eq!(latest_advisory(&ws), "MIDI connected: Keys");
        ws.update_midi_ports(Vec::new());
        assert_eq!(latest_advisory(&ws), "MIDI disconnected: Keys");
        assert!(ws.midi_ports().is_empty());
    }

    #[test]
    fn test_advisories_expire_on_poll() {
        let mut ws = workspace();
        ws.add_module("Gain", Point::default()).unwrap();
        ws.begin_cable("Gain 0", Point::default()).unwrap();
        let _ = ws.complete_cable("Gain 0", Point::default());
        assert_eq!(ws.advisories().len(), 1);
        ws.host_mut().advance(3.5);
        ws.poll();
        assert!(ws.advisories().is_empty());
    }

    #[test]
    fn test_step_edits_reach_the_clock() {
        let mut ws = workspace();
        let seq = ws.add_module("Sequencer", Point::default()).unwrap();
        assert_eq!(ws.set_step_count(&seq, 2).unwrap().len(), 2);
        ws.set_step_note(&seq, 0, 69).unwrap();
        let steps = ws.toggle_step(&seq, 1).unwrap();
        assert!(!steps[1].active);
        assert_eq!(ws.steps(&seq), Some(steps.as_slice()));

        let live = ws.module(&seq).unwrap().core().live().unwrap().clone();
        let (osc, gate) = (live.aux[0], live.aux[1]);
        ws.host_mut().advance(0.13);
        ws.run_timers();
        assert_relative_eq!(ws.host().control(osc, "frequency").unwrap().value(), 440.0);
        assert_eq!(ws.host().control(gate, "gain").unwrap().value(), 1.0);
        ws.host_mut().advance(0.125);
        ws.run_timers();
        assert_eq!(ws.host().control(gate, "gain").unwrap().value(), 0.0);

        let preset = ws.snapshot("Steps");
        let record = preset.module(&seq).unwrap();
        assert_eq!(record.params["steps"][0]["note"], 69);
        assert_eq!(record.params["steps"][1]["active"], false);
    }

    #[test]
    fn test_step_edits_need_a_sequencer() {
        let mut ws = workspace();
        let gain = ws.add_module("Gain", Point::default()).unwrap();
        assert!(ws.steps(&gain).is_none());
        assert!(matches!(
            ws.toggle_step(&gain, 0),
            Err(WorkspaceError::NotASequencer(_))
        ));
        assert!(matches!(
            ws.set_step_count("Sequencer 9", 4),
            Err(WorkspaceError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_sequencer_clock_runs_through_workspace() {
        let mut ws = workspace();
        let seq = ws.add_module("Sequencer", Point::default()).unwrap();
        ws.host_mut().advance(0.35);
        ws.run_timers();
        let aux_gate = ws.module(&seq).unwrap().core().live().unwrap().aux[1];
        let gate = ws.host().control(aux_gate, "gain").unwrap();
        assert_eq!(gate.value(), 1.0);

        ws.remove_module(&seq).unwrap();
        assert_eq!(ws.host().timer_count(), 0);
    }

    #[test]
    fn test_permission_pending_then_granted() {
        let mut ws = workspace();
        ws.host_mut().set_permission(Permission::Pending);
        let mic = ws.add_module("Microphone", Point::default()).unwrap();
        assert!(ws.is_deferred(&mic));
        assert!(ws.begin_cable(&mic, Point::default()).is_err());

        ws.poll();
        assert!(ws.is_deferred(&mic));

        ws.host_mut().set_permission(Permission::Granted);
        ws.poll();
        assert!(!ws.is_deferred(&mic));
        assert!(ws.module(&mic).unwrap().node().is_ok());
    }

    #[test]
    fn test_permission_denied_removes_module() {
        let mut ws = workspace();
        ws.host_mut().set_permission(Permission::Denied);
        assert!(ws.add_module("Microphone", Point::default()).is_err());
        assert_eq!(ws.module_count(), 0);
        assert_eq!(ws.host().node_count(), 0);
        assert!(latest_advisory(&ws).contains("permission denied"));

        ws.host_mut().set_permission(Permission::Pending);
        let mic = ws.add_module("Microphone", Point::default()).unwrap();
        ws.host_mut().set_permission(Permission::Denied);
        ws.poll();
        assert!(ws.module(&mic).is_none());
    }

    fn build_patch(ws: &mut Workspace<HeadlessHost>) {
        ws.add_module("Oscillator", Point::new(10.0, 20.0)).unwrap();
        ws.add_module("Filter", Point::new(200.0, 20.0)).unwrap();
        ws.add_module("Sequencer", Point::new(10.0, 200.0)).unwrap();
        ws.set_param("Oscillator 0", "waveform", "square").unwrap();
        ws.set_param("Filter 0", "frequency", 1234.5).unwrap();
        ws.connect("Oscillator 0", "Filter 0").unwrap();
        ws.connect("Filter 0", OUTPUT_ID).unwrap();
        ws.toggle_learn();
        ws.arm_param("Filter 0", "frequency");
        ws.handle_midi(&[0xB0, 74, 1]);
        ws.toggle_learn();
    }

    #[test]
    fn test_preset_roundtrip() {
        let mut ws = workspace();
        build_patch(&mut ws);
        let preset = ws.snapshot("Lead");
        let text = preset.to_json().unwrap();
        assert_eq!(Preset::from_json(&text).as_ref(), Some(&preset));

        let mut restored = workspace();
        restored.load_preset(&preset);
        assert!(!restored.is_reconnecting());
        assert_eq!(restored.snapshot("Lead"), preset);
        assert_eq!(restored.position("Filter 0"), Some(Point::new(200.0, 20.0)));
        assert_eq!(restored.host().edge_count(), ws.host().edge_count());

        // New modules don't collide with restored ids
        assert_eq!(
            restored.add_module("Oscillator", Point::default()).unwrap(),
            "Oscillator 1"
        );
    }

    #[test]
    fn test_preset_without_mappings_keeps_table() {
        let mut ws = workspace();
        build_patch(&mut ws);
        let mut preset = ws.snapshot("Lead");
        preset.midi_mappings = None;
        ws.load_preset(&preset);
        assert!(ws.is_mapped(&LearnTarget::param("Filter 0", "frequency")));
    }

    #[test]
    fn test_reconnect_waits_for_permission() {
        let mut ws = workspace();
        ws.add_module("Microphone", Point::default()).unwrap();
        ws.add_module("Gain", Point::default()).unwrap();
        ws.connect("Microphone 0", "Gain 0").unwrap();
        ws.connect("Gain 0", OUTPUT_ID).unwrap();
        let preset = ws.snapshot("Live");

        let mut restored = workspace();
        restored.host_mut().set_permission(Permission::Pending);
        restored.load_preset(&preset);
        assert!(restored.is_reconnecting());
        assert_eq!(restored.graph().cable_count(), 0);

        restored.host_mut().set_permission(Permission::Granted);
        restored.host_mut().advance(0.2);
        restored.poll();
        assert!(!restored.is_reconnecting());
        assert_eq!(restored.graph().cable_count(), 2);
    }

    #[test]
    fn test_reconnect_times_out() {
        let mut ws = workspace();
        ws.add_module("Microphone", Point::default()).unwrap();
        ws.add_module("Gain", Point::default()).unwrap();
        ws.connect("Microphone 0", "Gain 0").unwrap();
        ws.connect("Gain 0", OUTPUT_ID).unwrap();
        let preset = ws.snapshot("Live");

        let mut restored = workspace();
        restored.host_mut().set_permission(Permission::Pending);
        restored.load_preset(&preset);
        restored.host_mut().advance(6.0);
        restored.poll();

        assert!(!restored.is_reconnecting());
        assert_eq!(
            restored.graph().connections(),
            vec![("Gain 0".to_string(), OUTPUT_ID.to_string())]
        );
        assert_eq!(latest_advisory(&restored), "1 connection(s) could not be restored");
    }

    #[test]
    fn test_unknown_module_type_skipped() {
        let mut ws = workspace();
        build_patch(&mut ws);
        let mut preset = ws.snapshot("Odd");
        preset.modules[0].module_type = "Theremin".into();
        let mut restored = workspace();
        restored.load_preset(&preset);
        assert!(restored.module("Oscillator 0").is_none());
        assert_eq!(restored.module_count(), 2);
        restored.host_mut().advance(6.0);
        restored.poll();
        assert_eq!(restored.graph().cable_count(), 1);
    }

    #[test]
    fn test_store_and_files() {
        let mut ws = workspace();
        build_patch(&mut ws);
        let mut store = MemoryStore::new(ws.config().storage_prefix.clone());
        ws.save(&mut store, "Lead").unwrap();
        assert!(matches!(
            ws.load(&store, "Missing"),
            Err(WorkspaceError::PresetNotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lead.json");
        ws.export("Lead", &path).unwrap();

        let mut from_store = workspace();
        from_store.load(&store, "Lead").unwrap();
        let mut from_file = workspace();
        assert_eq!(from_file.import(&path).unwrap(), "Lead");
        assert_eq!(from_store.snapshot("Lead"), from_file.snapshot("Lead"));
        assert_eq!(from_file.graph().cable_count(), 2);
    }
}
