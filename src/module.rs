//! Synth Modules
//!
//! A [`SynthModule`] owns one live processing node (plus any auxiliary
//! always-on sources feeding it) and a fixed, ordered set of named
//! parameters. The lifecycle is:
//!
//! ```text
//! new() ──► init(host) ──► [deserialize] ──► dispose(host)
//!  params    node created,                    aux stopped, timers cancelled,
//!  only      aux started,                     edges removed, nodes released
//!            params bound
//! ```
//!
//! The live node is reachable only between `init` and `dispose`; outside that
//! window [`SynthModule::node`] returns [`ModuleError::NotInitialized`].

use crate::error::{HostError, ModuleError};
use crate::host::{AudioHost, Endpoint, NodeKey, TimerId};
use crate::modules::Sequencer;
use crate::param::{AnyParam, ParamValue};
use serde_json::{Map, Value};

/// Which of a module's live nodes a binding or port refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSlot {
    Primary,
    Aux(usize),
}

/// Ties a parameter to a control on one of the module's nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub param: &'static str,
    pub slot: NodeSlot,
    pub control: &'static str,
}

impl Binding {
    pub const fn primary(param: &'static str, control: &'static str) -> Self {
        Self {
            param,
            slot: NodeSlot::Primary,
            control,
        }
    }

    pub const fn aux(param: &'static str, index: usize, control: &'static str) -> Self {
        Self {
            param,
            slot: NodeSlot::Aux(index),
            control,
        }
    }
}

/// Host resources held by an initialized module
#[derive(Debug, Clone, PartialEq)]
pub struct LiveNodes {
    pub primary: NodeKey,
    pub aux: Vec<NodeKey>,
    pub timers: Vec<TimerId>,
}

impl LiveNodes {
    pub fn slot(&self, slot: NodeSlot) -> Option<NodeKey> {
        match slot {
            NodeSlot::Primary => Some(self.primary),
            NodeSlot::Aux(i) => self.aux.get(i).copied(),
        }
    }
}

/// State shared by every module type: the parameter map and live nodes
#[derive(Debug)]
pub struct ModuleCore {
    params: Vec<(&'static str, AnyParam)>,
    live: Option<LiveNodes>,
}

impl ModuleCore {
    pub fn new(params: Vec<(&'static str, AnyParam)>) -> Self {
        Self { params, live: None }
    }

    pub fn param(&self, name: &str) -> Option<&AnyParam> {
        self.params.iter().find(|(n, _)| *n == name).map(|(_, p)| p)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut AnyParam> {
        self.params
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    /// Parameters in declaration order
    pub fn params(&self) -> impl Iterator<Item = (&'static str, &AnyParam)> {
        self.params.iter().map(|(n, p)| (*n, p))
    }

    pub fn param_names(&self) -> Vec<&'static str> {
        self.params.iter().map(|(n, _)| *n).collect()
    }

    /// Current value of a numeric parameter, `0.0` if absent
    pub fn number(&self, name: &str) -> f64 {
        self.param(name)
            .and_then(|p| p.value().as_number())
            .unwrap_or(0.0)
    }

    pub fn live(&self) -> Option<&LiveNodes> {
        self.live.as_ref()
    }

    pub fn live_mut(&mut self) -> Option<&mut LiveNodes> {
        self.live.as_mut()
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    fn attach(
        &mut self,
        live: LiveNodes,
        bindings: &[Binding],
        host: &dyn AudioHost,
        module: &'static str,
    ) -> Result<(), ModuleError> {
        for binding in bindings {
            let node = live
                .slot(binding.slot)
                .ok_or(ModuleError::NotInitialized(module))?;
            let control = host.control(node, binding.control)?;
            self.param_mut(binding.param)
                .ok_or_else(|| ModuleError::UnknownParam {
                    module,
                    param: binding.param.to_string(),
                })?
                .bind(control);
        }
        self.live = Some(live);
        Ok(())
    }

    fn detach(&mut self) -> Option<LiveNodes> {
        for (_, param) in &mut self.params {
            param.unbind();
        }
        self.live.take()
    }

    pub fn serialize_params(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|(name, p)| (name.to_string(), p.serialize()))
            .collect()
    }

    /// Restore every parameter present in `state`; unknown keys are ignored
    pub fn deserialize_params(&mut self, state: &Map<String, Value>) {
        for (name, param) in &mut self.params {
            if let Some(raw) = state.get(*name) {
                param.deserialize(raw);
            }
        }
    }
}

/// One instance of a processing unit
pub trait SynthModule {
    /// Stable type name, as listed in the registry
    fn type_name(&self) -> &'static str;

    /// Whether the module exposes an input dock
    fn input_only(&self) -> bool;

    fn core(&self) -> &ModuleCore;

    fn core_mut(&mut self) -> &mut ModuleCore;

    /// Create the primary live node. No other side effects.
    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError>;

    /// Create, wire and start auxiliary always-on sources feeding `primary`
    fn create_aux(
        &mut self,
        _host: &mut dyn AudioHost,
        _primary: NodeKey,
    ) -> Result<Vec<NodeKey>, HostError> {
        Ok(Vec::new())
    }

    /// Parameter-to-control bindings applied at init
    fn bindings(&self) -> &'static [Binding] {
        &[]
    }

    /// The control exposed as a modulation input, if any
    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        None
    }

    /// Hook run after the nodes exist and parameters are bound
    fn on_init(&mut self, _host: &mut dyn AudioHost) -> Result<(), HostError> {
        Ok(())
    }

    /// Hook run before the nodes are released
    fn on_dispose(&mut self, _host: &mut dyn AudioHost) {}

    /// Re-derive host-side data (sample buffers, curves) from the current
    /// parameters. Called after parameter writes that don't map onto a
    /// live control.
    fn refresh(&mut self, _host: &mut dyn AudioHost) {}

    /// A host timer owned by this module fired
    fn on_timer(&mut self, _timer: TimerId, _host: &mut dyn AudioHost) {}

    /// Whether the module can be driven by a MIDI gate
    fn is_gate_target(&self) -> bool {
        false
    }

    /// Gate on
    fn attack(&mut self, _host: &mut dyn AudioHost) {}

    /// Gate off
    fn release(&mut self, _host: &mut dyn AudioHost) {}

    /// The parameter a keyboard (note) mapping writes, if any
    fn note_param(&self) -> Option<&'static str> {
        self.core()
            .param_names()
            .into_iter()
            .find(|name| *name == "frequency")
    }

    /// Step data, for modules that sequence notes
    fn as_sequencer(&self) -> Option<&Sequencer> {
        None
    }

    fn as_sequencer_mut(&mut self) -> Option<&mut Sequencer> {
        None
    }

    /// Create the live nodes and bind every parameter.
    ///
    /// Calling `init` on an initialized module does nothing. On failure every
    /// node created so far is released and the module stays uninitialized.
    fn init(&mut self, host: &mut dyn AudioHost) -> Result<(), ModuleError> {
        if self.core().is_initialized() {
            return Ok(());
        }
        let primary = self.create_node(host)?;
        let aux = match self.create_aux(host, primary) {
            Ok(aux) => aux,
            Err(err) => {
                host.release(primary);
                return Err(err.into());
            }
        };
        let live = LiveNodes {
            primary,
            aux: aux.clone(),
            timers: Vec::new(),
        };
        let bindings = self.bindings();
        let name = self.type_name();
        let attached = self.core_mut().attach(live, bindings, &*host, name);
        let started = attached.and_then(|_| self.on_init(host).map_err(ModuleError::from));
        if let Err(err) = started {
            if self.core().is_initialized() {
                self.dispose(host);
            } else {
                self.core_mut().detach();
                for node in aux.into_iter().chain(std::iter::once(primary)) {
                    host.release(node);
                }
            }
            return Err(err);
        }
        tracing::debug!(module = name, "module initialized");
        Ok(())
    }

    /// The primary live node
    fn node(&self) -> Result<NodeKey, ModuleError> {
        self.core()
            .live()
            .map(|live| live.primary)
            .ok_or(ModuleError::NotInitialized(self.type_name()))
    }

    /// The signal input, for modules with an input dock
    fn input(&self) -> Option<Endpoint> {
        if !self.input_only() {
            return None;
        }
        self.core().live().map(|live| Endpoint::input(live.primary))
    }

    /// The modulation input, for modules that expose one
    fn param_node(&self) -> Option<Endpoint> {
        let (slot, control) = self.param_port()?;
        let node = self.core().live()?.slot(slot)?;
        Some(Endpoint::control(node, control))
    }

    /// Stop auxiliary sources, cancel timers, disconnect and release every
    /// node. Safe to call any number of times.
    fn dispose(&mut self, host: &mut dyn AudioHost) {
        if !self.core().is_initialized() {
            return;
        }
        self.on_dispose(host);
        let Some(live) = self.core_mut().detach() else {
            return;
        };
        for timer in live.timers {
            host.cancel_timer(timer);
        }
        for node in live.aux.into_iter().chain(std::iter::once(live.primary)) {
            host.stop(node);
            host.disconnect_all(node);
            host.release(node);
        }
        tracing::debug!(module = self.type_name(), "module disposed");
    }

    fn param(&self, name: &str) -> Option<&AnyParam> {
        self.core().param(name)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut AnyParam> {
        self.core_mut().param_mut(name)
    }

    /// Set a parameter by name
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<bool, ModuleError> {
        let module = self.type_name();
        self.param_mut(name)
            .map(|p| p.set(value))
            .ok_or_else(|| ModuleError::UnknownParam {
                module,
                param: name.to_string(),
            })
    }

    /// Module payload for presets
    fn serialize(&self) -> Map<String, Value> {
        self.core().serialize_params()
    }

    /// Restore a payload produced by [`serialize`](Self::serialize)
    fn deserialize(&mut self, state: &Map<String, Value>) -> Result<(), ModuleError> {
        self.core_mut().deserialize_params(state);
        Ok(())
    }
}

/// Implements the `core` accessors for a module struct with a `core` field
macro_rules! module_core {
    () => {
        fn core(&self) -> &$crate::module::ModuleCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::module::ModuleCore {
            &mut self.core
        }
    };
}

pub(crate) use module_core;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HeadlessHost, NodeKind, Port};
    use serde_json::json;

    struct Tone {
        core: ModuleCore,
    }

    impl Tone {
        fn new() -> Self {
            Self {
                core: ModuleCore::new(vec![
                    ("level", AnyParam::number(0.0, 1.0, 0.5)),
                    ("rate", AnyParam::number(0.1, 20.0, 2.0)),
                ]),
            }
        }
    }

    impl SynthModule for Tone {
        fn type_name(&self) -> &'static str {
            "Tone"
        }

        fn input_only(&self) -> bool {
            true
        }

        module_core!();

        fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
            host.create_node(NodeKind::Gain)
        }

        fn create_aux(
            &mut self,
            host: &mut dyn AudioHost,
            primary: NodeKey,
        ) -> Result<Vec<NodeKey>, HostError> {
            let osc = host.create_node(NodeKind::Oscillator)?;
            host.connect(osc, Endpoint::input(primary))?;
            host.start(osc)?;
            Ok(vec![osc])
        }

        fn bindings(&self) -> &'static [Binding] {
            const BINDINGS: &[Binding] = &[
                Binding::primary("level", "gain"),
                Binding::aux("rate", 0, "frequency"),
            ];
            BINDINGS
        }

        fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
            Some((NodeSlot::Primary, "gain"))
        }
    }

    #[test]
    fn test_node_before_init_fails() {
        let tone = Tone::new();
        assert_eq!(tone.node(), Err(ModuleError::NotInitialized("Tone")));
        assert!(tone.input().is_none());
        assert!(tone.param_node().is_none());
    }

    #[test]
    fn test_init_binds_params_and_starts_aux() {
        let mut host = HeadlessHost::new();
        let mut tone = Tone::new();
        tone.init(&mut host).unwrap();

        let primary = tone.node().unwrap();
        let osc = tone.core().live().unwrap().aux[0];
        assert!(host.is_running(osc));
        assert!(host.is_connected(osc, Endpoint::input(primary)));

        // Bound parameters pushed their values on bind
        assert_eq!(host.control(primary, "gain").unwrap().value(), 0.5);
        assert_eq!(host.control(osc, "frequency").unwrap().value(), 2.0);

        tone.set_param("rate", 4.0.into()).unwrap();
        assert_eq!(host.control(osc, "frequency").unwrap().value(), 4.0);
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut host = HeadlessHost::new();
        let mut tone = Tone::new();
        tone.init(&mut host).unwrap();
        let first = tone.node().unwrap();
        tone.init(&mut host).unwrap();
        assert_eq!(tone.node().unwrap(), first);
        assert_eq!(host.node_count(), 2);
    }

    #[test]
    fn test_dispose_releases_everything_once() {
        let mut host = HeadlessHost::new();
        let mut tone = Tone::new();
        tone.init(&mut host).unwrap();
        let primary = tone.node().unwrap();
        host.connect(primary, Endpoint::input(host.destination()))
            .unwrap();

        tone.dispose(&mut host);
        assert_eq!(host.node_count(), 0);
        assert_eq!(host.edge_count(), 0);
        assert_eq!(tone.node(), Err(ModuleError::NotInitialized("Tone")));
        assert!(!tone.param("level").unwrap().is_bound());

        // Second dispose is a no-op
        tone.dispose(&mut host);
        assert_eq!(host.node_count(), 0);
    }

    #[test]
    fn test_param_node_and_input() {
        let mut host = HeadlessHost::new();
        let mut tone = Tone::new();
        tone.init(&mut host).unwrap();
        let primary = tone.node().unwrap();

        assert_eq!(tone.input(), Some(Endpoint::input(primary)));
        let modulation = tone.param_node().unwrap();
        assert_eq!(modulation.port, Port::Control("gain"));
    }

    #[test]
    fn test_set_unknown_param() {
        let mut tone = Tone::new();
        assert!(matches!(
            tone.set_param("cutoff", 1.0.into()),
            Err(ModuleError::UnknownParam { .. })
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut tone = Tone::new();
        tone.set_param("level", 0.8.into()).unwrap();
        let state = tone.serialize();
        assert_eq!(state.get("level"), Some(&json!(0.8)));

        let mut restored = Tone::new();
        restored.deserialize(&state).unwrap();
        assert_eq!(restored.serialize(), state);
    }

    #[test]
    fn test_deserialize_clamps_and_ignores_unknown() {
        let mut tone = Tone::new();
        let state = json!({ "level": 3.0, "bogus": 1 });
        tone.deserialize(state.as_object().unwrap()).unwrap();
        assert_eq!(tone.core().number("level"), 1.0);
        assert_eq!(tone.core().number("rate"), 2.0);
    }
}
