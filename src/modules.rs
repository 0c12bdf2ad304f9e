//! Module Catalogue
//!
//! The built-in module types: sources (oscillator, LFO, noise, sequencer,
//! microphone), processors (gain, filter, panner, delay, distortion, reverb,
//! compressor) and the ADSR envelope used as a MIDI gate target.

use crate::error::{HostError, ModuleError};
use crate::host::{AudioHost, Automation, Endpoint, NodeKey, NodeKind, TimerId};
use crate::midi::note_to_frequency;
use crate::module::{module_core, Binding, ModuleCore, NodeSlot, SynthModule};
use crate::param::AnyParam;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sample rate assumed when generating buffers
pub const BUFFER_SAMPLE_RATE: f64 = 44_100.0;

pub const WAVEFORMS: &[&str] = &["sine", "square", "sawtooth", "triangle"];

pub const FILTER_TYPES: &[&str] = &[
    "lowpass",
    "highpass",
    "bandpass",
    "lowshelf",
    "highshelf",
    "peaking",
    "notch",
    "allpass",
];

pub const OVERSAMPLING: &[&str] = &["none", "2x", "4x"];

/// Basic oscillator
///
/// A started oscillator node. Its frequency is exposed as a modulation input.
pub struct Oscillator {
    core: ModuleCore,
}

impl Oscillator {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("frequency", AnyParam::number(20.0, 20_000.0, 440.0)),
                ("detune", AnyParam::number(-1200.0, 1200.0, 0.0)),
                ("waveform", AnyParam::choice(WAVEFORMS, "sine")),
            ]),
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Oscillator {
    fn type_name(&self) -> &'static str {
        "Oscillator"
    }

    fn input_only(&self) -> bool {
        false
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::Oscillator)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("frequency", "frequency"),
            Binding::primary("detune", "detune"),
            Binding::primary("waveform", "type"),
        ];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Primary, "frequency"))
    }

    fn on_init(&mut self, host: &mut dyn AudioHost) -> Result<(), HostError> {
        let node = self.core.live().map(|l| l.primary).ok_or(HostError::UnknownNode)?;
        host.start(node)
    }
}

/// Amplifier (VCA)
pub struct Gain {
    core: ModuleCore,
}

impl Gain {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![("gain", AnyParam::number(0.0, 2.0, 1.0))]),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Gain {
    fn type_name(&self) -> &'static str {
        "Gain"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::Gain)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[Binding::primary("gain", "gain")];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Primary, "gain"))
    }
}

/// Biquad filter with a modulatable cutoff
pub struct Filter {
    core: ModuleCore,
}

impl Filter {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("frequency", AnyParam::number(20.0, 20_000.0, 1000.0)),
                ("Q", AnyParam::number(0.0001, 30.0, 1.0)),
                ("type", AnyParam::choice(FILTER_TYPES, "lowpass")),
            ]),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Filter {
    fn type_name(&self) -> &'static str {
        "Filter"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::BiquadFilter)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("frequency", "frequency"),
            Binding::primary("Q", "Q"),
            Binding::primary("type", "type"),
        ];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Primary, "frequency"))
    }
}

/// Stereo panner
pub struct Panner {
    core: ModuleCore,
}

impl Panner {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![("pan", AnyParam::number(-1.0, 1.0, 0.0))]),
        }
    }
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Panner {
    fn type_name(&self) -> &'static str {
        "Panner"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::StereoPanner)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[Binding::primary("pan", "pan")];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Primary, "pan"))
    }
}

/// Delay line with a feedback loop
///
/// The auxiliary gain feeds the delay output back into its input.
pub struct Delay {
    core: ModuleCore,
}

impl Delay {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("delayTime", AnyParam::number(0.0, 5.0, 0.3)),
                ("feedback", AnyParam::number(0.0, 0.95, 0.4)),
            ]),
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Delay {
    fn type_name(&self) -> &'static str {
        "Delay"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::Delay)
    }

    fn create_aux(
        &mut self,
        host: &mut dyn AudioHost,
        primary: NodeKey,
    ) -> Result<Vec<NodeKey>, HostError> {
        let feedback = host.create_node(NodeKind::Gain)?;
        host.connect(primary, Endpoint::input(feedback))?;
        host.connect(feedback, Endpoint::input(primary))?;
        Ok(vec![feedback])
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("delayTime", "delayTime"),
            Binding::aux("feedback", 0, "gain"),
        ];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Primary, "delayTime"))
    }
}

/// Soft-clipping transfer curve, normalized to ±1
pub fn distortion_curve(amount: f64, len: usize) -> Vec<f32> {
    let drive = 1.0 + amount / 10.0;
    let norm = libm::tanh(drive);
    let last = len.saturating_sub(1).max(1) as f64;
    (0..len)
        .map(|i| {
            let x = i as f64 * 2.0 / last - 1.0;
            (libm::tanh(drive * x) / norm) as f32
        })
        .collect()
}

/// Wave-shaping distortion
pub struct Distortion {
    core: ModuleCore,
    curve_amount: Option<f64>,
}

impl Distortion {
    pub const CURVE_LEN: usize = 1024;

    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("amount", AnyParam::number(0.0, 100.0, 20.0)),
                ("oversample", AnyParam::choice(OVERSAMPLING, "4x")),
            ]),
            curve_amount: None,
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Distortion {
    fn type_name(&self) -> &'static str {
        "Distortion"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::WaveShaper)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("amount", "drive"),
            Binding::primary("oversample", "oversample"),
        ];
        BINDINGS
    }

    fn on_init(&mut self, host: &mut dyn AudioHost) -> Result<(), HostError> {
        self.curve_amount = None;
        self.refresh(host);
        Ok(())
    }

    fn refresh(&mut self, host: &mut dyn AudioHost) {
        let amount = self.core.number("amount");
        if self.curve_amount == Some(amount) {
            return;
        }
        let Some(node) = self.core.live().map(|l| l.primary) else {
            return;
        };
        if host
            .set_buffer(node, distortion_curve(amount, Self::CURVE_LEN))
            .is_ok()
        {
            self.curve_amount = Some(amount);
        }
    }
}

/// Exponentially decaying stereo-less noise burst
pub fn impulse_response(decay: f64) -> Vec<f32> {
    let len = ((decay.max(0.01) * BUFFER_SAMPLE_RATE) as usize).max(1);
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|i| {
            let envelope = libm::pow(1.0 - i as f64 / len as f64, decay);
            (rng.gen_range(-1.0..=1.0) * envelope) as f32
        })
        .collect()
}

/// Convolution reverb with a generated impulse response
pub struct Reverb {
    core: ModuleCore,
    impulse_decay: Option<f64>,
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("decay", AnyParam::number(0.1, 10.0, 2.0)),
                ("normalize", AnyParam::toggle(true)),
            ]),
            impulse_decay: None,
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Reverb {
    fn type_name(&self) -> &'static str {
        "Reverb"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::Convolver)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("decay", "decay"),
            Binding::primary("normalize", "normalize"),
        ];
        BINDINGS
    }

    fn on_init(&mut self, host: &mut dyn AudioHost) -> Result<(), HostError> {
        self.impulse_decay = None;
        self.refresh(host);
        Ok(())
    }

    fn refresh(&mut self, host: &mut dyn AudioHost) {
        let decay = self.core.number("decay");
        if self.impulse_decay == Some(decay) {
            return;
        }
        let Some(node) = self.core.live().map(|l| l.primary) else {
            return;
        };
        if host.set_buffer(node, impulse_response(decay)).is_ok() {
            self.impulse_decay = Some(decay);
        }
    }
}

/// Dynamics compressor
pub struct Compressor {
    core: ModuleCore,
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("threshold", AnyParam::number(-100.0, 0.0, -24.0)),
                ("knee", AnyParam::number(0.0, 40.0, 30.0)),
                ("ratio", AnyParam::number(1.0, 20.0, 12.0)),
                ("attack", AnyParam::number(0.0, 1.0, 0.003)),
                ("release", AnyParam::number(0.0, 1.0, 0.25)),
            ]),
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Compressor {
    fn type_name(&self) -> &'static str {
        "Compressor"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::DynamicsCompressor)
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("threshold", "threshold"),
            Binding::primary("knee", "knee"),
            Binding::primary("ratio", "ratio"),
            Binding::primary("attack", "attack"),
            Binding::primary("release", "release"),
        ];
        BINDINGS
    }
}

/// ADSR envelope
///
/// A gain stage whose level is automated on gate on/off. Silent until the
/// first attack.
pub struct Envelope {
    core: ModuleCore,
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("attack", AnyParam::number(0.001, 5.0, 0.1)),
                ("decay", AnyParam::number(0.001, 5.0, 0.2)),
                ("sustain", AnyParam::number(0.0, 1.0, 0.7)),
                ("release", AnyParam::number(0.001, 10.0, 0.5)),
            ]),
        }
    }

    fn primary(&self) -> Option<NodeKey> {
        self.core.live().map(|l| l.primary)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Envelope {
    fn type_name(&self) -> &'static str {
        "Envelope"
    }

    fn input_only(&self) -> bool {
        true
    }

    module_core!();

    fn create_node(&self, host: &mut dyn AudioHost) -> Result<NodeKey, HostError> {
        host.create_node(NodeKind::Gain)
    }

    fn on_init(&mut self, host: &mut dyn AudioHost) -> Result<(), HostError> {
        let node = self.primary().ok_or(HostError::UnknownNode)?;
        let now = host.current_time();
        host.schedule(node, "gain", &[Automation::SetValue { value: 0.0, at: now }])
    }

    fn on_dispose(&mut self, host: &mut dyn AudioHost) {
        if let Some(node) = self.primary() {
            host.cancel_scheduled(node, "gain");
        }
    }

    fn is_gate_target(&self) -> bool {
        true
    }

    fn attack(&mut self, host: &mut dyn AudioHost) {
        let Some(node) = self.primary() else {
            return;
        };
        let now = host.current_time();
        let attack_end = now + self.core.number("attack");
        let decay_end = attack_end + self.core.number("decay");
        let events = [
            Automation::SetValue { value: 0.0, at: now },
            Automation::LinearRamp {
                value: 1.0,
                end: attack_end,
            },
            Automation::LinearRamp {
                value: self.core.number("sustain"),
                end: decay_end,
            },
        ];
        if let Err(err) = host.schedule(node, "gain", &events) {
            tracing::warn!(%err, "envelope attack failed");
        }
    }

    fn release(&mut self, host: &mut dyn AudioHost) {
        let Some(node) = self.primary() else {
            return;
        };
        let end = host.current_time() + self.core.number("release");
        if let Err(err) = host.schedule(node, "gain", &[Automation::LinearRamp { value: 0.0, end }]) {
            tracing::warn!(%err, "envelope release failed");
        }
    }
}

/// Low-frequency oscillator
///
/// An auxiliary oscillator scaled by a depth gain. Intended for parameter
/// docks.
pub struct Lfo {
    core: ModuleCore,
}

impl Lfo {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("rate", AnyParam::number(0.01, 50.0, 2.0)),
                ("depth", AnyParam::number(0.0, 1000.0, 10.0)),
                ("waveform", AnyParam::choice(WAVEFORMS, "sine")),
            ]),
        }
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Lfo {
    fn type_name(&self) -> &'static str {
        "LFO"
    }

    fn input_only(&self) -> bool {
        false
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
            Binding::aux("rate", 0, "frequency"),
            Binding::primary("depth", "gain"),
            Binding::aux("waveform", 0, "type"),
        ];
        BINDINGS
    }

    fn param_port(&self) -> Option<(NodeSlot, &'static str)> {
        Some((NodeSlot::Aux(0), "frequency"))
    }
}

/// Uniform white noise, `len` samples in `[-1, 1]`
pub fn white_noise(len: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect()
}

/// Looped white noise source
pub struct Noise {
    core: ModuleCore,
}

impl Noise {
    /// Two seconds of noise
    pub const BUFFER_LEN: usize = 2 * BUFFER_SAMPLE_RATE as usize;

    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![("level", AnyParam::number(0.0, 1.0, 0.3))]),
        }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Noise {
    fn type_name(&self) -> &'static str {
        "Noise"
    }

    fn input_only(&self) -> bool {
        false
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
        let source = host.create_node(NodeKind::BufferSource)?;
        host.set_buffer(source, white_noise(Self::BUFFER_LEN))?;
        host.control(source, "loop")?.set_immediate(1.0);
        host.connect(source, Endpoint::input(primary))?;
        host.start(source)?;
        Ok(vec![source])
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[Binding::primary("level", "gain")];
        BINDINGS
    }
}

/// One sequencer step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub note: u8,
    pub active: bool,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            note: 60,
            active: true,
        }
    }
}

/// Seconds per sixteenth note
pub fn step_interval(tempo: f64) -> f64 {
    60.0 / tempo / 4.0
}

/// Step sequencer
///
/// Drives an auxiliary oscillator through a gate gain, one step per
/// sixteenth note. Inactive steps close the gate.
pub struct Sequencer {
    core: ModuleCore,
    steps: Vec<Step>,
    position: Option<usize>,
    clock_tempo: f64,
}

impl Sequencer {
    pub const MAX_STEPS: usize = 32;
    pub const DEFAULT_STEPS: usize = 8;

    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![
                ("tempo", AnyParam::number(30.0, 300.0, 120.0)),
                ("volume", AnyParam::number(0.0, 1.0, 0.5)),
                ("waveform", AnyParam::choice(WAVEFORMS, "sawtooth")),
            ]),
            steps: vec![Step::default(); Self::DEFAULT_STEPS],
            position: None,
            clock_tempo: 0.0,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Index of the step currently sounding
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Resize to `count` steps (clamped to `1..=MAX_STEPS`). New steps take
    /// the default note.
    pub fn set_step_count(&mut self, count: usize) -> Vec<Step> {
        self.steps
            .resize(count.clamp(1, Self::MAX_STEPS), Step::default());
        self.steps.clone()
    }

    /// Set the MIDI note of one step; out-of-range indices are ignored
    pub fn set_step_note(&mut self, index: usize, note: u8) -> Vec<Step> {
        if let Some(step) = self.steps.get_mut(index) {
            step.note = note.min(127);
        }
        self.steps.clone()
    }

    pub fn toggle_step(&mut self, index: usize) -> Vec<Step> {
        if let Some(step) = self.steps.get_mut(index) {
            step.active = !step.active;
        }
        self.steps.clone()
    }

    fn start_clock(&mut self, host: &mut dyn AudioHost) -> Option<TimerId> {
        let tempo = self.core.number("tempo");
        let timer = host.start_timer(step_interval(tempo));
        let live = self.core.live_mut()?;
        live.timers.push(timer);
        self.clock_tempo = tempo;
        tracing::debug!(tempo, "sequencer clock started");
        Some(timer)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Sequencer {
    fn type_name(&self) -> &'static str {
        "Sequencer"
    }

    fn input_only(&self) -> bool {
        false
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
        let gate = host.create_node(NodeKind::Gain)?;
        host.control(gate, "gain")?.set_immediate(0.0);
        host.connect(osc, Endpoint::input(gate))?;
        host.connect(gate, Endpoint::input(primary))?;
        host.start(osc)?;
        Ok(vec![osc, gate])
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[
            Binding::primary("volume", "gain"),
            Binding::aux("waveform", 0, "type"),
        ];
        BINDINGS
    }

    fn on_init(&mut self, host: &mut dyn AudioHost) -> Result<(), HostError> {
        self.position = None;
        self.start_clock(host).ok_or(HostError::UnknownNode)?;
        Ok(())
    }

    fn on_timer(&mut self, timer: TimerId, host: &mut dyn AudioHost) {
        let Some(live) = self.core.live() else {
            return;
        };
        if !live.timers.contains(&timer) {
            return;
        }
        let (Some(osc), Some(gate)) = (live.aux.first().copied(), live.aux.get(1).copied())
        else {
            return;
        };

        let next = self.position.map_or(0, |p| (p + 1) % self.steps.len());
        self.position = Some(next);
        let step = self.steps[next];
        if step.active {
            if let Ok(freq) = host.control(osc, "frequency") {
                freq.set_immediate(note_to_frequency(step.note));
            }
        }
        if let Ok(level) = host.control(gate, "gain") {
            level.set_immediate(if step.active { 1.0 } else { 0.0 });
        }

        if self.core.number("tempo") != self.clock_tempo {
            host.cancel_timer(timer);
            if let Some(live) = self.core.live_mut() {
                live.timers.retain(|t| *t != timer);
            }
            self.start_clock(host);
        }
    }

    fn serialize(&self) -> Map<String, Value> {
        let mut state = self.core.serialize_params();
        let steps = self
            .steps
            .iter()
            .map(|s| serde_json::json!({ "note": s.note, "active": s.active }))
            .collect();
        state.insert("steps".to_string(), Value::Array(steps));
        state
    }

    fn deserialize(&mut self, state: &Map<String, Value>) -> Result<(), ModuleError> {
        let steps = state.get("steps").map(parse_steps).transpose()?;
        self.core.deserialize_params(state);
        if let Some(steps) = steps {
            self.steps = steps;
        }
        Ok(())
    }

    fn as_sequencer(&self) -> Option<&Sequencer> {
        Some(self)
    }

    fn as_sequencer_mut(&mut self) -> Option<&mut Sequencer> {
        Some(self)
    }
}

fn parse_steps(raw: &Value) -> Result<Vec<Step>, ModuleError> {
    let steps: Vec<Step> =
        serde_json::from_value(raw.clone()).map_err(|e| ModuleError::InvalidState {
            module: "Sequencer",
            reason: e.to_string(),
        })?;
    if steps.is_empty() || steps.len() > Sequencer::MAX_STEPS {
        return Err(ModuleError::InvalidState {
            module: "Sequencer",
            reason: format!("{} steps", steps.len()),
        });
    }
    Ok(steps
        .into_iter()
        .map(|s| Step {
            note: s.note.min(127),
            active: s.active,
        })
        .collect())
}

/// Live input from the default capture device
///
/// Acquiring the stream needs the user's permission; until it is granted
/// `init` fails with [`HostError::PermissionPending`].
pub struct Microphone {
    core: ModuleCore,
}

impl Microphone {
    pub fn new() -> Self {
        Self {
            core: ModuleCore::new(vec![("volume", AnyParam::number(0.0, 2.0, 1.0))]),
        }
    }
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthModule for Microphone {
    fn type_name(&self) -> &'static str {
        "Microphone"
    }

    fn input_only(&self) -> bool {
        false
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
        let stream = host.open_input_stream()?;
        if let Err(err) = host.connect(stream, Endpoint::input(primary)) {
            host.release(stream);
            return Err(err);
        }
        Ok(vec![stream])
    }

    fn bindings(&self) -> &'static [Binding] {
        const BINDINGS: &[Binding] = &[Binding::primary("volume", "gain")];
        BINDINGS
    }
}
