//! Audio Host Capability
//!
//! The editor never renders audio itself. It drives an external audio host
//! through the [`AudioHost`] trait: node factories, connect/disconnect,
//! live controls, sample data, automation and timers. [`HeadlessHost`] is an
//! in-memory implementation that records the live graph, used for tests and
//! for running the editor without an audio device.

use crate::error::HostError;
use crate::io::{ControlHandle, LiveControl};
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a live processing node owned by the host
    pub struct NodeKey;

    /// Handle to a repeating host timer
    pub struct TimerId;
}

/// Node factories offered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Oscillator,
    Gain,
    BiquadFilter,
    StereoPanner,
    Delay,
    WaveShaper,
    Convolver,
    DynamicsCompressor,
    BufferSource,
    StreamSource,
    /// The terminal sink ("Output")
    Destination,
}

impl NodeKind {
    /// Controls exposed by a node of this kind, with their initial values
    pub fn controls(&self) -> &'static [(&'static str, f64)] {
        match self {
            NodeKind::Oscillator => &[("frequency", 440.0), ("detune", 0.0), ("type", 0.0)],
            NodeKind::Gain => &[("gain", 1.0)],
            NodeKind::BiquadFilter => &[
                ("frequency", 350.0),
                ("Q", 1.0),
                ("gain", 0.0),
                ("type", 0.0),
            ],
            NodeKind::StereoPanner => &[("pan", 0.0)],
            NodeKind::Delay => &[("delayTime", 0.0)],
            NodeKind::WaveShaper => &[("drive", 0.0), ("oversample", 0.0)],
            NodeKind::Convolver => &[("decay", 2.0), ("normalize", 1.0)],
            NodeKind::DynamicsCompressor => &[
                ("threshold", -24.0),
                ("knee", 30.0),
                ("ratio", 12.0),
                ("attack", 0.003),
                ("release", 0.25),
            ],
            NodeKind::BufferSource => &[("playbackRate", 1.0), ("loop", 0.0)],
            NodeKind::StreamSource | NodeKind::Destination => &[],
        }
    }

    /// Whether the node has a signal input
    pub fn accepts_input(&self) -> bool {
        !matches!(
            self,
            NodeKind::Oscillator | NodeKind::BufferSource | NodeKind::StreamSource
        )
    }

    /// Whether the node is a scheduled source that must be started
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Oscillator | NodeKind::BufferSource)
    }
}

/// Where a connection lands on the destination node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// The node's primary signal input
    Input,
    /// A modulation input driving one of the node's controls
    Control(&'static str),
}

/// A connectable destination: a node and the port on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeKey,
    pub port: Port,
}

impl Endpoint {
    pub fn input(node: NodeKey) -> Self {
        Self {
            node,
            port: Port::Input,
        }
    }

    pub fn control(node: NodeKey, name: &'static str) -> Self {
        Self {
            node,
            port: Port::Control(name),
        }
    }
}

/// A scheduled change on a control, in host time (seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    SetValue { value: f64, at: f64 },
    LinearRamp { value: f64, end: f64 },
}

/// Capability interface to the audio-processing host
pub trait AudioHost {
    /// Create a node of the given kind
    fn create_node(&mut self, kind: NodeKind) -> Result<NodeKey, HostError>;

    /// Open the default input device as a stream source node.
    ///
    /// Fails with [`HostError::PermissionPending`] until the user has
    /// answered, and with [`HostError::PermissionDenied`] once refused.
    fn open_input_stream(&mut self) -> Result<NodeKey, HostError>;

    /// Look up a live control on a node
    fn control(&self, node: NodeKey, name: &str) -> Result<ControlHandle, HostError>;

    fn connect(&mut self, from: NodeKey, to: Endpoint) -> Result<(), HostError>;

    fn disconnect(&mut self, from: NodeKey, to: Endpoint) -> Result<(), HostError>;

    /// Remove every outgoing edge of `node`
    fn disconnect_all(&mut self, node: NodeKey);

    /// Start a source node
    fn start(&mut self, node: NodeKey) -> Result<(), HostError>;

    /// Stop a source node (no-op for stopped or unknown nodes)
    fn stop(&mut self, node: NodeKey);

    /// Drop a node and every edge touching it
    fn release(&mut self, node: NodeKey);

    /// Load sample data: buffer source audio, convolver impulse response
    /// or wave-shaper curve
    fn set_buffer(&mut self, node: NodeKey, samples: Vec<f32>) -> Result<(), HostError>;

    /// Replace any pending automation on a control with `events`
    fn schedule(
        &mut self,
        node: NodeKey,
        control: &str,
        events: &[Automation],
    ) -> Result<(), HostError>;

    /// Drop pending automation on a control
    fn cancel_scheduled(&mut self, node: NodeKey, control: &str);

    /// Start a repeating timer firing every `interval` seconds
    fn start_timer(&mut self, interval: f64) -> TimerId;

    /// Cancel a timer; a cancelled timer never fires again
    fn cancel_timer(&mut self, timer: TimerId);

    /// Timers that came due since the last call, in firing order
    fn due_timers(&mut self) -> Vec<TimerId>;

    /// The terminal sink node
    fn destination(&self) -> NodeKey;

    /// Current host time in seconds
    fn current_time(&self) -> f64;
}

/// Answer to an input-device permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    #[default]
    Granted,
    Denied,
    Pending,
}

#[derive(Debug)]
struct HeadlessNode {
    kind: NodeKind,
    controls: Vec<(&'static str, ControlHandle)>,
    outputs: Vec<Endpoint>,
    running: bool,
    buffer: Vec<f32>,
    automation: Vec<(String, Automation)>,
}

impl HeadlessNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            controls: kind
                .controls()
                .iter()
                .map(|&(name, initial)| (name, LiveControl::shared(initial)))
                .collect(),
            outputs: Vec::new(),
            running: false,
            buffer: Vec::new(),
            automation: Vec::new(),
        }
    }

    fn has_control(&self, name: &str) -> bool {
        self.controls.iter().any(|(n, _)| *n == name)
    }
}

#[derive(Debug)]
struct Timer {
    interval: f64,
    next_due: f64,
}

/// In-memory audio host that records the live graph instead of rendering it
#[derive(Debug)]
pub struct HeadlessHost {
    nodes: SlotMap<NodeKey, HeadlessNode>,
    timers: SlotMap<TimerId, Timer>,
    destination: NodeKey,
    time: f64,
    permission: Permission,
}

impl HeadlessHost {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let destination = nodes.insert(HeadlessNode::new(NodeKind::Destination));
        Self {
            nodes,
            timers: SlotMap::with_key(),
            destination,
            time: 0.0,
            permission: Permission::Granted,
        }
    }

    /// Set how the next input-stream request is answered
    pub fn set_permission(&mut self, permission: Permission) {
        self.permission = permission;
    }

    /// Move the host clock forward
    pub fn advance(&mut self, seconds: f64) {
        self.time += seconds.max(0.0);
    }

    pub fn contains(&self, node: NodeKey) -> bool {
        self.nodes.contains_key(node)
    }

    /// Number of live nodes, excluding the destination
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Total number of edges in the live graph
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.outputs.len()).sum()
    }

    pub fn kind(&self, node: NodeKey) -> Option<NodeKind> {
        self.nodes.get(node).map(|n| n.kind)
    }

    pub fn outputs(&self, node: NodeKey) -> &[Endpoint] {
        self.nodes
            .get(node)
            .map(|n| n.outputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, from: NodeKey, to: Endpoint) -> bool {
        self.outputs(from).contains(&to)
    }

    pub fn is_running(&self, node: NodeKey) -> bool {
        self.nodes.get(node).map(|n| n.running).unwrap_or(false)
    }

    pub fn buffer(&self, node: NodeKey) -> Option<&[f32]> {
        self.nodes.get(node).map(|n| n.buffer.as_slice())
    }

    /// Pending automation on a control
    pub fn automation(&self, node: NodeKey, control: &str) -> Vec<Automation> {
        self.nodes
            .get(node)
            .map(|n| {
                n.automation
                    .iter()
                    .filter(|(c, _)| c == control)
                    .map(|(_, a)| *a)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn node_mut(&mut self, node: NodeKey) -> Result<&mut HeadlessNode, HostError> {
        self.nodes.get_mut(node).ok_or(HostError::UnknownNode)
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for HeadlessHost {
    fn create_node(&mut self, kind: NodeKind) -> Result<NodeKey, HostError> {
        if kind == NodeKind::StreamSource {
            return self.open_input_stream();
        }
        Ok(self.nodes.insert(HeadlessNode::new(kind)))
    }

    fn open_input_stream(&mut self) -> Result<NodeKey, HostError> {
        match self.permission {
            Permission::Granted => Ok(self.nodes.insert(HeadlessNode::new(NodeKind::StreamSource))),
            Permission::Denied => Err(HostError::PermissionDenied),
            Permission::Pending => Err(HostError::PermissionPending),
        }
    }

    fn control(&self, node: NodeKey, name: &str) -> Result<ControlHandle, HostError> {
        let n = self.nodes.get(node).ok_or(HostError::UnknownNode)?;
        n.controls
            .iter()
            .find(|(c, _)| *c == name)
            .map(|(_, handle)| handle.clone())
            .ok_or_else(|| HostError::UnknownControl(name.to_string()))
    }

    fn connect(&mut self, from: NodeKey, to: Endpoint) -> Result<(), HostError> {
        let target = self.nodes.get(to.node).ok_or(HostError::UnknownNode)?;
        match to.port {
            Port::Input if !target.kind.accepts_input() => return Err(HostError::NoInput),
            Port::Control(name) if !target.has_control(name) => {
                return Err(HostError::UnknownControl(name.to_string()))
            }
            _ => {}
        }
        let source = self.node_mut(from)?;
        if !source.outputs.contains(&to) {
            source.outputs.push(to);
        }
        Ok(())
    }

    fn disconnect(&mut self, from: NodeKey, to: Endpoint) -> Result<(), HostError> {
        let source = self.node_mut(from)?;
        let before = source.outputs.len();
        source.outputs.retain(|e| *e != to);
        if source.outputs.len() == before {
            return Err(HostError::NotConnected);
        }
        Ok(())
    }

    fn disconnect_all(&mut self, node: NodeKey) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.outputs.clear();
        }
    }

    fn start(&mut self, node: NodeKey) -> Result<(), HostError> {
        self.node_mut(node)?.running = true;
        Ok(())
    }

    fn stop(&mut self, node: NodeKey) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.running = false;
        }
    }

    fn release(&mut self, node: NodeKey) {
        if node == self.destination || self.nodes.remove(node).is_none() {
            return;
        }
        for other in self.nodes.values_mut() {
            other.outputs.retain(|e| e.node != node);
        }
    }

    fn set_buffer(&mut self, node: NodeKey, samples: Vec<f32>) -> Result<(), HostError> {
        self.node_mut(node)?.buffer = samples;
        Ok(())
    }

    fn schedule(
        &mut self,
        node: NodeKey,
        control: &str,
        events: &[Automation],
    ) -> Result<(), HostError> {
        let n = self.node_mut(node)?;
        if !n.has_control(control) {
            return Err(HostError::UnknownControl(control.to_string()));
        }
        n.automation.retain(|(c, _)| c != control);
        n.automation
            .extend(events.iter().map(|a| (control.to_string(), *a)));
        Ok(())
    }

    fn cancel_scheduled(&mut self, node: NodeKey, control: &str) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.automation.retain(|(c, _)| c != control);
        }
    }

    fn start_timer(&mut self, interval: f64) -> TimerId {
        let interval = interval.max(1e-3);
        self.timers.insert(Timer {
            interval,
            next_due: self.time + interval,
        })
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.timers.remove(timer);
    }

    fn due_timers(&mut self) -> Vec<TimerId> {
        let mut fired: Vec<(f64, TimerId)> = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            while timer.next_due <= self.time {
                fired.push((timer.next_due, id));
                timer.next_due += timer.interval;
            }
        }
        fired.sort_by(|a, b| a.0.total_cmp(&b.0));
        fired.into_iter().map(|(_, id)| id).collect()
    }

    fn destination(&self) -> NodeKey {
        self.destination
    }

    fn current_time(&self) -> f64 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_connect() {
        let mut host = HeadlessHost::new();
        let osc = host.create_node(NodeKind::Oscillator).unwrap();
        let gain = host.create_node(NodeKind::Gain).unwrap();

        host.connect(osc, Endpoint::input(gain)).unwrap();
        assert!(host.is_connected(osc, Endpoint::input(gain)));
        assert_eq!(host.node_count(), 2);
        assert_eq!(host.edge_count(), 1);

        // Duplicate connects are absorbed
        host.connect(osc, Endpoint::input(gain)).unwrap();
        assert_eq!(host.edge_count(), 1);
    }

    #[test]
    fn test_connect_to_source_input_fails() {
        let mut host = HeadlessHost::new();
        let a = host.create_node(NodeKind::Oscillator).unwrap();
        let b = host.create_node(NodeKind::Oscillator).unwrap();

        assert_eq!(
            host.connect(a, Endpoint::input(b)),
            Err(HostError::NoInput)
        );
        // Modulating its frequency is fine
        host.connect(a, Endpoint::control(b, "frequency")).unwrap();
    }

    #[test]
    fn test_connect_unknown_control() {
        let mut host = HeadlessHost::new();
        let a = host.create_node(NodeKind::Oscillator).unwrap();
        let g = host.create_node(NodeKind::Gain).unwrap();
        assert!(matches!(
            host.connect(a, Endpoint::control(g, "cutoff")),
            Err(HostError::UnknownControl(_))
        ));
    }

    #[test]
    fn test_disconnect() {
        let mut host = HeadlessHost::new();
        let osc = host.create_node(NodeKind::Oscillator).unwrap();
        let dest = host.destination();

        host.connect(osc, Endpoint::input(dest)).unwrap();
        host.disconnect(osc, Endpoint::input(dest)).unwrap();
        assert_eq!(
            host.disconnect(osc, Endpoint::input(dest)),
            Err(HostError::NotConnected)
        );
    }

    #[test]
    fn test_release_purges_incoming_edges() {
        let mut host = HeadlessHost::new();
        let osc = host.create_node(NodeKind::Oscillator).unwrap();
        let gain = host.create_node(NodeKind::Gain).unwrap();
        host.connect(osc, Endpoint::input(gain)).unwrap();

        host.release(gain);
        assert!(!host.contains(gain));
        assert_eq!(host.edge_count(), 0);

        // The destination is never released
        let dest = host.destination();
        host.release(dest);
        assert!(host.contains(dest));
    }

    #[test]
    fn test_controls_are_shared() {
        let mut host = HeadlessHost::new();
        let osc = host.create_node(NodeKind::Oscillator).unwrap();
        let a = host.control(osc, "frequency").unwrap();
        let b = host.control(osc, "frequency").unwrap();
        a.ramp_to(880.0, 0.0);
        assert_eq!(b.value(), 880.0);
    }

    #[test]
    fn test_permission() {
        let mut host = HeadlessHost::new();
        host.set_permission(Permission::Pending);
        assert_eq!(host.open_input_stream(), Err(HostError::PermissionPending));
        host.set_permission(Permission::Denied);
        assert_eq!(host.open_input_stream(), Err(HostError::PermissionDenied));
        host.set_permission(Permission::Granted);
        assert!(host.open_input_stream().is_ok());
    }

    #[test]
    fn test_timers_fire_in_order_and_cancel() {
        let mut host = HeadlessHost::new();
        let fast = host.start_timer(0.1);
        let slow = host.start_timer(0.25);

        host.advance(0.35);
        let fired = host.due_timers();
        assert_eq!(fired, vec![fast, fast, slow, fast]);
        assert!(host.due_timers().is_empty());

        host.cancel_timer(fast);
        host.advance(1.0);
        assert!(host.due_timers().iter().all(|t| *t == slow));
    }

    #[test]
    fn test_schedule_replaces_pending() {
        let mut host = HeadlessHost::new();
        let gain = host.create_node(NodeKind::Gain).unwrap();
        host.schedule(
            gain,
            "gain",
            &[Automation::SetValue { value: 0.0, at: 0.0 }],
        )
        .unwrap();
        host.schedule(
            gain,
            "gain",
            &[Automation::LinearRamp { value: 1.0, end: 0.5 }],
        )
        .unwrap();
        assert_eq!(
            host.automation(gain, "gain"),
            vec![Automation::LinearRamp { value: 1.0, end: 0.5 }]
        );

        host.cancel_scheduled(gain, "gain");
        assert!(host.automation(gain, "gain").is_empty());
    }
}
