//! Live Control Cells
//!
//! The control plane (UI events, MIDI callbacks) writes parameter values into
//! shared cells that the host's audio side reads. Cells are lock-free so a
//! render thread never blocks on the editor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `f64` cell stored as its bit pattern in an `AtomicU64`
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Clones snapshot the current value into an independent cell
impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// A writable control on a live processing node (an oscillator's frequency,
/// a gain's level, ...).
///
/// Writes are smoothed ramps: the cell records the target and the time
/// constant the host should glide with. `writes` counts every ramp request so
/// callers can tell a real write from a no-op.
#[derive(Debug)]
pub struct LiveControl {
    target: AtomicF64,
    time_constant: AtomicF64,
    writes: AtomicU64,
}

/// Shared handle to a live control
pub type ControlHandle = Arc<LiveControl>;

impl LiveControl {
    pub fn new(initial: f64) -> Self {
        Self {
            target: AtomicF64::new(initial),
            time_constant: AtomicF64::new(0.0),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a shared handle
    pub fn shared(initial: f64) -> ControlHandle {
        Arc::new(Self::new(initial))
    }

    /// Glide towards `value` with the given time constant (seconds)
    pub fn ramp_to(&self, value: f64, time_constant: f64) {
        self.time_constant.set(time_constant.max(0.0));
        self.target.set(value);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Jump to `value` without smoothing
    pub fn set_immediate(&self, value: f64) {
        self.ramp_to(value, 0.0);
    }

    /// The value the control is heading to
    pub fn value(&self) -> f64 {
        self.target.get()
    }

    pub fn time_constant(&self) -> f64 {
        self.time_constant.get()
    }

    /// Number of writes issued since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}
