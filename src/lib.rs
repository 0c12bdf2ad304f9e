//! # Patchwork: Modular Synthesizer Editor Core
//!
//! `patchwork` is the control-plane of an interactive modular synthesizer:
//! typed, observable parameters, a catalogue of processing modules bound to
//! an audio host, a patch-cable state machine with validation, a MIDI learn
//! and playback engine, and a JSON preset codec with asynchronous restore.
//!
//! ## Architecture
//!
//! - **Parameters** - validated value cells that push into live controls
//! - **Modules** - named parameter sets over host nodes, created by a registry
//! - **Patch Graph** - pending/complete cables with ordered validation rules
//! - **MIDI** - learn-mode capture and CC/note/gate playback
//! - **Presets** - snapshot, JSON codec, storage and polled reconnection
//!
//! The audio engine itself sits behind the [`host::AudioHost`] trait;
//! [`host::HeadlessHost`] records the live graph in memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patchwork::prelude::*;
//!
//! let mut ws = Workspace::new(HeadlessHost::new());
//!
//! let osc = ws.add_module("Oscillator", Point::new(40.0, 40.0)).unwrap();
//! let filter = ws.add_module("Filter", Point::new(240.0, 40.0)).unwrap();
//! ws.connect(&osc, &filter).unwrap();
//! ws.connect(&filter, "Output").unwrap();
//!
//! // Map CC 74 on channel 1 to the filter cutoff
//! ws.toggle_learn();
//! ws.arm_param(&filter, "frequency");
//! ws.handle_midi(&[0xB0, 74, 64]);
//! ws.toggle_learn();
//!
//! let preset = ws.snapshot("Lead");
//! println!("{}", preset.to_json().unwrap());
//! ```

pub mod advisory;
pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod ids;
pub mod io;
pub mod midi;
pub mod module;
pub mod modules;
pub mod param;
pub mod preset;
pub mod registry;
pub mod store;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    // Parameters
    pub use crate::param::{AnyParam, Choice, Domain, Param, ParamValue, Range, Toggle};

    // Modules
    pub use crate::module::{Binding, ModuleCore, NodeSlot, SynthModule};
    pub use crate::modules::{
        Compressor, Delay, Distortion, Envelope, Filter, Gain, Lfo, Microphone, Noise,
        Oscillator, Panner, Reverb, Sequencer, Step,
    };
    pub use crate::registry::{ModuleMetadata, ModuleRegistry};

    // Audio host
    pub use crate::host::{AudioHost, Endpoint, HeadlessHost, NodeKey, NodeKind, Permission};
    pub use crate::io::{AtomicF64, ControlHandle, LiveControl};

    // Patch graph
    pub use crate::graph::{Cable, CableId, GraphState, PatchGraph, Point};
    pub use crate::ids::{param_dock, OUTPUT_ID};

    // MIDI
    pub use crate::midi::{
        note_to_frequency, LearnTarget, MidiAction, MidiEngine, MidiMapping, MidiMessage,
        MidiOutcome,
    };

    // Presets
    pub use crate::preset::{ConnectionRecord, ModuleRecord, Preset, Reconnector};
    pub use crate::store::{DirStore, MemoryStore, PresetStore};

    // Editor
    pub use crate::advisory::{Advisory, Severity};
    pub use crate::config::EditorConfig;
    pub use crate::error::{ModuleError, PatchError, Rejection, WorkspaceError};
    pub use crate::workspace::Workspace;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
