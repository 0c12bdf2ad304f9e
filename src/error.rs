//! Error types shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an audio host capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The node key does not refer to a live node
    #[error("unknown node")]
    UnknownNode,

    /// The node has no control with the given name
    #[error("node has no control named '{0}'")]
    UnknownControl(String),

    /// The destination cannot accept a connection
    #[error("destination does not accept input")]
    NoInput,

    /// The two endpoints are not connected
    #[error("nodes are not connected")]
    NotConnected,

    /// The user refused access to an input device
    #[error("permission denied")]
    PermissionDenied,

    /// Access to an input device has been requested but not answered yet
    #[error("permission pending")]
    PermissionPending,
}

/// Failures of the module lifecycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    /// The live node was accessed before `init` or after `dispose`
    #[error("module '{0}' is not initialized")]
    NotInitialized(&'static str),

    /// The registry has no constructor for this type name
    #[error("unknown module type: {0}")]
    UnknownType(String),

    /// No parameter with this name exists on the module
    #[error("module '{module}' has no parameter '{param}'")]
    UnknownParam { module: &'static str, param: String },

    /// Extra module state could not be restored
    #[error("invalid state for '{module}': {reason}")]
    InvalidState { module: &'static str, reason: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Reasons a cable completion is refused.
///
/// The display text is the advisory a user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Cannot connect to itself")]
    SelfConnection,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not a new one")]
    NotNew,

    #[error("Module has no input")]
    NoInput,

    #[error("Connection failed: {0}")]
    Host(HostError),
}

/// Misuse of the patch graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Complete was called with no pending cable
    #[error("no cable is pending")]
    NotPending,

    #[error("unknown cable")]
    InvalidCable,

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Preset storage and import/export failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored text is not a structurally valid preset
    #[error("malformed preset: {0}")]
    Malformed(String),

    #[error("failed to encode preset: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Write {
            path: path.into(),
            source,
        }
    }
}

/// Configuration parsing failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by the workspace facade
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("module '{0}' has no step sequence")]
    NotASequencer(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("preset '{0}' not found")]
    PresetNotFound(String),
}
