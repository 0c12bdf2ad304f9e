//! Identifier scheme
//!
//! Modules are keyed `"<Type> <index>"` (e.g. `"Oscillator 0"`). A module's
//! modulation dock is its key plus [`PARAM_DOCK_SUFFIX`]. MIDI-learn targets
//! are written `"<module>::<param>"`. All functions here are total.

/// Separator between a module's type name and its index
pub const KEY_SEPARATOR: char = ' ';

/// Marker appended to a module key to address its modulation input
pub const PARAM_DOCK_SUFFIX: &str = " param";

/// Separator between module key and parameter name in a learn target
pub const TARGET_SEPARATOR: &str = "::";

/// Id of the terminal sink. It is not a module.
pub const OUTPUT_ID: &str = "Output";

/// Join a type name and an index into a module key
pub fn module_key(type_name: &str, index: usize) -> String {
    format!("{type_name}{KEY_SEPARATOR}{index}")
}

/// Split a module key on its first separator.
///
/// Returns the type name and the index when the remainder parses as an
/// index. `"Oscillator 3"` → `("Oscillator", Some(3))`; `"Output"` →
/// `("Output", None)`.
pub fn split_module_key(key: &str) -> (&str, Option<usize>) {
    match key.split_once(KEY_SEPARATOR) {
        Some((type_name, rest)) => (type_name, rest.parse().ok()),
        None => (key, None),
    }
}

/// The dock id addressing a module's modulation input
pub fn param_dock(module: &str) -> String {
    format!("{module}{PARAM_DOCK_SUFFIX}")
}

/// Whether a destination id addresses a modulation input
pub fn is_param_dock(id: &str) -> bool {
    id.ends_with(PARAM_DOCK_SUFFIX)
}

/// The module a dock id belongs to.
///
/// Strips one trailing [`PARAM_DOCK_SUFFIX`]; anything else (including extra
/// separators inside the key) is kept, so `"Gain 0 param"` → `"Gain 0"`.
pub fn dock_module(id: &str) -> &str {
    id.strip_suffix(PARAM_DOCK_SUFFIX).unwrap_or(id)
}

/// Encode a learn target
pub fn target_key(module: &str, param: &str) -> String {
    format!("{module}{TARGET_SEPARATOR}{param}")
}

/// Decode a learn target; `None` when the separator is missing
pub fn split_target_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(TARGET_SEPARATOR)
}
