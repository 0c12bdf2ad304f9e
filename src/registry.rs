//! Module Registry
//!
//! Maps type names to constructors and lists the palette of instantiable
//! module types in a stable order.

use crate::error::ModuleError;
use crate::module::SynthModule;
use crate::modules::*;
use std::collections::HashMap;

/// Module factory function type
pub type ModuleFactory = Box<dyn Fn() -> Box<dyn SynthModule> + Send + Sync>;

/// Palette entry for a registered module type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub type_name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// Whether instances expose an input dock
    pub input_only: bool,
}

/// Registry of available module types
pub struct ModuleRegistry {
    factories: HashMap<&'static str, ModuleFactory>,
    palette: Vec<ModuleMetadata>,
}

impl ModuleRegistry {
    /// Create a registry holding every built-in module type
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin();
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            palette: Vec::new(),
        }
    }

    fn register_builtin(&mut self) {
        // Sources
        self.register("Sources", "Basic oscillator", || Box::new(Oscillator::new()));
        self.register("Sources", "Looped white noise", || Box::new(Noise::new()));
        self.register("Sources", "Step sequencer", || Box::new(Sequencer::new()));
        self.register("Sources", "Live audio input", || Box::new(Microphone::new()));

        // Modulation
        self.register("Modulation", "Low-frequency oscillator", || Box::new(Lfo::new()));
        self.register("Modulation", "ADSR envelope, MIDI gate target", || {
            Box::new(Envelope::new())
        });

        // Processors
        self.register("Utilities", "Amplifier", || Box::new(Gain::new()));
        self.register("Utilities", "Stereo panner", || Box::new(Panner::new()));
        self.register("Filters", "Biquad filter", || Box::new(Filter::new()));
        self.register("Effects", "Delay with feedback", || Box::new(Delay::new()));
        self.register("Effects", "Wave-shaping distortion", || {
            Box::new(Distortion::new())
        });
        self.register("Effects", "Convolution reverb", || Box::new(Reverb::new()));
        self.register("Effects", "Dynamics compressor", || Box::new(Compressor::new()));
    }

    /// Register a module factory.
    ///
    /// The type name and arity are read from a temporary instance. A later
    /// registration under the same type name replaces the earlier one.
    pub fn register<F>(&mut self, category: &'static str, description: &'static str, factory: F)
    where
        F: Fn() -> Box<dyn SynthModule> + Send + Sync + 'static,
    {
        let temp_instance = factory();
        let metadata = ModuleMetadata {
            type_name: temp_instance.type_name(),
            category,
            description,
            input_only: temp_instance.input_only(),
        };

        self.factories.insert(metadata.type_name, Box::new(factory));
        match self
            .palette
            .iter_mut()
            .find(|m| m.type_name == metadata.type_name)
        {
            Some(existing) => *existing = metadata,
            None => self.palette.push(metadata),
        }
    }

    /// Instantiate a module by type name
    pub fn create(&self, type_name: &str) -> Result<Box<dyn SynthModule>, ModuleError> {
        self.factories
            .get(type_name)
            .map(|f| f())
            .ok_or_else(|| ModuleError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Every registered type, in registration order
    pub fn palette(&self) -> &[ModuleMetadata] {
        &self.palette
    }

    pub fn metadata(&self, type_name: &str) -> Option<&ModuleMetadata> {
        self.palette.iter().find(|m| m.type_name == type_name)
    }

    /// List modules in a specific category
    pub fn list_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ModuleMetadata> {
        self.palette.iter().filter(move |m| m.category == category)
    }

    /// Get all unique categories
    pub fn categories(&self) -> Vec<&'static str> {
        let mut cats: Vec<_> = self.palette.iter().map(|m| m.category).collect();
        cats.sort();
        cats.dedup();
        cats
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_instantiates_every_palette_entry() {
        let registry = ModuleRegistry::new();
        assert_eq!(registry.palette().len(), 13);
        for meta in registry.palette() {
            let instance = registry.create(meta.type_name).unwrap();
            assert_eq!(instance.type_name(), meta.type_name);
            assert_eq!(instance.input_only(), meta.input_only);
        }
    }

    #[test]
    fn test_unknown_type() {
        let registry = ModuleRegistry::new();
        assert_eq!(
            registry.create("Theremin").err(),
            Some(ModuleError::UnknownType("Theremin".into()))
        );
        assert!(!registry.contains("Theremin"));
    }

    #[test]
    fn test_palette_order_and_arity() {
        let registry = ModuleRegistry::new();
        let names: Vec<_> = registry.palette().iter().map(|m| m.type_name).collect();
        assert_eq!(&names[..4], &["Oscillator", "Noise", "Sequencer", "Microphone"]);

        assert!(!registry.metadata("Oscillator").unwrap().input_only);
        assert!(!registry.metadata("LFO").unwrap().input_only);
        assert!(registry.metadata("Filter").unwrap().input_only);
        assert!(registry.metadata("Envelope").unwrap().input_only);
    }

    #[test]
    fn test_categories() {
        let registry = ModuleRegistry::new();
        assert_eq!(
            registry.categories(),
            vec!["Effects", "Filters", "Modulation", "Sources", "Utilities"]
        );
        assert_eq!(registry.list_by_category("Effects").count(), 4);
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = ModuleRegistry::new();
        registry.register("Custom", "Louder gain", || Box::new(Gain::new()));
        assert_eq!(registry.palette().len(), 13);
        assert_eq!(registry.metadata("Gain").unwrap().category, "Custom");
    }
}
