//! Preset storage
//!
//! Presets are stored as JSON text under `prefix + name`; saving a name that
//! already exists overwrites it. [`MemoryStore`] keeps the text in a map,
//! [`DirStore`] writes one `.json` file per preset. [`export_preset`] and
//! [`import_preset`] move a single preset to and from an arbitrary path.

use crate::error::StoreError;
use crate::preset::Preset;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Keyed preset persistence
pub trait PresetStore {
    /// Store `preset` under its name, replacing any previous one
    fn save(&mut self, preset: &Preset) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing is stored under `name`
    fn load(&self, name: &str) -> Result<Option<Preset>, StoreError>;

    /// Stored preset names, sorted
    fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Returns whether a preset was removed
    fn delete(&mut self, name: &str) -> Result<bool, StoreError>;
}

fn decode(text: &str, origin: &str) -> Result<Preset, StoreError> {
    Preset::from_json(text).ok_or_else(|| StoreError::Malformed(origin.to_string()))
}

/// In-memory store, keyed by `prefix + name`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    prefix: String,
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: BTreeMap::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Raw stored text
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.entries.get(&self.key(name)).map(String::as_str)
    }

    /// Store arbitrary text under `name`
    pub fn insert_raw(&mut self, name: &str, text: impl Into<String>) {
        let key = self.key(name);
        self.entries.insert(key, text.into());
    }
}

impl PresetStore for MemoryStore {
    fn save(&mut self, preset: &Preset) -> Result<(), StoreError> {
        let text = preset.to_json()?;
        let key = self.key(&preset.name);
        self.entries.insert(key, text);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Preset>, StoreError> {
        self.raw(name).map(|text| decode(text, name)).transpose()
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(&self.prefix))
            .map(str::to_string)
            .collect())
    }

    fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        let key = self.key(name);
        Ok(self.entries.remove(&key).is_some())
    }
}

/// One `.json` file per preset in a directory
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    prefix: String,
}

impl DirStore {
    /// The directory is created on first save
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a preset name. Path separators and other characters
    /// unsafe in file names become `_`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let stem: String = format!("{}{}", self.prefix, name)
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        self.dir.join(format!("{stem}.json"))
    }
}

impl PresetStore for DirStore {
    fn save(&mut self, preset: &Preset) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::write(&self.dir, e))?;
        let path = self.path_for(&preset.name);
        let text = preset.to_json()?;
        std::fs::write(&path, text).map_err(|e| StoreError::write(&path, e))?;
        tracing::debug!(name = %preset.name, path = %path.display(), "preset saved");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Preset>, StoreError> {
        let path = self.path_for(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => decode(&text, &path.display().to_string()).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::read(path, e)),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::read(&self.dir, e)),
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.strip_prefix(&self.prefix))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::write(path, e)),
        }
    }
}

/// Write a preset as pretty JSON
pub fn export_preset(preset: &Preset, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::write(parent, e))?;
    }
    let text = preset.to_json()?;
    std::fs::write(path, text).map_err(|e| StoreError::write(path, e))?;
    tracing::info!(name = %preset.name, path = %path.display(), "preset exported");
    Ok(())
}

/// Read a preset exported by [`export_preset`] or written by hand
pub fn import_preset(path: impl AsRef<Path>) -> Result<Preset, StoreError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::read(path, e))?;
    let preset = decode(&text, &path.display().to_string())?;
    tracing::info!(name = %preset.name, path = %path.display(), "preset imported");
    Ok(preset)
}
