//! Patch Graph
//!
//! The patch-cable state machine. A cable is begun from a module's output,
//! follows the pointer while pending, and is either completed onto a
//! destination dock or discarded:
//!
//! ```text
//!            begin                  complete (valid)
//!   Idle ──────────► Pending ───────────────────────► Idle  (+1 wired cable)
//!    ▲                │  │
//!    │    cancel      │  │  complete (rejected)
//!    └────────────────┘  └──────────────────────────► Idle  (nothing wired)
//! ```
//!
//! At most one cable is pending at a time. Completed cables are recorded as
//! routes `source id → {destination id}`, and a source may reach each
//! destination id only once.

use crate::error::{PatchError, Rejection};
use crate::host::{AudioHost, Endpoint, NodeKey};
use crate::ids::dock_module;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap};

slotmap::new_key_type! {
    /// Unique identifier for a cable
    pub struct CableId;
}

/// Canvas position, used only for rendering
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Where a cable starts
#[derive(Debug, Clone, PartialEq)]
pub struct CableSource {
    /// Source module id
    pub module: String,
    pub anchor: Point,
    /// The source module's live output
    pub output: NodeKey,
}

/// Where a cable lands
#[derive(Debug, Clone, PartialEq)]
pub struct CableTarget {
    /// Destination module or parameter-dock id
    pub id: String,
    pub anchor: Point,
    /// The live input or control the cable feeds
    pub endpoint: Endpoint,
}

/// A patch cable; pending while it has no target
#[derive(Debug, Clone, PartialEq)]
pub struct Cable {
    pub source: CableSource,
    pub target: Option<CableTarget>,
}

impl Cable {
    pub fn is_complete(&self) -> bool {
        self.target.is_some()
    }

    /// Whether either end belongs to `module`
    pub fn touches(&self, module: &str) -> bool {
        self.source.module == module
            || self
                .target
                .as_ref()
                .is_some_and(|t| dock_module(&t.id) == module)
    }
}

/// Interaction state of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Idle,
    Pending(CableId),
}

/// All cables of a patch plus the pending one
#[derive(Debug, Default)]
pub struct PatchGraph {
    cables: SlotMap<CableId, Cable>,
    pending: Option<CableId>,
    routes: HashMap<String, BTreeSet<String>>,
}

impl PatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GraphState {
        match self.pending {
            Some(id) => GraphState::Pending(id),
            None => GraphState::Idle,
        }
    }

    /// Start a cable from `source`. A cable already pending is discarded.
    pub fn begin(&mut self, source: CableSource) -> CableId {
        if self.cancel() {
            tracing::debug!("discarded pending cable");
        }
        tracing::debug!(source = %source.module, "cable begun");
        let id = self.cables.insert(Cable {
            source,
            target: None,
        });
        self.pending = Some(id);
        id
    }

    pub fn pending(&self) -> Option<&Cable> {
        self.pending.and_then(|id| self.cables.get(id))
    }

    /// Check a prospective route without touching any state.
    ///
    /// Rules apply in order: self connection, existing route, then any
    /// destination containing the source id (its own parameter dock, or a
    /// module whose id extends the source id).
    pub fn check(&self, source: &str, destination: &str) -> Result<(), Rejection> {
        if destination == source {
            return Err(Rejection::SelfConnection);
        }
        if self
            .routes
            .get(source)
            .is_some_and(|routes| routes.contains(destination))
        {
            return Err(Rejection::AlreadyConnected);
        }
        if destination.contains(source) {
            return Err(Rejection::NotNew);
        }
        Ok(())
    }

    /// Complete the pending cable onto `target` and wire it at the host.
    ///
    /// A rejected completion discards the pending cable and leaves the live
    /// graph untouched. Either way the graph is idle afterwards.
    pub fn complete(
        &mut self,
        target: CableTarget,
        host: &mut dyn AudioHost,
    ) -> Result<CableId, PatchError> {
        let id = self.pending.take().ok_or(PatchError::NotPending)?;
        let Some(cable) = self.cables.get(id) else {
            return Err(PatchError::InvalidCable);
        };
        let source = cable.source.module.clone();
        let output = cable.source.output;

        let wired = self
            .check(&source, &target.id)
            .and_then(|_| host.connect(output, target.endpoint).map_err(Rejection::Host));
        if let Err(rejection) = wired {
            self.cables.remove(id);
            tracing::warn!(%source, destination = %target.id, %rejection, "cable rejected");
            return Err(rejection.into());
        }

        tracing::debug!(%source, destination = %target.id, "cable connected");
        self.routes
            .entry(source)
            .or_default()
            .insert(target.id.clone());
        if let Some(cable) = self.cables.get_mut(id) {
            cable.target = Some(target);
        }
        Ok(id)
    }

    /// Discard the pending cable. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(id) => self.cables.remove(id).is_some(),
            None => false,
        }
    }

    /// Unwire and remove a cable, freeing its route
    pub fn delete(&mut self, id: CableId, host: &mut dyn AudioHost) -> Result<Cable, PatchError> {
        let cable = self.cables.remove(id).ok_or(PatchError::InvalidCable)?;
        if self.pending == Some(id) {
            self.pending = None;
            return Ok(cable);
        }
        if let Some(target) = &cable.target {
            if let Err(err) = host.disconnect(cable.source.output, target.endpoint) {
                tracing::warn!(%err, destination = %target.id, "failed to disconnect cable");
            }
            if let Some(routes) = self.routes.get_mut(&cable.source.module) {
                routes.remove(&target.id);
                if routes.is_empty() {
                    self.routes.remove(&cable.source.module);
                }
            }
        }
        tracing::debug!(source = %cable.source.module, "cable deleted");
        Ok(cable)
    }

    /// Delete every cable touching `module`, including a pending cable
    /// sourced there. Returns the removed cables.
    pub fn remove_module(&mut self, module: &str, host: &mut dyn AudioHost) -> Vec<Cable> {
        let doomed: Vec<CableId> = self
            .cables
            .iter()
            .filter(|(_, cable)| cable.touches(module))
            .map(|(id, _)| id)
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| match self.delete(id, host) {
                Ok(cable) => Some(cable),
                Err(err) => {
                    tracing::warn!(%err, %module, "failed to delete cable");
                    None
                }
            })
            .collect()
    }

    /// Delete every cable
    pub fn clear(&mut self, host: &mut dyn AudioHost) {
        let all: Vec<CableId> = self.cables.keys().collect();
        for id in all {
            if let Err(err) = self.delete(id, host) {
                tracing::warn!(%err, "failed to delete cable");
            }
        }
    }

    pub fn cable(&self, id: CableId) -> Option<&Cable> {
        self.cables.get(id)
    }

    /// Completed cables
    pub fn cables(&self) -> impl Iterator<Item = (CableId, &Cable)> {
        self.cables.iter().filter(|(_, c)| c.is_complete())
    }

    /// Number of completed cables
    pub fn cable_count(&self) -> usize {
        self.cables().count()
    }

    /// Find the completed cable for a route
    pub fn find(&self, source: &str, destination: &str) -> Option<CableId> {
        self.cables()
            .find(|(_, c)| {
                c.source.module == source && c.target.as_ref().is_some_and(|t| t.id == destination)
            })
            .map(|(id, _)| id)
    }

    pub fn routes_from(&self, source: &str) -> Option<&BTreeSet<String>> {
        self.routes.get(source)
    }

    /// `(source id, destination id)` of every completed cable
    pub fn connections(&self) -> Vec<(String, String)> {
        self.cables()
            .filter_map(|(_, c)| {
                c.target
                    .as_ref()
                    .map(|t| (c.source.module.clone(), t.id.clone()))
            })
            .collect()
    }
}
