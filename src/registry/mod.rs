//! Entity registry - Maps wire identifiers to updatable targets.
//!
//! The sync client never owns scene state. It asks a [`Resolve`] capability
//! for a [`Handle`] per record and pushes updates through it. An id with no
//! handle is skipped silently.

mod mirror;

pub use mirror::MirrorObject;

use crate::config::EntitiesConfig;
use crate::model::{Coordinates, LightColor};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;


/// Target entity supplied by the embedding environment.
pub trait Handle: Send + Sync {
    /// Move the entity to a world-space coordinate.
    fn set_position(&self, position: Coordinates);

    /// Optional visual-state capability. Entities without a renderable
    /// surface return `None` and light updates for them are no-ops.
    fn light_surface(&self) -> Option<&dyn LightSurface> {
        None
    }
}

/// Capability to show a traffic-light color.
pub trait LightSurface: Send + Sync {
    fn set_light_state(&self, color: LightColor);
}

/// Lookup from wire id to handle.
pub trait Resolve: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Arc<dyn Handle>>;
}

impl<F> Resolve for F
where
    F: Fn(&str) -> Option<Arc<dyn Handle>> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Option<Arc<dyn Handle>> {
        self(id)
    }
}

/// Concurrent id → handle table.
///
/// Usually populated once at startup, but entries may be added or removed
/// while poll loops are reading from it.
#[derive(Default)]
pub struct EntityRegistry {
    handles: DashMap<String, Arc<dyn Handle>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Build a registry of in-memory mirrors for every configured id.
    ///
    /// Traffic lights get a light surface; cars and extra ids do not.
    pub fn from_config(config: &EntitiesConfig) -> Self {
        Self::with_mirrors(config).0
    }

    /// Like [`from_config`](Self::from_config), also returning the mirrors
    /// so the caller can inspect what was applied.
    pub fn with_mirrors(config: &EntitiesConfig) -> (Self, Vec<Arc<MirrorObject>>) {
        let registry = Self::new();
        let mut mirrors = Vec::new();

        for id in config.cars.ids().into_iter().chain(config.extra.iter().cloned()) {
            mirrors.push(Arc::new(MirrorObject::new(id)));
        }
        for id in config.traffic_lights.ids() {
            mirrors.push(Arc::new(MirrorObject::with_light_surface(id)));
        }
        for mirror in &mirrors {
            registry.register(mirror.id(), Arc::clone(mirror) as Arc<dyn Handle>);
        }

        debug!(entity_ids = ?registry.ids(), "Entity registry built");
        (registry, mirrors)
    }

    /// Register (or replace) a handle. Returns the previous handle if any.
    pub fn register(
        &self,
        id: impl Into<String>,
        handle: Arc<dyn Handle>,
    ) -> Option<Arc<dyn Handle>> {
        self.handles.insert(id.into(), handle)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn Handle>> {
        self.handles.remove(id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Resolve for EntityRegistry {
    fn resolve(&self, id: &str) -> Option<Arc<dyn Handle>> {
        self.handles.get(id).map(|e| Arc::clone(e.value()))
    }
}
