use super::{Handle, LightSurface};
use crate::model::{Coordinates, LightColor};
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// In-memory stand-in for a scene object.
///
/// Holds whatever was last applied to it. Used by the binary to mirror the
/// simulation and by tests to observe what the client did.
pub struct MirrorObject {
    id: String,
    state: RwLock<MirrorState>,
    light: Option<MirrorLight>,
}

#[derive(Default)]
struct MirrorState {
    position: Option<Coordinates>,
    last_updated: Option<DateTime<Utc>>,
    update_count: u64,
}

struct MirrorLight {
    id: String,
    color: RwLock<Option<LightColor>>,
}

impl MirrorObject {
    /// Object with a position only (no light surface).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(MirrorState::default()),
            light: None,
        }
    }

    /// Object that can also display a light color.
    pub fn with_light_surface(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            light: Some(MirrorLight {
                id: id.clone(),
                color: RwLock::new(None),
            }),
            id,
            state: RwLock::new(MirrorState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> Option<Coordinates> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).position
    }

    pub fn light_color(&self) -> Option<LightColor> {
        self.light
            .as_ref()
            .and_then(|l| *l.color.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_updated
    }

    /// Number of position updates applied so far
    pub fn update_count(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .update_count
    }
}

impl Handle for MirrorObject {
    fn set_position(&self, position: Coordinates) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.position != Some(position) {
            info!(entity_id = %self.id, position = %position, "Position changed");
        }
        state.position = Some(position);
        state.last_updated = Some(Utc::now());
        state.update_count += 1;
    }

    fn light_surface(&self) -> Option<&dyn LightSurface> {
        self.light.as_ref().map(|l| l as &dyn LightSurface)
    }
}

impl LightSurface for MirrorLight {
    fn set_light_state(&self, color: LightColor) {
        let mut current = self.color.write().unwrap_or_else(PoisonError::into_inner);
        if *current != Some(color) {
            info!(entity_id = %self.id, color = %color, "Light changed");
        }
        *current = Some(color);
    }
}
