use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::model::*;

use super::{EngineError, Entity};

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// Working set: one lock per spot plus a reservation → spot index.
#[derive(Default)]
pub struct Store {
    resources: DashMap<ResourceId, SharedResourceState>,
    reservation_index: DashMap<ReservationId, ResourceId>,
}

impl Store {
    /// Build from replayed per-spot state.
    pub fn from_states(states: HashMap<ResourceId, ResourceState>) -> Self {
        let store = Self::default();
        for (id, rs) in states {
            for r in &rs.reservations {
                store.reservation_index.insert(r.id, id);
            }
            store.resources.insert(id, Arc::new(RwLock::new(rs)));
        }
        store
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn get_resource(&self, id: ResourceId) -> Option<SharedResourceState> {
        self.resources.get(&id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.resources
            .insert(resource.id, Arc::new(RwLock::new(ResourceState::new(resource))));
    }

    /// All spot locks, ordered by id.
    pub fn resources_by_id(&self) -> Vec<(ResourceId, SharedResourceState)> {
        let mut all: Vec<_> = self
            .resources
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    // ── Reservation index ────────────────────────────────────

    pub fn resource_for_reservation(&self, id: ReservationId) -> Option<ResourceId> {
        self.reservation_index.get(&id).map(|e| *e.value())
    }

    /// Lookup reservation → spot, then take that spot's write lock.
    pub async fn resolve_reservation_write(
        &self,
        id: ReservationId,
    ) -> Result<(ResourceId, OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .resource_for_reservation(id)
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))?;
        let rs = self
            .get_resource(resource_id)
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))?;
        Ok((resource_id, rs.write_owned().await))
    }

    // ── Event application ────────────────────────────────────

    /// Apply a resource-scoped event to a locked spot and keep the index in
    /// step. Caller holds the write lock.
    pub fn apply(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::ReservationBooked { reservation } => {
                self.reservation_index
                    .insert(reservation.id, reservation.resource_id);
            }
            Event::ReservationCancelled { id, .. } => {
                self.reservation_index.remove(id);
            }
            _ => {}
        }
        rs.apply(event);
    }
}
