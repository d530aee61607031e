use crate::model::*;

use super::{Engine, EngineError, Entity};

impl Engine {
    pub async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let not_found = || EngineError::NotFound(Entity::Reservation(id));
        let resource_id = self.store.resource_for_reservation(id).ok_or_else(not_found)?;
        let rs = self.store.get_resource(resource_id).ok_or_else(not_found)?;
        let guard = rs.read().await;
        guard.reservation(id).cloned().ok_or_else(not_found)
    }

    pub async fn resource(&self, id: ResourceId) -> Result<Resource, EngineError> {
        let rs = self
            .store
            .get_resource(id)
            .ok_or(EngineError::NotFound(Entity::Resource(id)))?;
        let guard = rs.read().await;
        Ok(guard.resource.clone())
    }

    /// Every spot, active or not, ordered by id.
    pub async fn resources(&self) -> Vec<Resource> {
        let mut out = Vec::new();
        for (_, rs) in self.store.resources_by_id() {
            out.push(rs.read().await.resource.clone());
        }
        out
    }

    /// Live reservations on a spot, ordered by start.
    pub async fn reservations_for(
        &self,
        resource_id: ResourceId,
    ) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .store
            .get_resource(resource_id)
            .ok_or(EngineError::NotFound(Entity::Resource(resource_id)))?;
        let guard = rs.read().await;
        Ok(guard.reservations.clone())
    }
}
