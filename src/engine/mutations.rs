use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info};

use crate::model::*;
use crate::observability;

use super::conflict::{check_no_overlap, validate_interval};
use super::{Engine, EngineError, Entity};

impl Engine {
    /// Reserve a spot. Checks run under the spot's write lock, first failure
    /// wins: spot exists and is active, `start < end`, `start >= now`, no
    /// overlap. The overlap check and the insert are one atomic unit.
    pub async fn book(&self, request: BookingRequest) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.book_locked(request).await;
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "outcome" => observability::outcome_label(&result)
        )
        .increment(1);
        metrics::histogram!(observability::BOOK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn book_locked(&self, request: BookingRequest) -> Result<Reservation, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let resource_id = request.resource_id;
        let rs = self
            .store
            .get_resource(resource_id)
            .ok_or(EngineError::NotFound(Entity::Resource(resource_id)))?;
        let guard = rs.write_owned().await;
        if !guard.resource.active {
            return Err(EngineError::NotFound(Entity::Resource(resource_id)));
        }

        let now = self.clock.now_ms();
        let span = validate_interval(request.start, request.end, now)?;
        check_no_overlap(&guard, &span)?;

        let reservation = Reservation {
            id: self.allocate_reservation_id(),
            resource_id,
            holder_name: request.holder_name,
            holder_contact: request.holder_contact,
            span,
            created_at: now,
        };
        let event = Event::ReservationBooked {
            reservation: reservation.clone(),
        };
        self.commit(gate, guard, event).await?;
        debug!(
            reservation = reservation.id,
            resource = resource_id,
            start = span.start,
            end = span.end,
            "booked"
        );
        Ok(reservation)
    }

    /// Hard-delete a reservation. Cancelling an id that is gone (including a
    /// second cancel) is `NotFound`.
    pub async fn cancel(&self, id: ReservationId) -> Result<(), EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let (resource_id, guard) = self.store.resolve_reservation_write(id).await?;
        // A concurrent cancel may have won while we waited for the lock.
        if guard.reservation(id).is_none() {
            return Err(EngineError::NotFound(Entity::Reservation(id)));
        }

        self.commit(gate, guard, Event::ReservationCancelled { id, resource_id })
            .await?;
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        debug!(reservation = id, resource = resource_id, "cancelled");
        Ok(())
    }

    /// Toggle whether a spot accepts new bookings. Existing reservations are
    /// kept.
    pub async fn set_active(&self, id: ResourceId, active: bool) -> Result<Resource, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let rs = self
            .store
            .get_resource(id)
            .ok_or(EngineError::NotFound(Entity::Resource(id)))?;
        let guard = rs.write_owned().await;
        if guard.resource.active == active {
            return Ok(guard.resource.clone());
        }

        let mut updated = guard.resource.clone();
        updated.active = active;
        self.commit(gate, guard, Event::ResourceActivated { id, active })
            .await?;
        info!(resource = id, active, "resource toggled");
        Ok(updated)
    }

    /// Rewrite the journal with only the events needed to recreate the current
    /// state. Blocks mutations while the snapshot is taken and written.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events = vec![Event::Sequence {
            next_reservation_id: self.next_reservation_id.load(Ordering::SeqCst),
        }];
        for (_, rs) in self.store.resources_by_id() {
            let guard = rs.read().await;
            events.push(Event::ResourceSeeded {
                resource: guard.resource.clone(),
            });
            events.extend(
                guard
                    .reservations
                    .iter()
                    .cloned()
                    .map(|reservation| Event::ReservationBooked { reservation }),
            );
        }
        events.extend(
            self.idempotency
                .snapshot()
                .into_iter()
                .map(|record| Event::ResponseStored { record }),
        );

        let count = events.len();
        self.journal.compact(events).await?;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
