use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type ResourceId = u64;
pub type ReservationId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Strict half-open intersection: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A bookable parking spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub label: String,
    /// Coarse grouping used by availability filters.
    pub floor: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub resource_id: ResourceId,
    pub holder_name: String,
    pub holder_contact: String,
    pub span: Span,
    pub created_at: Ms,
}

/// Input to [`crate::engine::Engine::book`]. Bounds are raw so that an
/// inverted or empty interval can be reported instead of asserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: ResourceId,
    pub holder_name: String,
    pub holder_contact: String,
    pub start: Ms,
    pub end: Ms,
}

/// A response captured for replay under an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: Bytes,
}

impl StoredResponse {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize>(status_code: u16, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(status_code, serde_json::to_vec(value)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub response: StoredResponse,
    pub created_at: Ms,
}

/// Per-spot state: the catalog entry plus its live reservations.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub resource: Resource,
    /// Live reservations, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl ResourceState {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations whose span intersects `query`.
    /// Binary search skips everything starting at or after `query.end`; the
    /// bounds are not required to be ordered.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Apply a resource-scoped event. Catalog-level and idempotency events are
    /// ignored here.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::ResourceActivated { active, .. } => self.resource.active = *active,
            Event::ReservationBooked { reservation } => {
                self.insert_reservation(reservation.clone());
            }
            Event::ReservationCancelled { id, .. } => {
                self.remove_reservation(*id);
            }
            Event::Sequence { .. }
            | Event::ResourceSeeded { .. }
            | Event::ResponseStored { .. }
            | Event::ResponsesPurged { .. } => {}
        }
    }
}

/// Flat event types, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Lower bound for the next reservation id. Written first by compaction so
    /// ids never repeat after cancelled reservations are dropped.
    Sequence { next_reservation_id: ReservationId },
    ResourceSeeded { resource: Resource },
    ResourceActivated { id: ResourceId, active: bool },
    ReservationBooked { reservation: Reservation },
    ReservationCancelled { id: ReservationId, resource_id: ResourceId },
    ResponseStored { record: IdempotencyRecord },
    /// Every record with `created_at < cutoff` was removed.
    ResponsesPurged { cutoff: Ms },
}

impl Event {
    /// Resource touched by a resource-scoped event.
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            Event::ResourceSeeded { resource } => Some(resource.id),
            Event::ResourceActivated { id, .. } => Some(*id),
            Event::ReservationBooked { reservation } => Some(reservation.resource_id),
            Event::ReservationCancelled { resource_id, .. } => Some(*resource_id),
            Event::Sequence { .. } | Event::ResponseStored { .. } | Event::ResponsesPurged { .. } => {
                None
            }
        }
    }
}
