use std::fmt;

use crate::journal::JournalError;
use crate::model::{Ms, ReservationId, ResourceId};

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Resource(ResourceId),
    Reservation(ReservationId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Resource(id) => write!(f, "resource {id}"),
            Entity::Reservation(id) => write!(f, "reservation {id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Absent, or an inactive resource at booking time.
    #[error("not found: {0}")]
    NotFound(Entity),
    #[error("invalid interval [{start}, {end}): end must be after start")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("interval starts at {start}, before now ({now})")]
    PastInterval { start: Ms, now: Ms },
    #[error("conflict with reservation: {0}")]
    Conflict(ReservationId),
    /// Recoverable: another writer already stored a response for this key.
    #[error("idempotency key already exists: {0}")]
    AlreadyExists(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] JournalError),
}
