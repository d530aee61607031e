use crate::model::*;

use super::EngineError;

/// Interval preconditions for a booking, in order: non-empty, then not in the
/// past.
pub(crate) fn validate_interval(start: Ms, end: Ms, now: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    if start < now {
        return Err(EngineError::PastInterval { start, now });
    }
    Ok(Span::new(start, end))
}

/// First live reservation intersecting `span`, reported as a conflict.
pub(crate) fn check_no_overlap(rs: &ResourceState, span: &Span) -> Result<(), EngineError> {
    match rs.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
