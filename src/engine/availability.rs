use crate::model::*;

use super::Engine;

/// Whether a spot should be listed: active, on `floor` if given, and free for
/// the whole of `window` if given. The window is not validated; an inverted
/// window only excludes spots with a reservation straddling both bounds.
pub fn is_available(rs: &ResourceState, floor: Option<i32>, window: Option<&Span>) -> bool {
    rs.resource.active
        && floor.is_none_or(|f| rs.resource.floor == f)
        && window.is_none_or(|w| rs.overlapping(w).next().is_none())
}

impl Engine {
    /// True iff a live reservation on `resource_id` intersects `[start, end)`.
    /// Unknown spots have no reservations.
    pub async fn overlaps(&self, resource_id: ResourceId, start: Ms, end: Ms) -> bool {
        let Some(rs) = self.store.get_resource(resource_id) else {
            return false;
        };
        let guard = rs.read().await;
        guard.overlapping(&Span { start, end }).next().is_some()
    }

    /// Active spots, optionally on one floor. The time filter applies only
    /// when both `start` and `end` are given; a single bound is ignored.
    pub async fn available(
        &self,
        floor: Option<i32>,
        start: Option<Ms>,
        end: Option<Ms>,
    ) -> Vec<Resource> {
        let window = match (start, end) {
            (Some(start), Some(end)) => Some(Span { start, end }),
            _ => None,
        };

        let mut free = Vec::new();
        for (_, rs) in self.store.resources_by_id() {
            let guard = rs.read().await;
            if is_available(&guard, floor, window.as_ref()) {
                free.push(guard.resource.clone());
            }
        }
        free
    }
}
