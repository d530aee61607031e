use crate::model::Resource;

pub const FLOORS: i32 = 3;
pub const SPOTS_PER_FLOOR: u64 = 4;

/// The spots seeded into an empty store: ids `1..=12`, labelled `P{floor}-{nn}`.
pub fn default_spots() -> Vec<Resource> {
    (1..=FLOORS)
        .flat_map(|floor| {
            (1..=SPOTS_PER_FLOOR).map(move |n| Resource {
                id: (floor as u64 - 1) * SPOTS_PER_FLOOR + n,
                label: format!("P{floor}-{n:02}"),
                floor,
                active: true,
            })
        })
        .collect()
}
