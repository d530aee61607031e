mod availability;
mod conflict;
mod error;
mod idempotent;
mod mutations;
mod queries;
mod store;

pub use availability::is_available;
pub use error::{EngineError, Entity};
pub use idempotent::Outcome;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::info;

use crate::catalog;
use crate::clock::Clock;
use crate::idempotency::IdempotencyCache;
use crate::journal::{Journal, JournalError, MemoryJournal, WalJournal, run_detached};
use crate::model::*;

use store::Store;

pub struct Engine {
    store: Arc<Store>,
    idempotency: IdempotencyCache,
    journal: Arc<dyn Journal>,
    clock: Arc<dyn Clock>,
    next_reservation_id: AtomicU64,
    /// Shared by every mutation, exclusive during compaction, so a snapshot
    /// never races an append.
    commit_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Open (or create) the WAL at `path` and rebuild state from it.
    pub async fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let (journal, history) = WalJournal::open(path).map_err(JournalError::from)?;
        Self::start(Arc::new(journal), history, clock).await
    }

    /// Engine over a fresh [`MemoryJournal`], seeded with the default catalog.
    pub async fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        Self::start(Arc::new(MemoryJournal::new()), Vec::new(), clock).await
    }

    /// Rebuild from `history`, which must be what `journal` already holds.
    /// An empty catalog is seeded with the default spots.
    pub async fn start(
        journal: Arc<dyn Journal>,
        history: Vec<Event>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let commit_gate = Arc::new(RwLock::new(()));
        let idempotency = IdempotencyCache::new(journal.clone(), clock.clone(), commit_gate.clone());

        let mut states: HashMap<ResourceId, ResourceState> = HashMap::new();
        let mut next_id: ReservationId = 1;
        for event in &history {
            match event {
                Event::Sequence { next_reservation_id } => {
                    next_id = next_id.max(*next_reservation_id);
                }
                Event::ResourceSeeded { resource } => {
                    states.insert(resource.id, ResourceState::new(resource.clone()));
                }
                Event::ResponseStored { .. } | Event::ResponsesPurged { .. } => {
                    idempotency.replay(event);
                }
                Event::ResourceActivated { .. }
                | Event::ReservationBooked { .. }
                | Event::ReservationCancelled { .. } => {
                    if let Event::ReservationBooked { reservation } = event {
                        next_id = next_id.max(reservation.id + 1);
                    }
                    if let Some(rs) = event.resource_id().and_then(|id| states.get_mut(&id)) {
                        rs.apply(event);
                    }
                }
            }
        }

        let engine = Self {
            store: Arc::new(Store::from_states(states)),
            idempotency,
            journal,
            clock,
            next_reservation_id: AtomicU64::new(next_id),
            commit_gate,
        };

        if engine.store.resource_count() == 0 {
            engine.seed(catalog::default_spots()).await?;
        }
        info!(
            events = history.len(),
            resources = engine.store.resource_count(),
            responses = engine.idempotency.len(),
            "engine ready"
        );
        Ok(engine)
    }

    async fn seed(&self, spots: Vec<Resource>) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let count = spots.len();
        for resource in spots {
            let event = Event::ResourceSeeded {
                resource: resource.clone(),
            };
            self.journal.append(&event).await?;
            self.store.insert_resource(resource);
        }
        info!(count, "seeded default catalog");
        Ok(())
    }

    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.idempotency
    }

    /// Journal `event`, then apply it to the spot behind `guard`. Runs
    /// detached: dropping the caller cannot separate the two steps. The gate
    /// and the spot lock are held until the unit ends. A journal failure
    /// leaves memory untouched.
    pub(super) async fn commit(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut guard: OwnedRwLockWriteGuard<ResourceState>,
        event: Event,
    ) -> Result<(), EngineError> {
        let journal = self.journal.clone();
        let store = self.store.clone();
        run_detached(async move {
            let _gate = gate;
            journal.append(&event).await?;
            store.apply(&mut guard, &event);
            Ok::<_, EngineError>(())
        })
        .await
    }

    pub(super) fn allocate_reservation_id(&self) -> ReservationId {
        self.next_reservation_id.fetch_add(1, Ordering::SeqCst)
    }
}
