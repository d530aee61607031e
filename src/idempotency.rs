//! Idempotency cache: client key → the first response produced for it.
//!
//! A key is claimed with a `Pending` slot before the journal write, so two
//! concurrent `store` calls for one key cannot both persist. Readers only see
//! committed records.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::engine::EngineError;
use crate::journal::{Journal, run_detached};
use crate::model::{Event, IdempotencyRecord, Ms, StoredResponse};
use crate::observability;

pub const MAX_KEY_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("idempotency key must not be empty")]
    Empty,
    #[error("idempotency key must be at most {MAX_KEY_CHARS} characters")]
    TooLong,
}

/// Client-supplied opaque token, 1–255 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if raw.chars().count() > MAX_KEY_CHARS {
            return Err(KeyError::TooLong);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

enum Slot {
    /// Claimed by an in-flight `store`; not yet durable.
    Pending,
    Committed(IdempotencyRecord),
}

type Slots = DashMap<String, Slot>;

pub struct IdempotencyCache {
    slots: Arc<Slots>,
    journal: Arc<dyn Journal>,
    clock: Arc<dyn Clock>,
    commit_gate: Arc<RwLock<()>>,
}

impl IdempotencyCache {
    pub(crate) fn new(
        journal: Arc<dyn Journal>,
        clock: Arc<dyn Clock>,
        commit_gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            journal,
            clock,
            commit_gate,
        }
    }

    /// Rebuild from history. Non-idempotency events are ignored.
    pub(crate) fn replay(&self, event: &Event) {
        match event {
            Event::ResponseStored { record } => {
                self.slots
                    .insert(record.key.clone(), Slot::Committed(record.clone()));
            }
            Event::ResponsesPurged { cutoff } => retain_from(&self.slots, *cutoff),
            _ => {}
        }
    }

    pub fn lookup(&self, key: &IdempotencyKey) -> Option<StoredResponse> {
        match self.slots.get(key.as_str())?.value() {
            Slot::Committed(record) => Some(record.response.clone()),
            Slot::Pending => None,
        }
    }

    /// Insert-if-absent. Fails with `AlreadyExists` when the key is committed
    /// or claimed by a concurrent writer; never overwrites. Once the key is
    /// claimed the write runs detached, so the claim always ends committed or
    /// released.
    pub async fn store(
        &self,
        key: &IdempotencyKey,
        response: StoredResponse,
    ) -> Result<(), EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        match self.slots.entry(key.as_str().to_owned()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Pending);
            }
        }

        let record = IdempotencyRecord {
            key: key.as_str().to_owned(),
            response,
            created_at: self.clock.now_ms(),
        };
        let slots = self.slots.clone();
        let journal = self.journal.clone();
        run_detached(async move {
            let _gate = gate;
            let event = Event::ResponseStored {
                record: record.clone(),
            };
            if let Err(e) = journal.append(&event).await {
                slots.remove(&record.key);
                return Err(e.into());
            }
            slots.insert(record.key.clone(), Slot::Committed(record));
            metrics::gauge!(observability::IDEMPOTENCY_RECORDS).set(committed_len(&slots) as f64);
            Ok::<_, EngineError>(())
        })
        .await
    }

    /// Remove committed records with `created_at < now - max_age`. Returns
    /// how many were removed.
    pub async fn purge_older_than(&self, max_age: Duration) -> Result<usize, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let max_age_ms = Ms::try_from(max_age.as_millis()).unwrap_or(Ms::MAX);
        let cutoff = self.clock.now_ms().saturating_sub(max_age_ms);

        let slots = self.slots.clone();
        let journal = self.journal.clone();
        run_detached(async move {
            let _gate = gate;
            journal.append(&Event::ResponsesPurged { cutoff }).await?;
            let before = committed_len(&slots);
            retain_from(&slots, cutoff);
            let after = committed_len(&slots);
            let removed = before.saturating_sub(after);

            debug!(removed, cutoff, "purged idempotency records");
            metrics::counter!(observability::IDEMPOTENCY_PURGED_TOTAL).increment(removed as u64);
            metrics::gauge!(observability::IDEMPOTENCY_RECORDS).set(after as f64);
            Ok::<_, EngineError>(removed)
        })
        .await
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        committed_len(&self.slots)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed records, for log compaction.
    pub(crate) fn snapshot(&self) -> Vec<IdempotencyRecord> {
        let mut records: Vec<_> = self
            .slots
            .iter()
            .filter_map(|e| match e.value() {
                Slot::Committed(record) => Some(record.clone()),
                Slot::Pending => None,
            })
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        records
    }
}

fn committed_len(slots: &Slots) -> usize {
    slots
        .iter()
        .filter(|e| matches!(e.value(), Slot::Committed(_)))
        .count()
}

fn retain_from(slots: &Slots, cutoff: Ms) {
    slots.retain(|_, slot| match slot {
        Slot::Committed(record) => record.created_at >= cutoff,
        Slot::Pending => true,
    });
}
