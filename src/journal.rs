//! Durability port. The engine keeps its working state in memory and writes
//! every mutation through a [`Journal`] before applying it.

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::warn;

use crate::model::Event;
use crate::observability;
use crate::wal::Wal;

#[derive(Debug, Clone, thiserror::Error)]
pub enum JournalError {
    #[error("journal writer shut down")]
    Closed,
    #[error("journal I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for JournalError {
    fn from(e: io::Error) -> Self {
        JournalError::Io(e.to_string())
    }
}

#[async_trait]
pub trait Journal: Send + Sync {
    /// Durably record one event. The event must not be applied if this fails.
    async fn append(&self, event: &Event) -> Result<(), JournalError>;

    /// Replace the whole history with `events`.
    async fn compact(&self, events: Vec<Event>) -> Result<(), JournalError>;

    async fn appends_since_compact(&self) -> u64;
}

/// Run a journal-then-apply unit on its own task. Once started it finishes
/// even if the caller's future is dropped, so an event the journal accepted
/// is always applied (or a claim it made always released).
pub(crate) async fn run_detached<T, E, F>(unit: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JournalError> + Send + 'static,
{
    match tokio::spawn(unit).await {
        Ok(result) => result,
        Err(e) => match e.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            // Cancelled only when the runtime is shutting down.
            Err(_) => Err(JournalError::Closed.into()),
        },
    }
}

// ── WAL-backed journal (group commit) ───────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<Result<(), JournalError>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<Result<(), JournalError>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<Result<(), JournalError>>);

/// Journal backed by a [`Wal`] owned by a background writer task.
pub struct WalJournal {
    tx: mpsc::Sender<WalCommand>,
}

impl WalJournal {
    /// Replay the log at `path`, then start the writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let history = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok((Self { tx }, history))
    }

    async fn request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, JournalError> {
        self.tx.send(cmd).await.map_err(|_| JournalError::Closed)?;
        rx.await.map_err(|_| JournalError::Closed)
    }
}

#[async_trait]
impl Journal for WalJournal {
    async fn append(&self, event: &Event) -> Result<(), JournalError> {
        let (response, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response,
        };
        self.request(cmd, rx).await?
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), JournalError> {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::Compact { events, response }, rx).await?
    }

    async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::AppendsSinceCompact { response }, rx)
            .await
            .unwrap_or(0)
    }
}

/// Owns the WAL and batches appends:
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch, then answer every sender.
///
/// A non-append command ends the batch; it runs after the batch is flushed so
/// ordering is preserved.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let first = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![first];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        flush_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // A failed batch is rolled back whole; every caller in it is told so.
    let result = match result {
        Ok(()) => wal.flush_sync(),
        Err(e) => {
            wal.rollback();
            Err(e)
        }
    }
    .map_err(JournalError::from);

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!(batch = batch.len(), "WAL flush failed: {e}");
    }

    for (_, tx) in batch {
        let _ = tx.send(result.clone());
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events).map_err(JournalError::from));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => flush_batch(wal, vec![(event, response)]),
    }
}

// ── In-memory journal ───────────────────────────────────────────

/// Keeps the history in memory. `set_failing(true)` makes every append and
/// compaction fail, for exercising storage-fault paths.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<Event>>,
    appends_since_compact: AtomicU64,
    failing: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    fn check(&self) -> Result<(), JournalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JournalError::Io("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, event: &Event) -> Result<(), JournalError> {
        self.check()?;
        self.events.lock().await.push(event.clone());
        self.appends_since_compact.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), JournalError> {
        self.check()?;
        *self.events.lock().await = events;
        self.appends_since_compact.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activated(active: bool) -> Event {
        Event::ResourceActivated { id: 3, active }
    }

    #[tokio::test]
    async fn wal_journal_round_trips_through_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.wal");
        {
            let (journal, history) = WalJournal::open(&path).unwrap();
            assert!(history.is_empty());
            journal.append(&activated(false)).await.unwrap();
            journal.append(&activated(true)).await.unwrap();
            assert_eq!(journal.appends_since_compact().await, 2);
        }
        let (_journal, history) = WalJournal::open(&path).unwrap();
        assert_eq!(history, vec![activated(false), activated(true)]);
    }

    #[tokio::test]
    async fn wal_journal_concurrent_appends_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group_commit.wal");
        let (journal, _) = WalJournal::open(&path).unwrap();
        let journal = std::sync::Arc::new(journal);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let j = journal.clone();
                tokio::spawn(async move { j.append(&Event::ResponsesPurged { cutoff: i }).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn wal_journal_compact_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.wal");
        let (journal, _) = WalJournal::open(&path).unwrap();
        journal.append(&activated(false)).await.unwrap();
        journal.append(&activated(true)).await.unwrap();

        journal.compact(vec![activated(true)]).await.unwrap();
        assert_eq!(journal.appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap(), vec![activated(true)]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn wal_journal_write_failure_is_reported_and_sticks() {
        // Every write to /dev/full fails with ENOSPC, and it cannot be
        // truncated, so the rollback poisons the log.
        let Ok((journal, history)) = WalJournal::open(Path::new("/dev/full")) else {
            return;
        };
        assert!(history.is_empty());

        assert!(matches!(
            journal.append(&activated(false)).await,
            Err(JournalError::Io(_))
        ));
        assert!(matches!(
            journal.append(&activated(true)).await,
            Err(JournalError::Io(_))
        ));
    }

    #[tokio::test]
    async fn memory_journal_failure_mode() {
        let journal = MemoryJournal::new();
        journal.append(&activated(false)).await.unwrap();

        journal.set_failing(true);
        assert!(matches!(
            journal.append(&activated(true)).await,
            Err(JournalError::Io(_))
        ));
        assert!(journal.compact(Vec::new()).await.is_err());

        journal.set_failing(false);
        assert_eq!(journal.events().await, vec![activated(false)]);
        assert_eq!(journal.appends_since_compact().await, 1);
    }
}
