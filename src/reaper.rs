use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Purge idempotency records older than `ttl`: once immediately, then every
/// `period`.
pub async fn run_reaper(engine: Arc<Engine>, ttl: Duration, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match engine.idempotency().purge_older_than(ttl).await {
            Ok(0) => debug!("reaper: nothing to purge"),
            Ok(n) => info!("reaped {n} expired idempotency records"),
            // Retried on the next tick.
            Err(e) => warn!("reaper failed: {e}"),
        }
    }
}

/// Compact the journal whenever more than `threshold` appends have landed
/// since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if engine.journal_appends_since_compact().await <= threshold {
            continue;
        }
        if let Err(e) = engine.compact_journal().await {
            warn!("compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::idempotency::IdempotencyKey;
    use crate::model::StoredResponse;

    const H: i64 = 3_600_000;

    #[tokio::test(start_paused = true)]
    async fn reaper_purges_on_startup_and_on_schedule() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Arc::new(Engine::in_memory(clock.clone()).await.unwrap());

        let first = IdempotencyKey::new("first").unwrap();
        engine
            .idempotency()
            .store(&first, StoredResponse::new(201, &b"a"[..]))
            .await
            .unwrap();
        clock.set(25 * H);

        let task = tokio::spawn(run_reaper(
            engine.clone(),
            Duration::from_secs(24 * 3600),
            Duration::from_secs(60),
        ));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(engine.idempotency().lookup(&first).is_none());

        let second = IdempotencyKey::new("second").unwrap();
        engine
            .idempotency()
            .store(&second, StoredResponse::new(201, &b"b"[..]))
            .await
            .unwrap();
        clock.set(50 * H);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(engine.idempotency().lookup(&second).is_none());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn compactor_waits_for_threshold() {
        let engine = Arc::new(Engine::in_memory(Arc::new(ManualClock::new(0))).await.unwrap());
        // Seeding the catalog already appended 12 events.
        assert_eq!(engine.journal_appends_since_compact().await, 12);

        let task = tokio::spawn(run_compactor(engine.clone(), 100));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(engine.journal_appends_since_compact().await, 12);

        let task2 = tokio::spawn(run_compactor(engine.clone(), 5));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.journal_appends_since_compact().await, 0);

        task.abort();
        task2.abort();
    }
}
