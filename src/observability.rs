use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "parkd_bookings_total";

/// Counter: successful cancellations.
pub const CANCELLATIONS_TOTAL: &str = "parkd_cancellations_total";

/// Histogram: time spent inside the per-resource booking critical section.
pub const BOOK_DURATION_SECONDS: &str = "parkd_book_duration_seconds";

/// Counter: idempotent writes answered from the cache.
pub const IDEMPOTENCY_REPLAYS_TOTAL: &str = "parkd_idempotency_replays_total";

/// Counter: idempotent writes that lost the race to store their response.
pub const IDEMPOTENCY_STORE_RACES_TOTAL: &str = "parkd_idempotency_store_races_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: idempotency records currently retained.
pub const IDEMPOTENCY_RECORDS: &str = "parkd_idempotency_records";

/// Counter: idempotency records removed by the retention sweep.
pub const IDEMPOTENCY_PURGED_TOTAL: &str = "parkd_idempotency_purged_total";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "parkd_wal_compactions_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkd_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a booking result.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "booked",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::InvalidInterval { .. }) => "invalid_interval",
        Err(EngineError::PastInterval { .. }) => "past_interval",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(EngineError::AlreadyExists(_)) => "already_exists",
        Err(EngineError::StorageUnavailable(_)) => "storage_unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Entity;

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome_label::<()>(&Ok(())), "booked");
        assert_eq!(
            outcome_label::<()>(&Err(EngineError::NotFound(Entity::Resource(9)))),
            "not_found"
        );
        assert_eq!(outcome_label::<()>(&Err(EngineError::Conflict(4))), "conflict");
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
