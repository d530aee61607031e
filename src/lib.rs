//! Conflict-free reservations of parking spots, with an idempotency cache so
//! retried writes take effect once and replay the same response.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod idempotency;
pub mod journal;
pub mod logging;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod wal;
