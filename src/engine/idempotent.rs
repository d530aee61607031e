use tracing::{debug, warn};

use crate::idempotency::IdempotencyKey;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

/// What an idempotent write handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Computed by this call.
    Fresh(StoredResponse),
    /// Replayed byte-for-byte from an earlier call with the same key.
    Replayed(StoredResponse),
}

impl Outcome {
    pub fn response(&self) -> &StoredResponse {
        match self {
            Outcome::Fresh(r) | Outcome::Replayed(r) => r,
        }
    }

    pub fn into_response(self) -> StoredResponse {
        match self {
            Outcome::Fresh(r) | Outcome::Replayed(r) => r,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Outcome::Replayed(_))
    }
}

impl Engine {
    /// Book under an idempotency key.
    ///
    /// A cached response for `key` is returned untouched. Otherwise the
    /// booking runs, `render` turns its result into the response the client
    /// will see, and that response is stored under `key` before it is
    /// returned. Losing the store race to a concurrent retry is not an error:
    /// this call still returns its own response, and the winner's is what
    /// later retries replay. The winner need not be the booking's own 201: a
    /// concurrent retry that saw the committed reservation may store its 409
    /// first. Storage faults are rendered but never cached.
    pub async fn book_idempotent<F>(
        &self,
        key: &IdempotencyKey,
        request: BookingRequest,
        render: F,
    ) -> Outcome
    where
        F: FnOnce(&Result<Reservation, EngineError>) -> StoredResponse + Send,
    {
        if let Some(stored) = self.idempotency.lookup(key) {
            metrics::counter!(observability::IDEMPOTENCY_REPLAYS_TOTAL).increment(1);
            debug!(%key, "replaying stored response");
            return Outcome::Replayed(stored);
        }

        let result = self.book(request).await;
        let response = render(&result);
        if matches!(result, Err(EngineError::StorageUnavailable(_))) {
            return Outcome::Fresh(response);
        }

        match self.idempotency.store(key, response.clone()).await {
            Ok(()) => {}
            Err(EngineError::AlreadyExists(_)) => {
                metrics::counter!(observability::IDEMPOTENCY_STORE_RACES_TOTAL).increment(1);
                debug!(%key, "concurrent retry stored first; returning own response");
            }
            Err(e) => warn!(%key, "response not cached: {e}"),
        }
        Outcome::Fresh(response)
    }
}
