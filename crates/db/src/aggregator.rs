//! Atomic merging of batch ranges into stored range summaries.
//!
//! Each key is merged with its own read-modify-CAS loop; keys of one batch
//! merge concurrently and never wait on each other. Two requests touching
//! the same key serialize through the version check: the loser reloads and
//! merges on top of the winner's summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use posematch_core::range::{BatchRange, RangeKey, RangeSummary};

use crate::store::{PlayStore, StoreError};

/// Attempts per key before a merge gives up.
pub const MAX_CAS_ATTEMPTS: u32 = 25;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Range {key} still contended after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

#[derive(Clone)]
pub struct RangeAggregator {
    store: Arc<dyn PlayStore>,
    max_attempts: u32,
}

impl RangeAggregator {
    pub fn new(store: Arc<dyn PlayStore>) -> Self {
        Self {
            store,
            max_attempts: MAX_CAS_ATTEMPTS,
        }
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Merge every key of a folded batch. Returns the number of keys updated.
    pub async fn merge_batch(
        &self,
        play_id: &str,
        ranges: &BTreeMap<RangeKey, BatchRange>,
    ) -> Result<usize, AggregateError> {
        let merges = ranges
            .iter()
            .map(|(key, batch)| self.merge_key(play_id, key, batch));
        let merged = try_join_all(merges).await?;
        Ok(merged.len())
    }

    /// Read, merge and compare-and-set one key until the write lands.
    pub async fn merge_key(
        &self,
        play_id: &str,
        key: &RangeKey,
        batch: &BatchRange,
    ) -> Result<RangeSummary, AggregateError> {
        for attempt in 1..=self.max_attempts {
            let current = self.store.get_range(play_id, key).await?;
            let merged = RangeSummary::merged(current.as_ref().map(|v| &v.data), batch, Utc::now());
            let expected = current.map(|v| v.version);

            if self
                .store
                .compare_and_set_range(play_id, key, expected, &merged)
                .await?
            {
                if attempt > 1 {
                    tracing::debug!(play_id, key = %key.path(), attempt, "Range merged after retry");
                }
                return Ok(merged);
            }
            tracing::trace!(play_id, key = %key.path(), attempt, "Range version conflict");
            tokio::task::yield_now().await;
        }

        tracing::warn!(
            play_id,
            key = %key.path(),
            attempts = self.max_attempts,
            "Range merge gave up under contention"
        );
        Err(AggregateError::Contention {
            key: key.path(),
            attempts: self.max_attempts,
        })
    }
}
