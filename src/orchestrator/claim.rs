// ABOUTME: Running marker that serializes attempts for the same (artifact, segment) pair.
// ABOUTME: Claimed by compare-and-swap in the store; released explicitly when the attempt ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::{ClaimOutcome, LifecycleStore, SegmentKey, StoreError};
use crate::types::AttemptId;

use super::OrchestratorError;

/// Who holds a pair and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningMarker {
    pub attempt_id: AttemptId,
    /// Hostname of the process running the attempt.
    pub holder: String,
    pub pid: u32,
    pub claimed_at: DateTime<Utc>,
}

impl RunningMarker {
    /// Marker for an attempt run by this process.
    pub fn new(attempt_id: AttemptId) -> Self {
        Self {
            attempt_id,
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            claimed_at: Utc::now(),
        }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.claimed_at
    }
}

/// A held running marker. Must be released with [`RunningClaim::release`];
/// dropping it leaves the marker in the store.
pub struct RunningClaim {
    store: Arc<dyn LifecycleStore>,
    key: SegmentKey,
    marker: RunningMarker,
    released: bool,
}

impl std::fmt::Debug for RunningClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningClaim")
            .field("key", &self.key)
            .field("attempt", &self.marker.attempt_id)
            .finish()
    }
}

impl RunningClaim {
    /// Claim `key` for `attempt_id`, or report who holds it.
    pub async fn acquire(
        store: Arc<dyn LifecycleStore>,
        key: SegmentKey,
        attempt_id: AttemptId,
    ) -> Result<Self, OrchestratorError> {
        let marker = RunningMarker::new(attempt_id);

        match store.claim_running(&key, &marker).await? {
            ClaimOutcome::Claimed => {
                tracing::debug!(%key, attempt = %marker.attempt_id, "running marker claimed");
                Ok(Self {
                    store,
                    key,
                    marker,
                    released: false,
                })
            }
            ClaimOutcome::Held(holder) => {
                tracing::debug!(
                    %key,
                    holder = %holder.attempt_id,
                    host = %holder.holder,
                    pid = holder.pid,
                    age_secs = holder.age().num_seconds(),
                    "running marker already held"
                );
                Err(OrchestratorError::AlreadyRunning { key, holder })
            }
        }
    }

    pub fn key(&self) -> &SegmentKey {
        &self.key
    }

    pub fn marker(&self) -> &RunningMarker {
        &self.marker
    }

    pub async fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        let removed = self
            .store
            .release_running(&self.key, &self.marker.attempt_id)
            .await?;
        if !removed {
            tracing::warn!(key = %self.key, attempt = %self.marker.attempt_id, "running marker was already gone");
        }
        Ok(())
    }

    /// Leave the marker in the store on purpose so the pair stays blocked
    /// until an operator clears it.
    pub fn keep(mut self) {
        self.released = true;
        tracing::error!(
            key = %self.key,
            attempt = %self.marker.attempt_id,
            "running marker kept; the pair is blocked until cleared"
        );
    }
}

impl Drop for RunningClaim {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                key = %self.key,
                attempt = %self.marker.attempt_id,
                "running marker dropped without release; the pair stays blocked"
            );
        }
    }
}
