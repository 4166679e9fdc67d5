//! Stream synchroniser: warm-up and periodic diff-pull driver, state
//! machine `Cold → WarmingUp → Warm → Updating → Warm`. Single-flight
//! is enforced by a mutex-guarded `try_lock` check, returning
//! `BusyError` immediately on contention rather than queueing.
//!
//! STREAM-mode clean-IP entries use a literal `315_360_000`-second TTL
//! (10 years) rather than "until next sync" semantics — simpler to
//! reason about and there's no hard requirement for the alternative.

use std::sync::Arc;
use std::time::Duration;

use cerberus_common::constants::cache_keys::STREAM_STATE_KEY;
use cerberus_common::error::BouncerError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::decisions::DecisionIndex;
use crate::lapi::LapiTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Cold,
    WarmingUp,
    Warm,
    Updating,
}

#[derive(Serialize, Deserialize, Default)]
struct WarmFlag {
    warmed_up: bool,
}

/// Counts returned by `refresh()`.
#[derive(Debug, Clone, Copy)]
pub struct StreamDiffCounts {
    pub deleted: usize,
    pub new: usize,
}

pub struct StreamSynchroniser {
    decisions: Arc<DecisionIndex>,
    store: Arc<CacheStore>,
    lapi: Arc<dyn LapiTransport>,
    state: Mutex<SyncState>,
}

impl StreamSynchroniser {
    pub fn new(decisions: Arc<DecisionIndex>, store: Arc<CacheStore>, lapi: Arc<dyn LapiTransport>) -> Self {
        Self {
            decisions,
            store,
            lapi,
            state: Mutex::new(SyncState::Cold),
        }
    }

    async fn is_warmed_up(&self) -> Result<bool, BouncerError> {
        let (hit, raw) = self.store.get(STREAM_STATE_KEY).await?;
        if !hit {
            return Ok(false);
        }
        let flag: WarmFlag = serde_json::from_slice(&raw.unwrap_or_default())
            .map_err(|e| BouncerError::CacheVersion(e.to_string()))?;
        Ok(flag.warmed_up)
    }

    async fn set_warmed_up(&self, warmed_up: bool) -> Result<(), BouncerError> {
        let value = serde_json::to_vec(&WarmFlag { warmed_up })
            .map_err(|e| BouncerError::Storage(e.to_string()))?;
        self.store.put(STREAM_STATE_KEY, value, i64::MAX, vec![]).await?;
        self.store.commit().await?;
        Ok(())
    }

    /// `warmUp()`: clears any prior cache if already warmed, pulls a
    /// full snapshot, and marks the cache warm on success.
    pub async fn warm_up(&self) -> Result<usize, BouncerError> {
        let mut guard = self.state.try_lock().map_err(|_| BouncerError::Busy)?;
        self.warm_up_locked(&mut guard).await
    }

    async fn warm_up_locked(&self, guard: &mut SyncState) -> Result<usize, BouncerError> {
        if self.is_warmed_up().await? {
            self.store.clear().await?;
        }

        *guard = SyncState::WarmingUp;

        let (new_decisions, _deleted) = self
            .lapi
            .get_streamed_decisions(true)
            .await
            .map_err(|e| BouncerError::WarmUp(e.to_string()))?;
        let count = new_decisions.len();

        if let Err(e) = self.decisions.bulk_apply(&new_decisions, &[]).await {
            // warmed_up stays false; previous successful state (none,
            // since we just cleared) is what's left.
            return Err(BouncerError::WarmUp(e.to_string()));
        }

        self.set_warmed_up(true).await?;
        *guard = SyncState::Warm;
        Ok(count)
    }

    /// `refresh()`: delegates to `warm_up` if not yet warmed; otherwise
    /// applies deletes then adds. No overlapping synchronisation: a
    /// concurrent call observes `BusyError` instead of interleaving.
    pub async fn refresh(&self) -> Result<StreamDiffCounts, BouncerError> {
        let mut guard = self.state.try_lock().map_err(|_| BouncerError::Busy)?;

        if !self.is_warmed_up().await? {
            let new = self.warm_up_locked(&mut guard).await?;
            return Ok(StreamDiffCounts { deleted: 0, new });
        }

        *guard = SyncState::Updating;
        let (adds, deletes) = self
            .lapi
            .get_streamed_decisions(false)
            .await?;
        self.decisions.bulk_apply(&adds, &deletes).await?;
        *guard = SyncState::Warm;

        Ok(StreamDiffCounts {
            deleted: deletes.len(),
            new: adds.len(),
        })
    }
}

/// Background driver: a `tokio::select!` loop with a `shutdown` arm,
/// driving periodic `refresh()` calls.
pub async fn stream_sync_worker(
    sync: Arc<StreamSynchroniser>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "stream synchroniser worker started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match sync.refresh().await {
                    Ok(counts) => {
                        tracing::debug!(new = counts.new, deleted = counts.deleted, "stream refresh complete");
                    }
                    Err(BouncerError::Busy) => {
                        tracing::debug!("stream refresh skipped: synchroniser busy");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stream refresh failed");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("stream synchroniser worker shutting down");
                break;
            }
        }
    }
}
