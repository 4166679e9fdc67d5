//! Decision index: maps a scoped key to an ordered multiset of active
//! decisions, merging on insert and expiring lazily.
//!
//! Ranged decisions are keyed by CIDR uniformly for both IPv4 and IPv6,
//! never expanded into per-address entries. Range lookup keeps an
//! in-process `Vec<(IpNet, String)>` index, rebuilt from the backing
//! store's `remediation`-tagged entries, and scanned linearly by the
//! resolver — an explicit O(n) trade-off favoring simplicity over a
//! real interval tree, recorded in DESIGN.md.

use std::str::FromStr;
use std::sync::Arc;

use cerberus_common::error::BouncerError;
use cerberus_common::types::{Decision, DecisionTuple, Scope, VerdictKind};
use ipnet::IpNet;
use tokio::sync::RwLock;

use crate::cache::CacheStore;
use crate::verdict::{parse_duration, sort_by_priority};

/// Tag applied to every decision cache entry, used for `clear_by_tag`.
pub const REMEDIATION_TAG: &str = "remediation";

pub fn scoped_key(scope: Scope, value: &str) -> String {
    format!("{scope}_{value}")
}

pub struct DecisionIndex {
    store: Arc<CacheStore>,
    range_index: RwLock<Vec<(IpNet, String)>>,
}

impl DecisionIndex {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            range_index: RwLock::new(Vec::new()),
        }
    }

    /// Returns the current highest-priority tuple for `key`, if any,
    /// without mutating the entry. Used by the Resolver's read path.
    pub async fn peek_highest(&self, key: &str) -> Result<Option<DecisionTuple>, BouncerError> {
        Ok(self.load_sequence(key).await?.into_iter().next())
    }

    async fn load_sequence(&self, key: &str) -> Result<Vec<DecisionTuple>, BouncerError> {
        let (hit, raw) = self.store.get(key).await?;
        if !hit {
            return Ok(Vec::new());
        }
        let raw = raw.unwrap_or_default();
        let seq: Vec<DecisionTuple> =
            serde_json::from_slice(&raw).map_err(|e| BouncerError::CacheVersion(e.to_string()))?;
        // Lazy expiry: a tuple surviving past its own `expiry_unix` must
        // never be served, even if the entry's backend TTL (the max
        // across members) hasn't elapsed yet.
        let now = now_unix();
        Ok(seq.into_iter().filter(|t| t.expiry_unix > now).collect())
    }

    async fn save_sequence(&self, key: &str, seq: &[DecisionTuple]) -> Result<(), BouncerError> {
        if seq.is_empty() {
            self.store.delete(key.to_string()).await?;
        } else {
            let max_expiry = seq.iter().map(|t| t.expiry_unix).max().unwrap_or(0);
            // `expiry_unix` is an absolute timestamp; the backend wants a
            // TTL relative to now.
            let ttl_secs = (max_expiry - now_unix()).max(1);
            let value = serde_json::to_vec(seq).map_err(|e| BouncerError::Storage(e.to_string()))?;
            self.store
                .put(key.to_string(), value, ttl_secs, vec![REMEDIATION_TAG.to_string()])
                .await?;
        }
        self.store.commit().await?;
        Ok(())
    }

    /// Merges a decision into the scoped key's tuple set, replacing any
    /// existing tuple with the same decision id and re-sorting by
    /// resolution order.
    pub async fn upsert_decision(
        &self,
        scoped_key: &str,
        kind: VerdictKind,
        expiry_unix: i64,
        decision_id: i64,
    ) -> Result<VerdictKind, BouncerError> {
        let mut seq = self.load_sequence(scoped_key).await?;

        // I2: drop any bypass sentinel once a real decision lands.
        seq.retain(|t| t.kind != VerdictKind::Bypass);
        // I1: idempotent re-insert — drop any prior tuple for this id.
        seq.retain(|t| t.decision_id != decision_id);
        seq.push(DecisionTuple::new(kind, expiry_unix, decision_id));

        // I3: sorted by priority (descending), ties broken inside sort_by_priority.
        let seq = sort_by_priority(seq, |t| t.kind);

        self.save_sequence(scoped_key, &seq).await?;
        self.maybe_index_range(scoped_key).await;

        Ok(seq[0].kind)
    }

    /// `removeDecision`: returns `true` iff a tuple was actually present.
    pub async fn remove_decision(
        &self,
        scoped_key: &str,
        decision_id: i64,
    ) -> Result<bool, BouncerError> {
        let mut seq = self.load_sequence(scoped_key).await?;
        let before = seq.len();
        seq.retain(|t| t.decision_id != decision_id);
        if seq.len() == before {
            return Ok(false);
        }
        let seq = sort_by_priority(seq, |t| t.kind);
        self.save_sequence(scoped_key, &seq).await?;
        if seq.is_empty() {
            self.unindex_range(scoped_key).await;
        }
        Ok(true)
    }

    /// Applies a stream diff: deletes first (stale deletes are normal
    /// no-ops), then adds.
    pub async fn bulk_apply(
        &self,
        adds: &[Decision],
        deletes: &[Decision],
    ) -> Result<(), BouncerError> {
        for d in deletes {
            let key = scoped_key(Scope::from_str(&d.scope).map_err(BouncerError::Input)?, &d.value);
            self.remove_decision(&key, d.id).await?;
        }
        for d in adds {
            let scope = Scope::from_str(&d.scope).map_err(BouncerError::Input)?;
            let key = scoped_key(scope, &d.value);
            let kind = VerdictKind::from_lapi_str(&d.kind_raw, VerdictKind::Captcha);
            let duration = parse_duration(&d.duration)?;
            let expiry = now_unix() + duration;
            self.upsert_decision(&key, kind, expiry, d.id).await?;
        }
        Ok(())
    }

    async fn maybe_index_range(&self, scoped_key: &str) {
        if let Some(cidr) = scoped_key.strip_prefix("range_") {
            if let Ok(net) = cidr.parse::<IpNet>() {
                let mut idx = self.range_index.write().await;
                if !idx.iter().any(|(_, k)| k == scoped_key) {
                    idx.push((net, scoped_key.to_string()));
                }
            }
        }
    }

    async fn unindex_range(&self, scoped_key: &str) {
        let mut idx = self.range_index.write().await;
        idx.retain(|(_, k)| k != scoped_key);
    }

    /// Linear scan over CIDR entries containing `ip`, for the
    /// resolver's range-scope lookup.
    pub async fn ranges_containing(&self, ip: std::net::IpAddr) -> Vec<String> {
        self.range_index
            .read()
            .await
            .iter()
            .filter(|(net, _)| net.contains(&ip))
            .map(|(_, key)| key.clone())
            .collect()
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::file::FileBackend;

    fn temp_store() -> Arc<CacheStore> {
        let dir = std::env::temp_dir().join(format!("bouncer-test-{}", rand::random::<u64>()));
        Arc::new(CacheStore::new(Box::new(FileBackend::new(dir))))
    }

    #[tokio::test]
    async fn upsert_then_remove_restores_empty_state() {
        let index = DecisionIndex::new(temp_store());
        let key = scoped_key(Scope::Ip, "1.2.3.4");

        index
            .upsert_decision(&key, VerdictKind::Ban, now_unix() + 3600, 1)
            .await
            .unwrap();
        assert!(index.remove_decision(&key, 1).await.unwrap());
        assert!(!index.remove_decision(&key, 1).await.unwrap());

        let seq = index.load_sequence(&key).await.unwrap();
        assert!(seq.is_empty());
    }

    #[tokio::test]
    async fn bypass_sentinel_is_dropped_once_real_decision_lands() {
        let index = DecisionIndex::new(temp_store());
        let key = scoped_key(Scope::Ip, "5.6.7.8");

        index
            .upsert_decision(&key, VerdictKind::Bypass, now_unix() + 60, 0)
            .await
            .unwrap();
        let highest = index
            .upsert_decision(&key, VerdictKind::Ban, now_unix() + 3600, 2)
            .await
            .unwrap();

        assert_eq!(highest, VerdictKind::Ban);
        let seq = index.load_sequence(&key).await.unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].kind, VerdictKind::Ban);
    }

    #[tokio::test]
    async fn expired_tuple_is_not_served() {
        let index = DecisionIndex::new(temp_store());
        let key = scoped_key(Scope::Ip, "9.9.9.9");

        // expiry already in the past: the entry's backend TTL (clamped
        // to a minimum of 1s) hasn't necessarily elapsed, but the tuple
        // itself must no longer be served.
        index
            .upsert_decision(&key, VerdictKind::Ban, now_unix() - 10, 7)
            .await
            .unwrap();

        assert_eq!(index.peek_highest(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn range_index_tracks_containment() {
        let index = DecisionIndex::new(temp_store());
        let key = scoped_key(Scope::Range, "10.0.0.0/24");
        index
            .upsert_decision(&key, VerdictKind::Ban, now_unix() + 3600, 9)
            .await
            .unwrap();

        let hits = index.ranges_containing("10.0.0.42".parse().unwrap()).await;
        assert_eq!(hits, vec![key]);
    }
}
