//! Resolver: given an IP, looks up applicable decisions across the
//! `ip`, `range`, and `country` scopes, computes the highest-priority
//! verdict, and applies the configured bouncing-level cap.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use cerberus_common::error::BouncerError;
use cerberus_common::types::{BouncingLevel, Decision, DecisionTuple, OperatingMode, Scope, VerdictKind};

use crate::cache::CacheStore;
use crate::decisions::{scoped_key, DecisionIndex};
use crate::geo::GeoLocator;
use crate::lapi::{LapiTransport, LiveQuery};
use crate::verdict::parse_duration;

const GEO_TAG: &str = "geolocation";

pub struct Resolver {
    decisions: Arc<DecisionIndex>,
    geo_cache: Arc<CacheStore>,
    lapi: Arc<dyn LapiTransport>,
    geo: Arc<dyn GeoLocator>,
    operating_mode: OperatingMode,
    geolocation_enabled: bool,
    clean_ip_cache_duration_secs: i64,
    geolocation_cache_duration_secs: i64,
    bouncing_level: BouncingLevel,
    fallback_remediation: VerdictKind,
}

impl Resolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        decisions: Arc<DecisionIndex>,
        geo_cache: Arc<CacheStore>,
        lapi: Arc<dyn LapiTransport>,
        geo: Arc<dyn GeoLocator>,
        operating_mode: OperatingMode,
        geolocation_enabled: bool,
        clean_ip_cache_duration_secs: i64,
        geolocation_cache_duration_secs: i64,
        bouncing_level: BouncingLevel,
        fallback_remediation: VerdictKind,
    ) -> Self {
        Self {
            decisions,
            geo_cache,
            lapi,
            geo,
            operating_mode,
            geolocation_enabled,
            clean_ip_cache_duration_secs,
            geolocation_cache_duration_secs,
            bouncing_level,
            fallback_remediation,
        }
    }

    /// `getRemediationForIp`.
    pub async fn get_remediation_for_ip(&self, ip_string: &str) -> Result<VerdictKind, BouncerError> {
        let ip = parse_ip(ip_string)?;
        let ip_key = scoped_key(Scope::Ip, &ip.to_string());

        let mut hits: Vec<DecisionTuple> = Vec::new();
        let mut any_scope_present = false;

        if let Some(tuple) = self.decisions.peek_highest(&ip_key).await? {
            any_scope_present = true;
            hits.push(tuple);
        }

        for key in self.decisions.ranges_containing(ip).await {
            if let Some(tuple) = self.decisions.peek_highest(&key).await? {
                any_scope_present = true;
                hits.push(tuple);
            }
        }

        if self.geolocation_enabled {
            if let Some(country) = self.resolve_country(ip).await {
                let country_key = scoped_key(Scope::Country, &country);
                if let Some(tuple) = self.decisions.peek_highest(&country_key).await? {
                    any_scope_present = true;
                    hits.push(tuple);
                }
            }
        }

        let non_bypass_hit = hits.iter().any(|t| t.kind != VerdictKind::Bypass);

        let verdict = if non_bypass_hit {
            pick_highest(&hits).map(|t| t.kind).unwrap_or(VerdictKind::Bypass)
        } else {
            match self.operating_mode {
                OperatingMode::Stream => VerdictKind::Bypass,
                OperatingMode::Live => self.resolve_live_miss(&ip, &ip_key, any_scope_present).await?,
            }
        };

        Ok(self.bouncing_level.apply(verdict))
    }

    async fn resolve_country(&self, ip: IpAddr) -> Option<String> {
        let geo_key = format!("geo_ip_{ip}");
        if let Ok((true, Some(raw))) = self.geo_cache.get(&geo_key).await {
            if let Ok(cached) = serde_json::from_slice::<String>(&raw) {
                return Some(cached);
            }
        }
        let country = self.geo.country(ip)?;
        let value = serde_json::to_vec(&country).ok()?;
        let _ = self
            .geo_cache
            .put(geo_key, value, self.geolocation_cache_duration_secs, vec![GEO_TAG.to_string()])
            .await;
        let _ = self.geo_cache.commit().await;
        Some(country)
    }

    async fn resolve_live_miss(
        &self,
        ip: &IpAddr,
        ip_key: &str,
        _any_scope_present: bool,
    ) -> Result<VerdictKind, BouncerError> {
        let decisions = match self
            .lapi
            .get_filtered_decisions(LiveQuery::Ip(&ip.to_string()))
            .await
        {
            Ok(decisions) => decisions,
            Err(e) if e.degrades_to_bypass() => {
                tracing::warn!(ip = %ip, error = %e, "LAPI_TIMEOUT");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if decisions.is_empty() {
            let expiry = now_unix() + self.clean_ip_cache_duration_secs;
            self.decisions
                .upsert_decision(ip_key, VerdictKind::Bypass, expiry, 0)
                .await?;
            return Ok(VerdictKind::Bypass);
        }

        let mut highest = VerdictKind::Bypass;
        for d in &decisions {
            highest = highest.max(self.apply_one(d).await?);
        }
        Ok(highest)
    }

    async fn apply_one(&self, d: &Decision) -> Result<VerdictKind, BouncerError> {
        let scope = Scope::from_str(&d.scope).map_err(BouncerError::Input)?;
        let key = scoped_key(scope, &d.value);
        let kind = VerdictKind::from_lapi_str(&d.kind_raw, self.fallback_remediation);
        let duration = parse_duration(&d.duration)?;
        let expiry = now_unix() + duration;
        self.decisions.upsert_decision(&key, kind, expiry, d.id).await
    }
}

fn pick_highest(hits: &[DecisionTuple]) -> Option<DecisionTuple> {
    hits.iter().copied().reduce(|a, b| {
        if a.resolution_order(&b) == std::cmp::Ordering::Less {
            b
        } else {
            a
        }
    })
}

/// Validates and parses an IP, stripping an IPv6 zone-id suffix
/// (`%eth0`) if present.
fn parse_ip(raw: &str) -> Result<IpAddr, BouncerError> {
    let without_zone = raw.split('%').next().unwrap_or(raw);
    IpAddr::from_str(without_zone)
        .map_err(|_| BouncerError::Input(format!("not a valid IP address: {raw}")))
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

    #[test]
    fn strips_ipv6_zone_id() {
        assert!(parse_ip("fe80::1%eth0").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_ip("not-an-ip").is_err());
    }

    #[test]
    fn picks_later_expiry_on_priority_tie() {
        let a = DecisionTuple::new(VerdictKind::Ban, 100, 1);
        let b = DecisionTuple::new(VerdictKind::Ban, 200, 2);
        assert_eq!(pick_highest(&[a, b]), Some(b));
    }
}
