//! Shared constants for the bouncer's crates.

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default HTTP listen address for the standalone remediation server.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default LAPI base URL.
pub const DEFAULT_LAPI_URL: &str = "http://127.0.0.1:8080";

/// LAPI request timeout, in milliseconds.
pub const DEFAULT_LAPI_TIMEOUT_MS: u64 = 1000;

/// LIVE-mode cache TTL for a clean (no decision) IP, in seconds.
pub const LIVE_CLEAN_IP_CACHE_DURATION_SECS: i64 = 60;

/// LIVE-mode cache TTL floor for a bad (decision-bearing) IP, in seconds.
pub const LIVE_BAD_IP_CACHE_DURATION_SECS: i64 = 120;

/// CAPTCHA flow cache TTL, in seconds (1 day).
pub const CAPTCHA_CACHE_DURATION_SECS: i64 = 86_400;

/// GeoIP lookup cache TTL, in seconds (1 day).
pub const GEOLOCATION_CACHE_DURATION_SECS: i64 = 86_400;

/// STREAM-mode TTL applied to an IP confirmed clean by a full pull, in
/// seconds (10 years), rather than an "until next sync" scheme: a long
/// fixed TTL means a crashed synchroniser fails open instead of
/// re-banning stale entries forever.
pub const STREAM_CLEAN_IP_CACHE_DURATION_SECS: i64 = 315_360_000;

/// Minimum interval between STREAM pulls, in seconds.
pub const DEFAULT_STREAM_REFRESH_INTERVAL_SECS: u64 = 10;

/// CAPTCHA passport cookie/cache validity once solved, in seconds (15 min).
pub const DEFAULT_CAPTCHA_RESOLUTION_TTL_SECS: i64 = 900;

/// Cache key prefixes used by every backend implementation.
pub mod cache_keys {
    /// Decision entry: `{prefix}ip:{ip}` / `{prefix}range:{cidr}` / `{prefix}country:{iso}`.
    pub const DECISION_PREFIX: &str = "cerberus_bouncer:decision:";

    /// CAPTCHA flow state for a given IP: `{prefix}{ip}`.
    pub const CAPTCHA_PREFIX: &str = "cerberus_bouncer:captcha:";

    /// Cached GeoIP resolution for a given IP: `{prefix}{ip}`.
    pub const GEOLOCATION_PREFIX: &str = "cerberus_bouncer:geo:";

    /// Stream synchroniser metadata (last pull timestamp, warm flag).
    pub const STREAM_STATE_KEY: &str = "cerberus_bouncer:stream:state";

    /// Cache schema version marker, checked on open.
    pub const CACHE_VERSION_KEY: &str = "cerberus_bouncer:cache_version";
}

/// Current on-disk/on-wire cache schema version. Bumped whenever the
/// shape of a cached entry changes incompatibly.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// HTTP header names the forwarded-IP resolver and CAPTCHA flow rely on.
pub mod headers {
    /// Standard proxy-chain header consulted when trusted-proxy
    /// resolution is enabled.
    pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";

    /// Set on a response that requires the client to solve a CAPTCHA.
    pub const X_BOUNCER_VERDICT: &str = "X-Bouncer-Verdict";
}
