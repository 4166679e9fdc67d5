//! Domain configuration for the remediation engine.
//!
//! This is the library's own config shape, deserializable on its own;
//! the `bouncer-fortify` binary layers file/env/CLI sources on top of
//! it via `config::Config`.

use std::path::PathBuf;

use cerberus_common::constants::{
    CAPTCHA_CACHE_DURATION_SECS, DEFAULT_LAPI_TIMEOUT_MS, DEFAULT_LAPI_URL,
    GEOLOCATION_CACHE_DURATION_SECS, LIVE_BAD_IP_CACHE_DURATION_SECS,
    LIVE_CLEAN_IP_CACHE_DURATION_SECS,
};
use cerberus_common::types::{BouncingLevel, OperatingMode, VerdictKind};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Which Cache Store backend to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSystem {
    /// Sharded directory of files, the only backend implementing `prune`.
    Phpfs,
    Redis,
    Memcached,
}

/// MaxMind geolocation sub-configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_database_type")]
    pub database_type: String,

    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub save_result: bool,

    #[serde(default = "default_geolocation_cache_duration")]
    pub cache_duration_secs: i64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_type: default_database_type(),
            database_path: None,
            save_result: true,
            cache_duration_secs: default_geolocation_cache_duration(),
        }
    }
}

/// LAPI authentication method. Exactly one is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapiAuth {
    ApiKey(String),
    Mtls {
        cert_path: PathBuf,
        key_path: PathBuf,
        ca_cert_path: PathBuf,
        #[serde(default = "default_true")]
        verify_peer: bool,
    },
}

/// Full bouncer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BouncerConfig {
    #[serde(default = "default_cache_system")]
    pub cache_system: CacheSystem,

    #[serde(default)]
    pub fs_cache_path: Option<PathBuf>,

    #[serde(default)]
    pub redis_dsn: Option<String>,

    #[serde(default)]
    pub memcached_dsn: Option<String>,

    #[serde(default = "default_operating_mode")]
    pub operating_mode: OperatingMode,

    #[serde(default = "default_clean_ip_cache_duration")]
    pub clean_ip_cache_duration_secs: i64,

    #[serde(default = "default_bad_ip_cache_duration")]
    pub bad_ip_cache_duration_secs: i64,

    #[serde(default = "default_captcha_cache_duration")]
    pub captcha_cache_duration_secs: i64,

    #[serde(default = "default_geolocation_cache_duration")]
    pub geolocation_cache_duration_secs: i64,

    #[serde(default = "default_fallback_remediation")]
    pub fallback_remediation: VerdictKind,

    #[serde(default = "default_bouncing_level")]
    pub bouncing_level: BouncingLevel,

    #[serde(default)]
    pub trust_ip_forward_array: Vec<IpNet>,

    #[serde(default)]
    pub excluded_uris: Vec<String>,

    #[serde(default)]
    pub forced_test_ip: Option<String>,

    #[serde(default)]
    pub forced_test_forwarded_ip_disabled: bool,

    #[serde(default)]
    pub geolocation: GeolocationConfig,

    #[serde(default)]
    pub lapi_auth: Option<LapiAuth>,

    #[serde(default = "default_lapi_url")]
    pub api_url: String,

    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub api_user_agent: String,

    #[serde(default)]
    pub use_curl: bool,

    #[serde(default)]
    pub display_errors: bool,

    #[serde(default = "default_stream_refresh_interval")]
    pub stream_refresh_interval_secs: u64,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            cache_system: default_cache_system(),
            fs_cache_path: None,
            redis_dsn: None,
            memcached_dsn: None,
            operating_mode: default_operating_mode(),
            clean_ip_cache_duration_secs: default_clean_ip_cache_duration(),
            bad_ip_cache_duration_secs: default_bad_ip_cache_duration(),
            captcha_cache_duration_secs: default_captcha_cache_duration(),
            geolocation_cache_duration_secs: default_geolocation_cache_duration(),
            fallback_remediation: default_fallback_remediation(),
            bouncing_level: default_bouncing_level(),
            trust_ip_forward_array: Vec::new(),
            excluded_uris: Vec::new(),
            forced_test_ip: None,
            forced_test_forwarded_ip_disabled: false,
            geolocation: GeolocationConfig::default(),
            lapi_auth: None,
            api_url: default_lapi_url(),
            api_timeout_ms: default_api_timeout_ms(),
            api_user_agent: default_user_agent(),
            use_curl: false,
            display_errors: false,
            stream_refresh_interval_secs: default_stream_refresh_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_system() -> CacheSystem {
    CacheSystem::Phpfs
}
fn default_operating_mode() -> OperatingMode {
    OperatingMode::Live
}
fn default_clean_ip_cache_duration() -> i64 {
    LIVE_CLEAN_IP_CACHE_DURATION_SECS
}
fn default_bad_ip_cache_duration() -> i64 {
    LIVE_BAD_IP_CACHE_DURATION_SECS
}
fn default_captcha_cache_duration() -> i64 {
    CAPTCHA_CACHE_DURATION_SECS
}
fn default_geolocation_cache_duration() -> i64 {
    GEOLOCATION_CACHE_DURATION_SECS
}
fn default_fallback_remediation() -> VerdictKind {
    VerdictKind::Captcha
}
fn default_bouncing_level() -> BouncingLevel {
    BouncingLevel::Normal
}
fn default_database_type() -> String {
    "GeoLite2-Country".to_string()
}
fn default_lapi_url() -> String {
    DEFAULT_LAPI_URL.to_string()
}
fn default_api_timeout_ms() -> u64 {
    DEFAULT_LAPI_TIMEOUT_MS
}
fn default_user_agent() -> String {
    format!("cerberus-bouncer/{}", env!("CARGO_PKG_VERSION"))
}
fn default_stream_refresh_interval() -> u64 {
    cerberus_common::constants::DEFAULT_STREAM_REFRESH_INTERVAL_SECS
}

impl BouncerConfig {
    /// Validates the configuration, failing fast: `ConfigError` is fatal
    /// at startup, never at request time.
    pub fn validate(&self) -> Result<(), cerberus_common::error::BouncerError> {
        use cerberus_common::error::BouncerError;

        match self.cache_system {
            CacheSystem::Phpfs if self.fs_cache_path.is_none() => {
                return Err(BouncerError::Config(
                    "fs_cache_path is required for cache_system=phpfs".into(),
                ));
            }
            CacheSystem::Redis if self.redis_dsn.is_none() => {
                return Err(BouncerError::Config(
                    "redis_dsn is required for cache_system=redis".into(),
                ));
            }
            CacheSystem::Memcached if self.memcached_dsn.is_none() => {
                return Err(BouncerError::Config(
                    "memcached_dsn is required for cache_system=memcached".into(),
                ));
            }
            _ => {}
        }

        if self.lapi_auth.is_none() {
            return Err(BouncerError::Config(
                "one of api_key or tls_* must be configured".into(),
            ));
        }

        if self.geolocation.enabled && self.geolocation.database_path.is_none() {
            return Err(BouncerError::Config(
                "geolocation.database_path is required when geolocation.enabled".into(),
            ));
        }

        Ok(())
    }
}
