//! Application state and shared resources: wires the `bouncer-core`
//! collaborators (cache store, decision index, resolver, CAPTCHA flow,
//! stream synchroniser) into one shared handle, built once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bouncer_core::cache::file::FileBackend;
use bouncer_core::cache::memcached::MemcachedBackend;
use bouncer_core::cache::redis_backend::RedisBackend;
use bouncer_core::cache::{CacheBackend, CacheStore};
use bouncer_core::captcha::CaptchaFlow;
use bouncer_core::config::{CacheSystem, LapiAuth as ConfigLapiAuth};
use bouncer_core::decisions::DecisionIndex;
use bouncer_core::geo::{GeoLocator, MaxMindGeoLocator, NoopGeoLocator};
use bouncer_core::lapi::{CurlStyleTransport, LapiAuth, LapiTransport, ReqwestTransport};
use bouncer_core::pipeline::BouncerPipeline;
use bouncer_core::resolver::Resolver;
use bouncer_core::stream::StreamSynchroniser;
use ipnet::IpNet;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Arc<BouncerPipeline>,
    pub stream: Arc<StreamSynchroniser>,
    pub decision_store: Arc<CacheStore>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let decision_store = Arc::new(open_cache_store(&config).await?);
        let geo_store = decision_store.clone();

        let decisions = Arc::new(DecisionIndex::new(decision_store.clone()));
        let geo: Arc<dyn GeoLocator> = if config.bouncer.geolocation.enabled {
            let path = config
                .bouncer
                .geolocation
                .database_path
                .as_ref()
                .context("geolocation.database_path required when geolocation.enabled")?;
            Arc::new(
                MaxMindGeoLocator::open(path)
                    .context("failed to open GeoIP database")?,
            )
        } else {
            Arc::new(NoopGeoLocator)
        };

        let lapi = build_lapi_transport(&config)?;

        let resolver = Resolver::new(
            decisions.clone(),
            geo_store,
            lapi.clone(),
            geo,
            config.bouncer.operating_mode,
            config.bouncer.geolocation.enabled,
            config.bouncer.clean_ip_cache_duration_secs,
            config.bouncer.geolocation_cache_duration_secs,
            config.bouncer.bouncing_level,
            config.bouncer.fallback_remediation,
        );

        let captcha = CaptchaFlow::new(decision_store.clone(), config.bouncer.captcha_cache_duration_secs);

        let trust_ranges: Vec<IpNet> = config.bouncer.trust_ip_forward_array.clone();
        let forced_test_ip = match &config.bouncer.forced_test_ip {
            Some(raw) => Some(
                raw.parse()
                    .context("forced_test_ip is not a valid IP address")?,
            ),
            None => None,
        };

        let pipeline = Arc::new(BouncerPipeline::new(
            resolver,
            captcha,
            trust_ranges,
            config.bouncer.excluded_uris.clone(),
            forced_test_ip,
            config.bouncer.forced_test_forwarded_ip_disabled,
            config.bouncer.display_errors,
        ));

        let stream = Arc::new(StreamSynchroniser::new(
            decisions,
            decision_store.clone(),
            lapi,
        ));

        Ok(Self {
            config,
            pipeline,
            stream,
            decision_store,
        })
    }

    pub fn stream_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config.bouncer.stream_refresh_interval_secs)
    }

    pub async fn is_ready(&self) -> bool {
        self.decision_store.has("cerberus_bouncer:cache_version").await.is_ok()
    }
}

async fn open_cache_store(config: &AppConfig) -> Result<CacheStore> {
    let backend: Box<dyn CacheBackend> = match config.bouncer.cache_system {
        CacheSystem::Phpfs => {
            let path = config
                .bouncer
                .fs_cache_path
                .clone()
                .context("fs_cache_path required for cache_system=phpfs")?;
            Box::new(FileBackend::new(path))
        }
        CacheSystem::Redis => {
            let dsn = config
                .bouncer
                .redis_dsn
                .clone()
                .context("redis_dsn required for cache_system=redis")?;
            Box::new(
                RedisBackend::connect(&dsn)
                    .await
                    .context("failed to connect to redis")?,
            )
        }
        CacheSystem::Memcached => {
            let dsn = config
                .bouncer
                .memcached_dsn
                .clone()
                .context("memcached_dsn required for cache_system=memcached")?;
            Box::new(MemcachedBackend::connect(&dsn).context("failed to connect to memcached")?)
        }
    };
    Ok(CacheStore::new(backend))
}

fn build_lapi_transport(config: &AppConfig) -> Result<Arc<dyn LapiTransport>> {
    let Some(auth) = &config.bouncer.lapi_auth else {
        bail!("one of api_key or tls_* must be configured");
    };

    let core_auth = match auth {
        ConfigLapiAuth::ApiKey(key) => LapiAuth::ApiKey(key),
        ConfigLapiAuth::Mtls {
            cert_path,
            key_path,
            ca_cert_path,
            verify_peer,
        } => LapiAuth::Mtls {
            cert_path,
            key_path,
            ca_cert_path,
            verify_peer: *verify_peer,
        },
    };

    let timeout = Duration::from_millis(config.bouncer.api_timeout_ms);

    if config.bouncer.use_curl {
        Ok(Arc::new(CurlStyleTransport::new(
            config.bouncer.api_url.clone(),
            &config.bouncer.api_user_agent,
            timeout,
            core_auth,
        )?))
    } else {
        Ok(Arc::new(ReqwestTransport::new(
            config.bouncer.api_url.clone(),
            &config.bouncer.api_user_agent,
            timeout,
            core_auth,
        )?))
    }
}
