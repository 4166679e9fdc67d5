//! # Bouncer Core
//!
//! The remediation resolution engine: verdict model, tag-aware cache
//! store, decision index, LAPI client, IP resolver, stream
//! synchroniser, forwarded-IP trust resolution, and CAPTCHA state
//! machine, wired together by the request pipeline. Framework-agnostic
//! by design — a host binary supplies the HTTP adapter.
//!
//! ## Modules
//! - `verdict` - verdict ordering and LAPI duration-string grammar
//! - `config` - operator configuration and validation
//! - `cache` - tag-aware deferred-write cache store over pluggable backends
//! - `decisions` - decision index with ordered-set verdict resolution
//! - `geo` - GeoIP country lookup collaborator
//! - `lapi` - Local API client over two transports
//! - `resolver` - per-IP remediation resolution
//! - `stream` - stream synchroniser state machine
//! - `forwarded` - forwarded-IP trust resolution
//! - `captcha` - CAPTCHA challenge/verify state machine
//! - `pipeline` - the per-request entry point

pub mod cache;
pub mod captcha;
pub mod config;
pub mod decisions;
pub mod forwarded;
pub mod geo;
pub mod lapi;
pub mod pipeline;
pub mod resolver;
pub mod stream;
pub mod verdict;

pub use cache::{CacheBackend, CacheStore};
pub use captcha::{CaptchaChallenge, CaptchaFlow, CaptchaOutcome, CaptchaState};
pub use config::BouncerConfig;
pub use decisions::DecisionIndex;
pub use forwarded::{resolve_effective_ip, ForwardedResolution};
pub use geo::GeoLocator;
pub use lapi::LapiTransport;
pub use pipeline::{BouncerOutcome, BouncerPipeline, BouncerRequest};
pub use resolver::Resolver;
pub use stream::{stream_sync_worker, StreamSynchroniser};
