//! Common error taxonomy for Cerberus bouncer components.

use thiserror::Error;

/// The error taxonomy shared by every layer of the remediation engine.
///
/// Each variant maps to exactly one of the kinds the engine's design
/// distinguishes: malformed input, fatal configuration problems, cache
/// backend failures, LAPI transport failures, and the handful of
/// bouncer-specific conditions (warm-up, busy sync, stale cache format).
#[derive(Debug, Error)]
pub enum BouncerError {
    /// Malformed IP, unparsable duration, unknown scope.
    #[error("invalid input: {0}")]
    Input(String),

    /// Missing or invalid configuration. Fatal at startup, never at request time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cache backend unreachable or write-refused.
    #[error("storage error: {0}")]
    Storage(String),

    /// Non-2xx response from LAPI.
    #[error("LAPI returned {status}: {body}")]
    Api { status: u16, body: String },

    /// LAPI did not respond within the configured budget.
    #[error("LAPI request timed out after {0}ms")]
    Timeout(u64),

    /// Stream warm-up could not complete.
    #[error("stream warm-up failed: {0}")]
    WarmUp(String),

    /// Concurrent stream synchronisation refused.
    #[error("stream synchroniser busy")]
    Busy,

    /// Persisted cache format mismatch.
    #[error("cache version mismatch: {0}")]
    CacheVersion(String),
}

impl BouncerError {
    /// Returns the HTTP status code a host adapter should surface for this
    /// error if it escapes the pipeline boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input(_) => 400,
            Self::Config(_) => 500,
            Self::Storage(_) => 503,
            Self::Api { .. } => 502,
            Self::Timeout(_) => 504,
            Self::WarmUp(_) => 503,
            Self::Busy => 409,
            Self::CacheVersion(_) => 500,
        }
    }

    /// True for errors that a LIVE-mode miss should degrade to `bypass`
    /// rather than fail the request.
    pub fn degrades_to_bypass(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Storage(_))
    }
}
