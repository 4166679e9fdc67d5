//! Core data types shared across Cerberus bouncer components.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A verdict kind, ordered by remediation severity.
///
/// The derived `Ord` implementation is the engine's single source of
/// truth for priority: `Bypass < Captcha < Ban`, so `Ord::max` over a
/// set of tuples picks the most severe verdict without a separate
/// lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    /// The sentinel "clean" verdict.
    Bypass,
    /// Challenge the requester with a CAPTCHA.
    Captcha,
    /// Deny access outright.
    Ban,
}

impl VerdictKind {
    /// Numeric priority, purely for logging/serialization; ordering
    /// decisions should use the `Ord` impl directly.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Bypass => 0,
            Self::Captcha => 1,
            Self::Ban => 2,
        }
    }

    /// Parse a LAPI decision `type` string, coercing unknown kinds to the
    /// configured fallback instead of failing.
    pub fn from_lapi_str(raw: &str, fallback: VerdictKind) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "ban" => Self::Ban,
            "captcha" => Self::Captcha,
            "bypass" => Self::Bypass,
            _ => fallback,
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bypass => "bypass",
            Self::Captcha => "captcha",
            Self::Ban => "ban",
        };
        f.write_str(s)
    }
}

/// The addressing domain of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Ip,
    Range,
    Country,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ip => "ip",
            Self::Range => "range",
            Self::Country => "country",
        };
        f.write_str(s)
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "range" => Ok(Self::Range),
            "country" => Ok(Self::Country),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// An immutable decision as produced by LAPI.
///
/// Decisions are keyed by `id`; re-delivering the same `id` updates the
/// entry in place rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,

    #[serde(rename = "type")]
    pub kind_raw: String,

    pub scope: String,
    pub value: String,
    pub duration: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ip: Option<String>,
}

/// One tuple inside a decision cache entry's ordered sequence.
///
/// Sequences of these are kept sorted by descending `VerdictKind`
/// priority (stable on ties) as the cache-entry invariants require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTuple {
    pub kind: VerdictKind,
    pub expiry_unix: i64,
    pub decision_id: i64,
}

impl DecisionTuple {
    pub fn new(kind: VerdictKind, expiry_unix: i64, decision_id: i64) -> Self {
        Self {
            kind,
            expiry_unix,
            decision_id,
        }
    }

    /// Tie-break ordering for equal-priority tuples: later expiry wins,
    /// then larger decision id.
    pub fn resolution_order(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then(self.expiry_unix.cmp(&other.expiry_unix))
            .then(self.decision_id.cmp(&other.decision_id))
    }
}

/// Operator-configured cap on the maximum verdict the resolver may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BouncingLevel {
    Disabled,
    Flex,
    Normal,
}

impl BouncingLevel {
    /// The verdict ceiling this level enforces. Capping only ever lowers
    /// a verdict, never raises one.
    pub fn cap(&self) -> VerdictKind {
        match self {
            Self::Disabled => VerdictKind::Bypass,
            Self::Flex => VerdictKind::Captcha,
            Self::Normal => VerdictKind::Ban,
        }
    }

    pub fn apply(&self, verdict: VerdictKind) -> VerdictKind {
        verdict.min(self.cap())
    }
}

/// Whether the cache is queried-through (LIVE) or treated as sole truth
/// and refreshed out-of-band (STREAM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Live,
    Stream,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Stream => "stream",
        }
    }
}

/// Process exit codes for the standalone driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 2,
    BackendUnreachable = 3,
    Busy = 4,
}
