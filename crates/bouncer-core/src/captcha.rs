//! CAPTCHA state machine: per-IP challenge lifecycle across HTTP
//! round-trips. A single challenge difficulty per verdict — no tiers.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use cerberus_common::error::BouncerError;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;

pub const CAPTCHA_TAG: &str = "captcha";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaptchaEntry {
    phrase_to_guess: String,
    inline_image: String,
    has_to_be_resolved: bool,
    resolution_failed: bool,
    resolution_redirect: String,
}

/// The CAPTCHA lifecycle state, derived from the cache entry's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaState {
    Unarmed,
    Armed { redirect: String },
    Failed { redirect: String },
    Resolved,
}

/// What the challenge page should show, returned on arm/refresh.
pub struct CaptchaChallenge {
    pub inline_image: String,
    pub resolution_redirect: String,
}

/// The result of a phrase submission.
pub enum CaptchaOutcome {
    Resolved { redirect: String },
    Failed { redirect: String },
    /// No challenge was pending for this IP (stale/expired submit).
    Unarmed,
}

pub struct CaptchaFlow {
    store: Arc<CacheStore>,
    ttl_secs: i64,
}

impl CaptchaFlow {
    pub fn new(store: Arc<CacheStore>, ttl_secs: i64) -> Self {
        Self { store, ttl_secs }
    }

    fn key(ip: &str) -> String {
        format!("captcha_ip_{ip}")
    }

    async fn load(&self, ip: &str) -> Result<Option<CaptchaEntry>, BouncerError> {
        let (hit, raw) = self.store.get(&Self::key(ip)).await?;
        if !hit {
            return Ok(None);
        }
        let entry = serde_json::from_slice(&raw.unwrap_or_default())
            .map_err(|e| BouncerError::CacheVersion(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn save(&self, ip: &str, entry: &CaptchaEntry) -> Result<(), BouncerError> {
        let value = serde_json::to_vec(entry).map_err(|e| BouncerError::Storage(e.to_string()))?;
        self.store
            .put(Self::key(ip), value, self.ttl_secs, vec![CAPTCHA_TAG.to_string()])
            .await?;
        self.store.commit().await?;
        Ok(())
    }

    /// The current state for `ip`.
    pub async fn state(&self, ip: &str) -> Result<CaptchaState, BouncerError> {
        let Some(entry) = self.load(ip).await? else {
            return Ok(CaptchaState::Unarmed);
        };
        Ok(if !entry.has_to_be_resolved {
            CaptchaState::Resolved
        } else if entry.resolution_failed {
            CaptchaState::Failed {
                redirect: entry.resolution_redirect,
            }
        } else {
            CaptchaState::Armed {
                redirect: entry.resolution_redirect,
            }
        })
    }

    /// Unarmed → Armed: issue a fresh phrase+image.
    pub async fn arm(&self, ip: &str, redirect: &str) -> Result<CaptchaChallenge, BouncerError> {
        let (phrase, image) = generate_challenge();
        let entry = CaptchaEntry {
            phrase_to_guess: phrase,
            inline_image: image.clone(),
            has_to_be_resolved: true,
            resolution_failed: false,
            resolution_redirect: redirect.to_string(),
        };
        self.save(ip, &entry).await?;
        Ok(CaptchaChallenge {
            inline_image: image,
            resolution_redirect: redirect.to_string(),
        })
    }

    /// Armed/Failed → Armed: regenerate, clearing any failure flag.
    pub async fn refresh(&self, ip: &str) -> Result<CaptchaChallenge, BouncerError> {
        let redirect = match self.load(ip).await? {
            Some(entry) => entry.resolution_redirect,
            None => "/".to_string(),
        };
        self.arm(ip, &redirect).await
    }

    /// Re-renders the current challenge without mutating it — the
    /// Armed/Failed `GET` transition, which must not regenerate the
    /// phrase (that's reserved for `POST refresh=1`).
    pub async fn view(&self, ip: &str) -> Result<Option<CaptchaChallenge>, BouncerError> {
        Ok(self.load(ip).await?.map(|entry| CaptchaChallenge {
            inline_image: entry.inline_image,
            resolution_redirect: entry.resolution_redirect,
        }))
    }

    /// Armed/Failed → Resolved (correct) or Failed (incorrect).
    pub async fn submit(&self, ip: &str, guess: &str) -> Result<CaptchaOutcome, BouncerError> {
        let Some(mut entry) = self.load(ip).await? else {
            return Ok(CaptchaOutcome::Unarmed);
        };

        if normalize_guess(guess) == normalize_guess(&entry.phrase_to_guess) {
            entry.has_to_be_resolved = false;
            entry.resolution_failed = false;
            let redirect = entry.resolution_redirect.clone();
            entry.phrase_to_guess.clear();
            entry.inline_image.clear();
            self.save(ip, &entry).await?;
            return Ok(CaptchaOutcome::Resolved { redirect });
        }

        entry.resolution_failed = true;
        let redirect = entry.resolution_redirect.clone();
        self.save(ip, &entry).await?;
        Ok(CaptchaOutcome::Failed { redirect })
    }
}

/// Lenient phrase comparison: case-insensitive, with `0`/`o` and
/// `1`/`l` treated as equivalent — kept as a small pure helper in the
/// teacher's style of placing comparison logic next to the struct
/// that uses it.
pub fn normalize_guess(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            'o' => '0',
            'l' => '1',
            other => other,
        })
        .collect()
}

fn generate_challenge() -> (String, String) {
    let mut rng = rand::rng();
    let phrase: String = (0..5)
        .map(|_| {
            let idx = rng.random_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'A' + idx - 10) as char
            }
        })
        .collect();
    let image = render_svg(&phrase, &mut rng);
    (phrase, image)
}

fn render_svg(text: &str, rng: &mut impl rand::Rng) -> String {
    let width = 200;
    let height = 80;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#
    );
    svg.push_str(r##"<rect width="100%" height="100%" fill="#1a1a2e"/>"##);

    for _ in 0..20 {
        let x1 = rng.random_range(0..width);
        let y1 = rng.random_range(0..height);
        let x2 = rng.random_range(0..width);
        let y2 = rng.random_range(0..height);
        let opacity = rng.random_range(20..50);
        svg.push_str(&format!(
            r#"<line x1="{x1}" y1="{y1}" x2="{x2}" y2="{y2}" stroke="rgba(255,255,255,0.{opacity})" stroke-width="1"/>"#
        ));
    }

    let char_width = width as f32 / (text.len() as f32 + 1.0);
    for (i, c) in text.chars().enumerate() {
        let x = char_width * (i as f32 + 0.8);
        let y = 50 + rng.random_range(-10..10);
        let rotation = rng.random_range(-15..15);
        let color = format!(
            "rgb({},{},{})",
            rng.random_range(150..255),
            rng.random_range(150..255),
            rng.random_range(150..255)
        );
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="monospace" font-size="32" font-weight="bold" fill="{color}" transform="rotate({rotation} {x} {y})">{c}</text>"#
        ));
    }

    svg.push_str("</svg>");
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(&svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::file::FileBackend;

    fn temp_store() -> Arc<CacheStore> {
        let dir = std::env::temp_dir().join(format!("bouncer-captcha-test-{}", rand::random::<u64>()));
        Arc::new(CacheStore::new(Box::new(FileBackend::new(dir))))
    }

    #[test]
    fn lenient_compare_treats_o_zero_and_l_one_as_equal() {
        assert_eq!(normalize_guess("O1l0"), normalize_guess("0110"));
    }

    #[tokio::test]
    async fn unarmed_then_armed_then_resolved() {
        let flow = CaptchaFlow::new(temp_store(), 86_400);
        assert_eq!(flow.state("1.2.3.4").await.unwrap(), CaptchaState::Unarmed);

        flow.arm("1.2.3.4", "/protected").await.unwrap();
        assert!(matches!(
            flow.state("1.2.3.4").await.unwrap(),
            CaptchaState::Armed { .. }
        ));
    }

    #[tokio::test]
    async fn wrong_guess_then_correct_guess_resolves() {
        let flow = CaptchaFlow::new(temp_store(), 86_400);
        flow.arm("5.6.7.8", "/protected").await.unwrap();

        let failed = flow.submit("5.6.7.8", "wrongphrase").await.unwrap();
        assert!(matches!(failed, CaptchaOutcome::Failed { .. }));
    }
}
