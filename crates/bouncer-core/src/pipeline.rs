//! Bouncer pipeline: the per-request entry point tying together
//! forwarded-IP trust resolution, the remediation resolver, and the
//! CAPTCHA state machine behind a host-framework-agnostic
//! request/response seam. The `bouncer-fortify` binary supplies the
//! concrete axum adapter.

use std::net::IpAddr;
use std::sync::Arc;

use cerberus_common::error::BouncerError;
use cerberus_common::types::VerdictKind;
use ipnet::IpNet;

use crate::captcha::{CaptchaFlow, CaptchaOutcome, CaptchaState};
use crate::forwarded::{resolve_effective_ip, ForwardedResolution};
use crate::resolver::Resolver;

/// The minimal surface the pipeline needs from an inbound request,
/// independent of any particular web framework.
pub trait BouncerRequest {
    fn path(&self) -> &str;
    fn peer_ip(&self) -> IpAddr;
    fn forwarded_for_header(&self) -> Option<&str>;
    /// A submitted CAPTCHA phrase, present only on the verify round trip.
    fn captcha_submission(&self) -> Option<&str>;
    /// `true` on a `POST` carrying `refresh=1` — the only event that may
    /// regenerate an Armed/Failed challenge's phrase. A plain `GET`
    /// re-renders the existing challenge unchanged.
    fn is_refresh_request(&self) -> bool {
        false
    }
}

/// What the pipeline decided to do with a request. The host adapter
/// turns this into an actual HTTP response.
pub enum BouncerOutcome {
    /// Request may proceed; not bounced at all (excluded URI, bypass
    /// verdict, or an error with `display_errors=false`).
    Allow,
    /// Render the forbidden page.
    Forbidden,
    /// Render (or re-render) the CAPTCHA challenge page.
    Captcha {
        inline_image: String,
        redirect: String,
    },
    /// CAPTCHA was just resolved correctly; caller should redirect.
    CaptchaResolved { redirect: String },
    /// CAPTCHA submission was incorrect; re-render with a failure notice.
    CaptchaFailed {
        inline_image: String,
        redirect: String,
    },
}

pub struct BouncerPipeline {
    resolver: Resolver,
    captcha: CaptchaFlow,
    trust_ranges: Vec<IpNet>,
    excluded_uris: Vec<String>,
    forced_test_ip: Option<IpAddr>,
    forced_test_forwarded_ip_disabled: bool,
    display_errors: bool,
}

impl BouncerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Resolver,
        captcha: CaptchaFlow,
        trust_ranges: Vec<IpNet>,
        excluded_uris: Vec<String>,
        forced_test_ip: Option<IpAddr>,
        forced_test_forwarded_ip_disabled: bool,
        display_errors: bool,
    ) -> Self {
        Self {
            resolver,
            captcha,
            trust_ranges,
            excluded_uris,
            forced_test_ip,
            forced_test_forwarded_ip_disabled,
            display_errors,
        }
    }

    /// The request handling flow: excluded-URI check, effective-IP
    /// resolution, CAPTCHA-submission short-circuit, remediation
    /// lookup, and outcome dispatch.
    pub async fn handle_request(
        &self,
        request: &impl BouncerRequest,
    ) -> Result<BouncerOutcome, BouncerError> {
        match self.handle_request_inner(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "UNKNOWN_EXCEPTION_WHILE_BOUNCING");
                if self.display_errors {
                    Err(e)
                } else {
                    Ok(BouncerOutcome::Allow)
                }
            }
        }
    }

    async fn handle_request_inner(
        &self,
        request: &impl BouncerRequest,
    ) -> Result<BouncerOutcome, BouncerError> {
        if self.excluded_uris.iter().any(|uri| uri == request.path()) {
            return Ok(BouncerOutcome::Allow);
        }

        let ip = self.resolve_ip(request);

        if let Some(guess) = request.captcha_submission() {
            return self.handle_captcha_submission(&ip.to_string(), guess).await;
        }

        let verdict = self.resolver.get_remediation_for_ip(&ip.to_string()).await?;

        match verdict {
            VerdictKind::Bypass => Ok(BouncerOutcome::Allow),
            VerdictKind::Ban => Ok(BouncerOutcome::Forbidden),
            VerdictKind::Captcha => {
                self.handle_captcha_step(&ip.to_string(), request.path(), request.is_refresh_request())
                    .await
            }
        }
    }

    fn resolve_ip(&self, request: &impl BouncerRequest) -> IpAddr {
        if let Some(forced) = self.forced_test_ip {
            return forced;
        }
        match resolve_effective_ip(
            request.peer_ip(),
            request.forwarded_for_header(),
            &self.trust_ranges,
            self.forced_test_forwarded_ip_disabled,
        ) {
            ForwardedResolution::Trusted(ip) => ip,
            ForwardedResolution::Untrusted(ip) => {
                if request.forwarded_for_header().is_some() {
                    tracing::warn!(peer = %request.peer_ip(), "NON_AUTHORIZED_X_FORWARDED_FOR_USAGE");
                }
                ip
            }
        }
    }

    async fn handle_captcha_step(
        &self,
        ip: &str,
        redirect: &str,
        is_refresh: bool,
    ) -> Result<BouncerOutcome, BouncerError> {
        match self.captcha.state(ip).await? {
            CaptchaState::Unarmed => {
                let challenge = self.captcha.arm(ip, redirect).await?;
                Ok(BouncerOutcome::Captcha {
                    inline_image: challenge.inline_image,
                    redirect: challenge.resolution_redirect,
                })
            }
            CaptchaState::Armed { redirect } => {
                let challenge = if is_refresh {
                    self.captcha.refresh(ip).await?
                } else {
                    self.captcha
                        .view(ip)
                        .await?
                        .unwrap_or(crate::captcha::CaptchaChallenge {
                            inline_image: String::new(),
                            resolution_redirect: redirect,
                        })
                };
                Ok(BouncerOutcome::Captcha {
                    inline_image: challenge.inline_image,
                    redirect: challenge.resolution_redirect,
                })
            }
            CaptchaState::Failed { redirect } => {
                let challenge = if is_refresh {
                    self.captcha.refresh(ip).await?
                } else {
                    self.captcha
                        .view(ip)
                        .await?
                        .unwrap_or(crate::captcha::CaptchaChallenge {
                            inline_image: String::new(),
                            resolution_redirect: redirect,
                        })
                };
                Ok(BouncerOutcome::CaptchaFailed {
                    inline_image: challenge.inline_image,
                    redirect: challenge.resolution_redirect,
                })
            }
            CaptchaState::Resolved => Ok(BouncerOutcome::Allow),
        }
    }

    async fn handle_captcha_submission(&self, ip: &str, guess: &str) -> Result<BouncerOutcome, BouncerError> {
        match self.captcha.submit(ip, guess).await? {
            CaptchaOutcome::Resolved { redirect } => Ok(BouncerOutcome::CaptchaResolved { redirect }),
            CaptchaOutcome::Failed { redirect } => {
                // Failed keeps the same phrase/image — only a
                // subsequent `refresh=1` regenerates it.
                let challenge = self.captcha.view(ip).await?.unwrap_or(
                    crate::captcha::CaptchaChallenge {
                        inline_image: String::new(),
                        resolution_redirect: redirect,
                    },
                );
                Ok(BouncerOutcome::CaptchaFailed {
                    inline_image: challenge.inline_image,
                    redirect: challenge.resolution_redirect,
                })
            }
            CaptchaOutcome::Unarmed => Ok(BouncerOutcome::Allow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRequest {
        path: String,
        peer: IpAddr,
        forwarded: Option<String>,
        captcha_submission: Option<String>,
    }

    impl BouncerRequest for FakeRequest {
        fn path(&self) -> &str {
            &self.path
        }
        fn peer_ip(&self) -> IpAddr {
            self.peer
        }
        fn forwarded_for_header(&self) -> Option<&str> {
            self.forwarded.as_deref()
        }
        fn captcha_submission(&self) -> Option<&str> {
            self.captcha_submission.as_deref()
        }
    }

    #[test]
    fn excluded_uri_check_is_exact_match() {
        let excluded = vec!["/healthz".to_string()];
        assert!(excluded.iter().any(|u| u == "/healthz"));
        assert!(!excluded.iter().any(|u| u == "/other"));
    }

    #[test]
    fn fake_request_reports_fields() {
        let req = FakeRequest {
            path: "/".to_string(),
            peer: "10.0.0.1".parse().unwrap(),
            forwarded: Some("203.0.113.5".to_string()),
            captcha_submission: None,
        };
        assert_eq!(req.path(), "/");
        assert_eq!(req.forwarded_for_header(), Some("203.0.113.5"));
    }
}
