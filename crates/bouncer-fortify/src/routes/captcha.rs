//! The bouncer gate: every non-excluded request passes through here.
//! Renders the forbidden/challenge pages inline with `format!` rather
//! than a template engine.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Form, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use bouncer_core::pipeline::{BouncerOutcome, BouncerRequest};
use cerberus_common::error::BouncerError;
use serde::Deserialize;

use crate::state::AppState;

struct AxumRequest {
    path: String,
    peer_ip: IpAddr,
    forwarded_for: Option<String>,
    captcha_submission: Option<String>,
    is_refresh: bool,
}

impl BouncerRequest for AxumRequest {
    fn path(&self) -> &str {
        &self.path
    }
    fn peer_ip(&self) -> IpAddr {
        self.peer_ip
    }
    fn forwarded_for_header(&self) -> Option<&str> {
        self.forwarded_for.as_deref()
    }
    fn captcha_submission(&self) -> Option<&str> {
        self.captcha_submission.as_deref()
    }
    fn is_refresh_request(&self) -> bool {
        self.is_refresh
    }
}

fn forwarded_for(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `GET` on any path not otherwise routed: the plain request-gating
/// path. Never carries a CAPTCHA submission or refresh flag.
pub async fn gate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    uri: Uri,
) -> Response {
    let request = AxumRequest {
        path: uri.path().to_string(),
        peer_ip: addr.ip(),
        forwarded_for: forwarded_for(&headers),
        captcha_submission: None,
        is_refresh: false,
    };

    render(state.pipeline.handle_request(&request).await)
}

#[derive(Deserialize, Default)]
pub struct VerifyForm {
    #[serde(default)]
    phrase: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

/// `POST /captcha/verify`: either a phrase submission or a `refresh=1`
/// request to regenerate the current challenge.
pub async fn verify(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Form(form): Form<VerifyForm>,
) -> Response {
    let is_refresh = form.refresh.as_deref() == Some("1");
    let request = AxumRequest {
        path: "/captcha/verify".to_string(),
        peer_ip: addr.ip(),
        forwarded_for: forwarded_for(&headers),
        captcha_submission: if is_refresh { None } else { form.phrase },
        is_refresh,
    };

    render(state.pipeline.handle_request(&request).await)
}

fn render(outcome: Result<BouncerOutcome, BouncerError>) -> Response {
    match outcome {
        Ok(BouncerOutcome::Allow) => StatusCode::OK.into_response(),
        Ok(BouncerOutcome::Forbidden) => {
            (StatusCode::FORBIDDEN, Html(forbidden_page())).into_response()
        }
        Ok(BouncerOutcome::Captcha {
            inline_image,
            redirect,
        }) => (
            StatusCode::UNAUTHORIZED,
            Html(challenge_page(&inline_image, &redirect, None)),
        )
            .into_response(),
        Ok(BouncerOutcome::CaptchaFailed {
            inline_image,
            redirect,
        }) => (
            StatusCode::UNAUTHORIZED,
            Html(challenge_page(
                &inline_image,
                &redirect,
                Some("That phrase didn't match. Try again."),
            )),
        )
            .into_response(),
        Ok(BouncerOutcome::CaptchaResolved { redirect }) => Redirect::to(&redirect).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "bouncer pipeline error");
            (e.status_code_http(), Html(forbidden_page())).into_response()
        }
    }
}

trait StatusCodeExt {
    fn status_code_http(&self) -> StatusCode;
}

impl StatusCodeExt for BouncerError {
    fn status_code_http(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn forbidden_page() -> String {
    "<!DOCTYPE html><html><head><title>Access denied</title></head>\
<body><h1>Access denied</h1><p>Your access to this site has been blocked.</p></body></html>"
        .to_string()
}

fn challenge_page(inline_image: &str, redirect: &str, error: Option<&str>) -> String {
    let banner = error
        .map(|msg| format!("<p class=\"error\">{msg}</p>"))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html><html><head><title>Verify you're human</title></head><body>\
<h1>Verify you're human</h1>\
{banner}\
<img src=\"{inline_image}\" alt=\"challenge\">\
<form method=\"post\" action=\"/captcha/verify\">\
<input type=\"hidden\" name=\"redirect\" value=\"{redirect}\">\
<input type=\"text\" name=\"phrase\" autocomplete=\"off\" autofocus>\
<button type=\"submit\">Submit</button>\
</form>\
<form method=\"post\" action=\"/captcha/verify\">\
<input type=\"hidden\" name=\"refresh\" value=\"1\">\
<input type=\"hidden\" name=\"redirect\" value=\"{redirect}\">\
<button type=\"submit\">Get a new phrase</button>\
</form>\
</body></html>"
    )
}
