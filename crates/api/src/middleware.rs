use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use pipeops_auth::{AuthRedirect, GuardDecision, RequiredRole};

use crate::app::services::AppServices;
use crate::context::SessionContext;
use crate::settings::AuthSettings;

/// Carries a re-signed credential after the role claim was healed.
pub const REFRESHED_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-refreshed-token");

/// Guard state for one group of routes.
#[derive(Clone)]
pub struct RoleGate {
    pub services: Arc<AppServices>,
    pub required: Option<RequiredRole>,
}

impl RoleGate {
    pub fn new(services: Arc<AppServices>, required: Option<RequiredRole>) -> Self {
        Self { services, required }
    }
}

/// Revalidate the session on every request and enforce the gate's role.
///
/// Allowed requests get a `SessionContext` extension. Rejected requests are
/// answered with a 303 to the sign-in page or the error page.
pub async fn require_session(
    State(gate): State<RoleGate>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth = &gate.services.auth;
    let token = extract_token(req.headers(), &auth.cookie_name).map(str::to_owned);

    match gate.services.guard.require_auth(token.as_deref(), gate.required).await {
        GuardDecision::Allow { session, refreshed_token } => {
            req.extensions_mut().insert(SessionContext::new(session));
            let mut response = next.run(req).await;
            if let Some(refreshed) = refreshed_token {
                attach_refreshed_token(response.headers_mut(), auth, &refreshed);
            }
            response
        }
        GuardDecision::Redirect(AuthRedirect::SignIn) => {
            let mut response = Redirect::to(&auth.sign_in_path).into_response();
            if token.is_some() {
                append_cookie(response.headers_mut(), &clear_cookie(auth));
            }
            response
        }
        GuardDecision::Redirect(AuthRedirect::Error(page)) => {
            let target = format!("{}?{}", auth.error_path, page.query_string());
            Redirect::to(&target).into_response()
        }
    }
}

/// Credential from `Authorization: Bearer` or, failing that, the session cookie.
pub fn extract_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    extract_bearer(headers).or_else(|| extract_cookie(headers, cookie_name))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

pub fn session_cookie(auth: &AuthSettings, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        auth.cookie_name,
        token,
        auth.session_ttl().num_seconds()
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(auth: &AuthSettings) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", auth.cookie_name)
}

pub fn append_cookie(headers: &mut HeaderMap, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "session cookie is not a valid header value"),
    }
}

pub fn attach_refreshed_token(headers: &mut HeaderMap, auth: &AuthSettings, token: &str) {
    append_cookie(headers, &session_cookie(auth, token));
    if let Ok(value) = HeaderValue::from_str(token) {
        headers.insert(REFRESHED_TOKEN_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer abc"),
            (header::COOKIE, "pipeops_session=def"),
        ]);
        assert_eq!(extract_token(&map, "pipeops_session"), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let map = headers(&[(header::COOKIE, "theme=dark; pipeops_session=tok.en.sig; lang=en")]);
        assert_eq!(extract_token(&map, "pipeops_session"), Some("tok.en.sig"));
    }

    #[test]
    fn empty_or_missing_credentials_are_none() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer   "),
            (header::COOKIE, "pipeops_session="),
        ]);
        assert_eq!(extract_token(&map, "pipeops_session"), None);
        assert_eq!(extract_token(&HeaderMap::new(), "pipeops_session"), None);
    }

    #[test]
    fn basic_auth_is_not_a_bearer_token() {
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_token(&map, "pipeops_session"), None);
    }

    #[test]
    fn cookies_carry_flags() {
        let mut auth = crate::settings::Settings::default().auth;
        auth.secure_cookie = true;
        let cookie = session_cookie(&auth, "t");
        assert!(cookie.starts_with("pipeops_session=t; HttpOnly; SameSite=Lax; Path=/"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_cookie(&auth).contains("Max-Age=0"));
    }
}
