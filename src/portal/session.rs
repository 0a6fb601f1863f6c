//! Authenticated session acquisition and caching.
//!
//! The portal's login is a two-step handshake: fetch the login form for a
//! per-session anti-forgery token, then POST credentials plus that token.
//! The portal returns HTTP 200 on both success and failure. The only
//! reliable failure signal is a redirect back to the login page when
//! requesting an authenticated-only page, so redirects are never followed.

use dashmap::DashMap;
use html_scraper::{Html, Selector};
use indexmap::IndexMap;
use reqwest::header::{COOKIE, SET_COOKIE};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::errors::PortalError;
use super::{LOGIN_PATH, VERIFY_PATH, is_login_redirect};

static TOKEN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="token"]"#).unwrap());

/// An authenticated portal session.
///
/// The cookie bundle is opaque: it is attached verbatim as a `Cookie`
/// header and never inspected. Sessions leave the manager only by value
/// through [`SessionManager::acquire`].
#[derive(Debug, Clone)]
pub struct Session {
    principal: String,
    cookie_header: String,
    expires_at: Instant,
}

impl Session {
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The credential bundle, formatted as a `Cookie` header value.
    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Accumulates `Set-Cookie` values across handshake steps. Later values for
/// the same cookie name replace earlier ones.
#[derive(Debug, Default)]
struct CookieJar(IndexMap<String, String>);

impl CookieJar {
    fn absorb(&mut self, response: &reqwest::Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or("");
            if let Some((name, val)) = pair.split_once('=') {
                self.0.insert(name.trim().to_string(), val.trim().to_string());
            }
        }
    }

    fn header_value(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Performs the login handshake and caches sessions per principal with a
/// fixed TTL.
///
/// The cache is the pipeline's only cross-task shared mutable state; the
/// `DashMap` provides the required synchronization boundary.
pub struct SessionManager {
    http: reqwest::Client,
    base: Url,
    ttl: Duration,
    cache: DashMap<String, Session>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base: Url, ttl: Duration) -> Self {
        Self {
            http,
            base,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Acquire an authenticated session for `principal`.
    ///
    /// A cache hit within the TTL short-circuits the handshake entirely;
    /// no login HTTP calls are made. Failures: `AuthenticationFailed` when
    /// the portal rejects the credentials, `Unavailable` on network or
    /// timeout, `ParseFailed` when the login form carries no anti-forgery
    /// token.
    pub async fn acquire(&self, principal: &str, secret: &str) -> Result<Session, PortalError> {
        if let Some(cached) = self.cache.get(principal)
            && !cached.is_expired()
        {
            debug!(principal, "session cache hit");
            return Ok(cached.clone());
        }
        self.cache.remove(principal);

        let session = self.handshake(principal, secret).await?;
        self.cache.insert(principal.to_string(), session.clone());
        info!(principal, ttl = ?self.ttl, "session established");
        Ok(session)
    }

    /// Drop a cached session. Must be called by any downstream caller that
    /// observes [`PortalError::InvalidSession`]: the portal revoked the
    /// session server-side and the cached bundle is stale.
    pub fn invalidate(&self, principal: &str) {
        if self.cache.remove(principal).is_some() {
            warn!(principal, "session invalidated");
        }
    }

    async fn handshake(&self, principal: &str, secret: &str) -> Result<Session, PortalError> {
        let login_url = self.url(LOGIN_PATH);
        let mut jar = CookieJar::default();

        // (a) Fetch the login form for the per-session anti-forgery token.
        let response = self
            .http
            .get(login_url.clone())
            .send()
            .await
            .map_err(PortalError::Unavailable)?;
        jar.absorb(&response);
        let body = response.text().await.map_err(PortalError::Unavailable)?;
        let token = extract_login_token(&body).ok_or_else(|| PortalError::ParseFailed {
            url: login_url.to_string(),
            source: anyhow::anyhow!("login form has no anti-forgery token input"),
        })?;

        // (b) Submit credentials plus the token. The portal answers 200
        // whether or not the credentials were accepted.
        let response = self
            .http
            .post(login_url)
            .header(COOKIE, jar.header_value())
            .form(&[
                ("username", principal),
                ("password", secret),
                ("token", &token),
                ("command", "login"),
            ])
            .send()
            .await
            .map_err(PortalError::Unavailable)?;
        jar.absorb(&response);

        // (c) Verify by requesting an authenticated-only page: a redirect
        // back to the login page is the rejection signal.
        let verify_url = self.url(VERIFY_PATH);
        let response = self
            .http
            .get(verify_url)
            .header(COOKIE, jar.header_value())
            .send()
            .await
            .map_err(PortalError::Unavailable)?;
        jar.absorb(&response);

        if is_login_redirect(&response) {
            return Err(PortalError::AuthenticationFailed(principal.to_string()));
        }

        Ok(Session {
            principal: principal.to_string(),
            cookie_header: jar.header_value(),
            expires_at: Instant::now() + self.ttl,
        })
    }

    fn url(&self, path: &str) -> Url {
        // The base URL is validated at config load; joining a constant
        // path cannot fail.
        self.base.join(path).expect("portal path must join to base URL")
    }
}

/// Pull the hidden anti-forgery token out of the login form.
fn extract_login_token(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    doc.select(&TOKEN_SEL)
        .next()
        .and_then(|input| input.attr("value"))
        .map(str::to_string)
        .filter(|t| !t.is_empty())
}
