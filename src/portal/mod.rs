//! HTTP client for the legacy registrar portal.
//!
//! The wire contract is reverse-engineered and must be preserved: login is
//! GET-for-token then POST-credentials-plus-token; authenticated pages
//! answer HTTP 200 in every state and redirect to the login page on session
//! loss (the only failure signal); result queries are POSTs whose `command`
//! field must equal `displayResults`; any other value merely redisplays
//! the search form.

pub mod errors;
pub mod session;

use html_scraper::{Html, Selector};
use reqwest::header::{COOKIE, LOCATION};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::trace;
use url::Url;

pub use errors::PortalError;
pub use session::{Session, SessionManager};

use crate::model::TermCode;

pub(crate) const LOGIN_PATH: &str = "login.do";
pub(crate) const VERIFY_PATH: &str = "myInfo.do";
const SCHEDULE_PATH: &str = "classSchedule.do";
const CURRICULUM_PATH: &str = "curriculum.do";
const GRADES_PATH: &str = "grades.do";
const IPS_PATH: &str = "ips.do";
const HOLDS_PATH: &str = "holdOrders.do";
const ENROLLED_PATH: &str = "enrolledClasses.do";

/// The `command` value that makes a query endpoint render results rather
/// than redisplay its search form.
const DISPLAY_RESULTS: &str = "displayResults";

static TERM_OPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"select[name="term"] > option"#).unwrap());

/// Build the crate-wide HTTP client: fixed per-call timeout, redirects
/// disabled so login redirects stay observable.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// True when a response is a redirect back to the login page, the
/// portal's session-loss signal.
pub(crate) fn is_login_redirect(response: &reqwest::Response) -> bool {
    response.status().is_redirection()
        && response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|loc| loc.contains("login"))
}

/// Authenticated request surface against the portal.
///
/// Every method takes a [`Session`] by reference and attaches its cookie
/// bundle as headers. On [`PortalError::InvalidSession`] the caller must
/// invalidate the session with the [`SessionManager`]; no retry happens
/// here; that is the orchestrator's job.
pub struct PortalClient {
    http: reqwest::Client,
    base: Url,
}

impl PortalClient {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    /// Fetch the class-schedule results page for one (term, department).
    pub async fn fetch_schedule(
        &self,
        session: &Session,
        term: &TermCode,
        dept: &str,
    ) -> Result<String, PortalError> {
        self.post_form(
            session,
            SCHEDULE_PATH,
            &[
                ("term", term.as_str()),
                ("deptCode", dept),
                ("command", DISPLAY_RESULTS),
            ],
        )
        .await
    }

    /// Fetch the curriculum page for one degree code.
    pub async fn fetch_curriculum(
        &self,
        session: &Session,
        degree: &str,
    ) -> Result<String, PortalError> {
        self.post_form(
            session,
            CURRICULUM_PATH,
            &[("degreeCode", degree), ("command", DISPLAY_RESULTS)],
        )
        .await
    }

    pub async fn fetch_grades(
        &self,
        session: &Session,
        term: &TermCode,
    ) -> Result<String, PortalError> {
        self.post_form(
            session,
            GRADES_PATH,
            &[("term", term.as_str()), ("command", DISPLAY_RESULTS)],
        )
        .await
    }

    pub async fn fetch_ips(&self, session: &Session) -> Result<String, PortalError> {
        self.get(session, IPS_PATH).await
    }

    pub async fn fetch_holds(&self, session: &Session) -> Result<String, PortalError> {
        self.get(session, HOLDS_PATH).await
    }

    pub async fn fetch_enrolled(&self, session: &Session) -> Result<String, PortalError> {
        self.get(session, ENROLLED_PATH).await
    }

    /// Read the portal's advertised term list from the schedule search
    /// form's term selector.
    pub async fn fetch_advertised_terms(
        &self,
        session: &Session,
    ) -> Result<Vec<TermCode>, PortalError> {
        let body = self.get(session, SCHEDULE_PATH).await?;
        let doc = Html::parse_document(&body);
        let terms: Vec<TermCode> = doc
            .select(&TERM_OPTION_SEL)
            .filter_map(|opt| opt.attr("value"))
            .filter_map(TermCode::parse)
            .collect();

        if terms.is_empty() {
            return Err(PortalError::ParseFailed {
                url: self.url(SCHEDULE_PATH).to_string(),
                source: anyhow::anyhow!("term selector missing or empty"),
            });
        }
        Ok(terms)
    }

    async fn get(&self, session: &Session, path: &str) -> Result<String, PortalError> {
        let url = self.url(path);
        trace!(%url, principal = session.principal(), "portal GET");
        let response = self
            .http
            .get(url)
            .header(COOKIE, session.cookie_header())
            .send()
            .await
            .map_err(PortalError::Unavailable)?;
        self.read_authenticated(response, session).await
    }

    async fn post_form(
        &self,
        session: &Session,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, PortalError> {
        let url = self.url(path);
        trace!(%url, principal = session.principal(), "portal POST");
        let response = self
            .http
            .post(url)
            .header(COOKIE, session.cookie_header())
            .form(params)
            .send()
            .await
            .map_err(PortalError::Unavailable)?;
        self.read_authenticated(response, session).await
    }

    async fn read_authenticated(
        &self,
        response: reqwest::Response,
        session: &Session,
    ) -> Result<String, PortalError> {
        if is_login_redirect(&response) {
            return Err(PortalError::InvalidSession(format!(
                "redirected to login for principal '{}'",
                session.principal()
            )));
        }
        response.text().await.map_err(PortalError::Unavailable)
    }

    fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("portal path must join to base URL")
    }
}
