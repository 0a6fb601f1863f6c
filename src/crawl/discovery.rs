//! Term discovery: enumerate candidate term codes and probe the portal for
//! terms it serves but does not advertise.
//!
//! The portal's term selector lists only recent terms, yet older terms
//! still answer schedule queries. Candidates absent from the selector are
//! probed one at a time with a fixed pacing delay; a probe that yields a
//! populated schedule table promotes the candidate to a discovered term.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::extract::{Extraction, schedule::extract_schedule};
use crate::model::TermCode;
use crate::portal::{PortalClient, PortalError, Session};

/// A term the portal is known to serve.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredTerm {
    pub code: TermCode,
    /// Whether the portal's own term selector lists this term.
    pub advertised: bool,
    /// Section count observed by the probe. Zero for advertised terms,
    /// which are accepted without probing.
    pub section_count: usize,
}

/// Enumerate every candidate term code in `first_year..=last_year`, three
/// per year in intersession, first, second order.
pub fn enumerate_term_codes(first_year: u16, last_year: u16) -> Vec<TermCode> {
    (first_year..=last_year)
        .flat_map(|year| (0..=2).map(move |sem| TermCode::from_parts(sem, year)))
        .collect()
}

/// Probes candidate terms against the live portal.
pub struct TermDiscovery<'a> {
    client: &'a PortalClient,
    /// Pause between consecutive probes.
    pace: Duration,
}

impl<'a> TermDiscovery<'a> {
    pub fn new(client: &'a PortalClient, pace: Duration) -> Self {
        Self { client, pace }
    }

    /// Discover which terms in `first_year..=last_year` the portal serves.
    ///
    /// Advertised terms are taken from the schedule form's term selector and
    /// accepted as-is. The remaining candidates are probed sequentially with
    /// a single-department schedule query against `probe_dept`; probing is
    /// never concurrent. A probe that errors skips its candidate rather than
    /// aborting the sweep.
    pub async fn discover(
        &self,
        session: &Session,
        first_year: u16,
        last_year: u16,
        probe_dept: &str,
    ) -> Result<Vec<DiscoveredTerm>, PortalError> {
        let advertised: HashSet<TermCode> = self
            .client
            .fetch_advertised_terms(session)
            .await?
            .into_iter()
            .collect();
        info!(count = advertised.len(), "portal advertises terms");

        let mut discovered = Vec::new();
        let mut first_probe = true;
        for code in enumerate_term_codes(first_year, last_year) {
            if advertised.contains(&code) {
                discovered.push(DiscoveredTerm {
                    code,
                    advertised: true,
                    section_count: 0,
                });
                continue;
            }

            if !first_probe {
                tokio::time::sleep(self.pace).await;
            }
            first_probe = false;

            let body = match self.client.fetch_schedule(session, &code, probe_dept).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(term = %code, error = %e, "term probe failed, skipping");
                    continue;
                }
            };
            match extract_schedule(&body, code.as_str(), probe_dept) {
                Extraction::Records(sections) if !sections.is_empty() => {
                    info!(term = %code, sections = sections.len(), "unlisted term discovered");
                    discovered.push(DiscoveredTerm {
                        code,
                        advertised: false,
                        section_count: sections.len(),
                    });
                }
                _ => {
                    debug!(term = %code, "probe found no sections");
                }
            }
        }
        Ok(discovered)
    }
}
