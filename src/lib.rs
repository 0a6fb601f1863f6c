//! Ingestion pipeline for a legacy institutional registrar portal.
//!
//! The portal is form-driven server-rendered HTML with no API: this crate
//! authenticates against it, crawls schedule and curriculum pages with
//! adaptive concurrency, extracts typed records from inconsistent markup,
//! and guards each run against silent extraction regressions.

pub mod cli;
pub mod config;
pub mod crawl;
pub mod extract;
pub mod guard;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod portal;
pub mod utils;
