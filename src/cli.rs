use clap::{Parser, Subcommand, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable output for local runs.
    Pretty,
    /// Line-delimited JSON for log shippers.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "registrar", about = "Ingestion pipeline for the registrar portal")]
pub struct Args {
    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl class schedules for one term across a set of departments.
    Schedules {
        /// Term code, e.g. 12024.
        #[arg(long)]
        term: String,
        /// Department codes to crawl.
        #[arg(long, num_args = 1.., required = true)]
        depts: Vec<String>,
    },
    /// Crawl curriculum pages for a set of degree codes.
    Curricula {
        /// Term code the work items are tagged with, e.g. 12024.
        #[arg(long)]
        term: String,
        /// Degree codes to crawl.
        #[arg(long, num_args = 1.., required = true)]
        degrees: Vec<String>,
    },
    /// Enumerate and probe term codes to find terms the portal serves.
    DiscoverTerms {
        /// First year of the candidate range.
        #[arg(long)]
        from: u16,
        /// Last year of the candidate range, inclusive.
        #[arg(long)]
        to: u16,
        /// Department used for single-department probe queries.
        #[arg(long)]
        probe_dept: String,
    },
    /// Fetch the authenticated principal's own records: grades, plan of
    /// study, holds, enrolled classes.
    Personal {
        /// Term code for the grades query, e.g. 12024.
        #[arg(long)]
        term: String,
    },
}
