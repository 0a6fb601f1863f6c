use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use registrar::cli::{Args, Command};
use registrar::config::Config;
use registrar::crawl::discovery::TermDiscovery;
use registrar::crawl::{CrawlConfig, CrawlOrchestrator, ItemOutcome};
use registrar::extract::Extraction;
use registrar::extract::curriculum::extract_curriculum;
use registrar::extract::personal::{extract_enrolled, extract_grades, extract_holds, extract_ips};
use registrar::extract::schedule::extract_schedule;
use registrar::guard::{BaselineTracker, SanityStatus, check_department_sanity};
use registrar::logging::setup_logging;
use registrar::model::{PersonalRecord, TermCode, WorkItem};
use registrar::portal::{PortalClient, PortalError, Session, SessionManager, build_http_client};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and set up logging first so startup failures are visible.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting registrar pipeline"
    );

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "pipeline failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let base = Url::parse(&config.base_url).context("base_url is not a valid URL")?;
    let http = build_http_client(config.http_timeout()).context("building HTTP client")?;
    let sessions = Arc::new(SessionManager::new(
        http.clone(),
        base.clone(),
        config.session_ttl(),
    ));
    let client = PortalClient::new(http, base);

    let principal = config
        .principal
        .clone()
        .context("no principal configured (set REGISTRAR_PRINCIPAL)")?;
    let secret = config
        .secret
        .clone()
        .context("no secret configured (set REGISTRAR_SECRET)")?;
    let session = sessions.acquire(&principal, &secret).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    match args.command {
        Command::Schedules { term, depts } => {
            let term = TermCode::parse(&term).context("invalid term code")?;
            let items: Vec<WorkItem> = depts
                .iter()
                .map(|d| WorkItem::department(term.clone(), d.to_ascii_uppercase()))
                .collect();
            crawl_schedules(&config, &client, &sessions, session, term, items, &cancel).await
        }
        Command::Curricula { term, degrees } => {
            let term = TermCode::parse(&term).context("invalid term code")?;
            let items: Vec<WorkItem> = degrees
                .iter()
                .map(|d| WorkItem::degree(term.clone(), d.to_ascii_uppercase()))
                .collect();
            crawl_curricula(&config, &client, &sessions, session, items, &cancel).await
        }
        Command::DiscoverTerms {
            from,
            to,
            probe_dept,
        } => {
            let discovery = TermDiscovery::new(&client, config.probe_delay());
            let terms = discovery
                .discover(&session, from, to, &probe_dept.to_ascii_uppercase())
                .await?;
            for term in &terms {
                println!("{}", serde_json::to_string(term)?);
            }
            info!(count = terms.len(), "term discovery complete");
            Ok(())
        }
        Command::Personal { term } => {
            let term = TermCode::parse(&term).context("invalid term code")?;
            fetch_personal(&client, &session, &term).await
        }
    }
}

/// Crawl one term's schedules, then run the regression guard over the
/// aggregate.
async fn crawl_schedules(
    config: &Config,
    client: &PortalClient,
    sessions: &Arc<SessionManager>,
    session: Session,
    term: TermCode,
    items: Vec<WorkItem>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let orchestrator = CrawlOrchestrator::new(CrawlConfig {
        max_concurrency: config.max_concurrency,
        inter_batch_delay: config.inter_batch_delay(),
    });

    let mut tracker = match &config.baseline_path {
        Some(path) => BaselineTracker::with_path(path.clone(), config.drop_threshold)?,
        None => BaselineTracker::new(config.drop_threshold),
    };
    // Last run's counts feed the `unchanged` flag on progress events.
    let prior_counts = tracker.prior_counts(&term);

    let result = orchestrator
        .run(
            term.clone(),
            items,
            |item: WorkItem| {
                let session = session.clone();
                async move {
                    let body = client
                        .fetch_schedule(&session, &item.term, &item.code)
                        .await
                        .inspect_err(|e| {
                            if matches!(e, PortalError::InvalidSession(_)) {
                                sessions.invalidate(session.principal());
                            }
                        })?;
                    Ok(extract_schedule(&body, item.term.as_str(), &item.code).into_records())
                }
            },
            prior_counts.as_ref(),
            emit_outcome,
            cancel,
        )
        .await;

    // Sanity checks against declared baselines.
    for (dept, observation) in &result.departments {
        let Some(baseline) = config.baselines.get(dept) else {
            continue;
        };
        let verdict = check_department_sanity(dept, observation, baseline);
        match verdict.status {
            SanityStatus::Pass => {}
            SanityStatus::Warn => {
                warn!(dept, findings = ?verdict.findings, "sanity check warning");
            }
            SanityStatus::Fail => {
                error!(dept, findings = ?verdict.findings, "sanity check failed");
            }
        }
    }

    // Drift against the previous run of the same term.
    let comparison = tracker.compare(&result);
    if comparison.first_run {
        info!(term = %term, "no prior baseline, this run becomes the baseline");
    } else {
        for delta in &comparison.regressions {
            error!(
                dept = delta.dept,
                baseline = delta.baseline,
                current = delta.current,
                "department regressed against baseline"
            );
        }
        for delta in &comparison.improvements {
            info!(
                dept = delta.dept,
                baseline = delta.baseline,
                current = delta.current,
                "department grew past baseline"
            );
        }
    }
    tracker.record(&result)?;

    if !result.failed.is_empty() {
        warn!(
            failed = result.failed.len(),
            "some departments failed; re-run to retry"
        );
    }
    Ok(())
}

async fn crawl_curricula(
    config: &Config,
    client: &PortalClient,
    sessions: &Arc<SessionManager>,
    session: Session,
    items: Vec<WorkItem>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let orchestrator = CrawlOrchestrator::new(CrawlConfig {
        max_concurrency: config.max_concurrency,
        inter_batch_delay: config.inter_batch_delay(),
    });

    let term = items
        .first()
        .map(|i| i.term.clone())
        .context("no degree codes to crawl")?;
    let result = orchestrator
        .run(
            term,
            items,
            |item: WorkItem| {
                let session = session.clone();
                async move {
                    let body = client
                        .fetch_curriculum(&session, &item.code)
                        .await
                        .inspect_err(|e| {
                            if matches!(e, PortalError::InvalidSession(_)) {
                                sessions.invalidate(session.principal());
                            }
                        })?;
                    Ok(extract_curriculum(&body, &item.code).into_records())
                }
            },
            None,
            emit_outcome,
            cancel,
        )
        .await;

    if !result.failed.is_empty() {
        warn!(
            failed = result.failed.len(),
            "some degrees failed; re-run to retry"
        );
    }
    Ok(())
}

/// Fetch the authenticated principal's own records and emit them as JSON
/// lines.
async fn fetch_personal(
    client: &PortalClient,
    session: &Session,
    term: &TermCode,
) -> anyhow::Result<()> {
    let grades = extract_grades(&client.fetch_grades(session, term).await?);
    let ips = extract_ips(&client.fetch_ips(session).await?);
    let holds = extract_holds(&client.fetch_holds(session).await?);
    let enrolled = extract_enrolled(&client.fetch_enrolled(session).await?);

    report_missing("grades", &grades);
    report_missing("ips", &ips);
    report_missing("holds", &holds);
    report_missing("enrolled", &enrolled);

    let records: Vec<PersonalRecord> = grades
        .into_records()
        .into_iter()
        .map(PersonalRecord::Grade)
        .chain(ips.into_records().into_iter().map(PersonalRecord::Ips))
        .chain(holds.into_records().into_iter().map(PersonalRecord::Hold))
        .chain(
            enrolled
                .into_records()
                .into_iter()
                .map(PersonalRecord::Enrolled),
        )
        .collect();
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    info!(count = records.len(), "personal records fetched");
    Ok(())
}

fn report_missing<T>(page: &str, extraction: &Extraction<T>) {
    if extraction.is_table_missing() {
        warn!(page, "expected table not found, possible markup change");
    }
}

/// Emit one completed work item as a JSON line on stdout; the consumer on
/// the other end of the pipe owns persistence.
fn emit_outcome<T: serde::Serialize>(outcome: ItemOutcome<T>) {
    match serde_json::to_string(&outcome) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(key = outcome.key, error = %e, "failed to serialize outcome"),
    }
}
