use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use health_audit::analysis::{CheckRegistry, StaticAdvisories};
use health_audit::audit::Auditor;
use health_audit::config::Config;
use health_audit::fix::{verify_registry, AutoFixEngine, FixContext, TokioCommandRunner};
use health_audit::fs::OsFileSystem;
use health_audit::report;
use health_audit::types::Issue;

/// Health Audit: scores a TypeScript/React project across code quality,
/// performance, security, accessibility and dependencies, and optionally
/// applies the fixes it can make safely.
#[derive(Parser, Debug)]
#[command(name = "health-audit", version, about)]
struct Cli {
    /// Project root to audit
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to .health-audit.toml in the project root)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the full session as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Apply every available auto-fix after the scan
    #[arg(long)]
    fix: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let _main_span = info_span!("health_audit", root = %cli.root.display()).entered();

    info!("loading configuration");
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(&cli.root)?,
    };
    let catalog = Arc::new(config.rule_catalog()?);
    debug!(rules = catalog.rules.len(), "rule catalog loaded");

    let engine = AutoFixEngine::builtin(FixContext::new(
        cli.root.clone(),
        Arc::new(OsFileSystem::new(config.fix.io_timeout())),
        config.fix.clone(),
        Arc::new(TokioCommandRunner),
    ));
    verify_registry(&catalog, &engine)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; stopping after the current step");
                cancel.cancel();
            }
        }
    });

    info!("running audit");
    let auditor = Auditor::new(
        cli.root.clone(),
        config.scan.clone(),
        Arc::clone(&catalog),
        Arc::new(OsFileSystem::new(config.scan.io_timeout())),
        CheckRegistry::builtin(Arc::new(StaticAdvisories::builtin())),
    );
    let session = auditor.run(&cancel).await;

    info!("generating report");
    report::output(&session, cli.output.as_deref())?;
    if let Some(path) = &cli.json {
        report::write_json(&session, path)?;
    }

    if cli.fix {
        let issues: Vec<Issue> = session
            .results
            .iter()
            .flat_map(|r| r.issues.iter().cloned())
            .collect();
        info!(candidates = issues.iter().filter(|i| i.auto_fix_available).count(), "applying fixes");
        let batch = engine.apply_batch(&issues, &cancel).await;
        report::print_batch_report(&batch);
    }

    info!(score = session.overall_score, status = %session.overall_status, "done");
    Ok(())
}
