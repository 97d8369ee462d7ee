//! Re-ID Experiment Harness CLI
//!
//! Runs selected training experiments one after another, each under a
//! timeout, and prints a summary at the end.

use std::{
    io::{self, IsTerminal, Write},
    path::PathBuf,
};

use clap::{CommandFactory, Parser};
use reid_config::Registry;
use reid_harness::{
    config::{HarnessConfig, Overrides},
    plan::resolve,
    report::{Reporter, RunReport, write_report},
    runner::Runner,
    scheduler::Scheduler,
};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "reid-harness",
    about = "Run selected re-ID training experiments",
    after_help = "Examples:\n  reid-harness baseline osnet triplet\n  reid-harness core\n  \
                  reid-harness architecture loss\n  reid-harness --list\n  \
                  reid-harness baseline --timeout 7200 --wait 30"
)]
struct Cli {
    /// Experiments or groups to run (see --list)
    experiments: Vec<String>,

    /// Show available experiments and groups, then exit
    #[arg(long, visible_alias = "show")]
    list: bool,

    /// Timeout per experiment in seconds [default: 14400]
    #[arg(long)]
    timeout: Option<u64>,

    /// Wait time between experiments in seconds [default: 10]
    #[arg(long)]
    wait: Option<u64>,

    /// Show what would be run without running anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Path to harness.toml settings file
    #[arg(short, long, default_value = "harness.toml")]
    config: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // tracing needs to be initialized with indicatif_layer to not clobber the spinner
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .with(indicatif_layer)
        .init();

    let cli = Cli::parse();
    let registry = Registry::builtin();
    let mut reporter = Reporter::new(io::stdout()).with_spinner(io::stderr().is_terminal());

    if cli.list {
        reporter.registry(&registry);
        return Ok(());
    }

    if cli.experiments.is_empty() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let harness_config = HarnessConfig::load_or_default(&cli.config)?.with_overrides(Overrides {
        timeout_secs: cli.timeout,
        wait_secs: cli.wait,
        report_file: cli.report,
    });
    let settings = harness_config.harness;

    if let Some(ref dir) = settings.work_dir {
        std::env::set_current_dir(dir)
            .map_err(|e| format!("failed to enter work dir {}: {e}", dir.display()))?;
    }

    let plan = resolve(&registry, &cli.experiments);
    reporter.unresolved(&plan.unresolved, &registry);
    if plan.is_empty() {
        reporter.no_valid_jobs();
        return Ok(());
    }

    let runner = Runner::from_settings(&settings);
    let mut scheduler = Scheduler::new(&plan, runner, settings.timeout(), settings.wait());
    let preview = scheduler.dry_run();

    let session = chrono::Local::now().format("%m%d_%H%M").to_string();
    reporter.plan(&session, &preview);

    if cli.dry_run {
        reporter.dry_run();
        return Ok(());
    }

    if !cli.yes && !confirm(plan.len())? {
        scheduler.abort()?;
        reporter.aborted();
        return Ok(());
    }

    let started_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let result = scheduler.run(&mut reporter).await?;
    reporter.summary(&result.summary, &settings.log_dir);

    if let Some(ref path) = settings.report_file {
        let report = RunReport::new(session, started_at, &preview, result.outcomes, result.summary);
        write_report(path, &report)?;
        reporter.report_written(path);
    }

    Ok(())
}

/// Ask the operator to confirm; anything but `y`/`yes` declines.
fn confirm(count: usize) -> io::Result<bool> {
    print!("\n🚀 Ready to run {count} experiments? (y/N): ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}
