//! Progress lines, plan display, run summary and the JSON run report.
//!
//! Everything here is presentation: nothing written by the [`Reporter`]
//! feeds back into scheduling decisions.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use reid_config::{JobDescriptor, Registry};
use serde::Serialize;

use crate::{
    runner::{DispatchError, JobOutcome, JobStatus},
    scheduler::{DryRunResult, RunSummary},
};

const RULE_WIDTH: usize = 70;

/// Estimated minutes left, assuming every remaining job takes as long as the last one.
#[must_use]
pub fn eta_minutes(remaining_jobs: usize, last_job_elapsed: Duration) -> f64 {
    remaining_jobs as f64 * last_job_elapsed.as_secs_f64() / 60.0
}

/// Writes human-readable progress to a sink (usually stdout).
pub struct Reporter<W: Write> {
    out: W,
    show_spinner: bool,
    spinner: Option<ProgressBar>,
}

impl<W: Write> Reporter<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_spinner: false,
            spinner: None,
        }
    }

    /// Show a spinner on stderr while a job runs.
    #[must_use]
    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.show_spinner = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self
            .out
            .write_fmt(args)
            .and_then(|()| self.out.write_all(b"\n"))
        {
            tracing::debug!("Failed to write report line: {e}");
        }
    }

    fn rule(&mut self, ch: char) {
        let rule = ch.to_string().repeat(RULE_WIDTH);
        self.line(format_args!("{rule}"));
    }

    /// Print every experiment and group.
    pub fn registry(&mut self, registry: &Registry) {
        self.line(format_args!("📋 AVAILABLE EXPERIMENTS:"));
        for job in registry.jobs() {
            self.line(format_args!("  {:15} - {}", job.selector, job.description));
        }

        self.line(format_args!(""));
        self.line(format_args!("📁 AVAILABLE GROUPS:"));
        for group in registry.groups() {
            let preview = group
                .members
                .iter()
                .take(3)
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            let more = if group.members.len() > 3 { "..." } else { "" };
            self.line(format_args!(
                "  {:15} - {} experiments: {preview}{more}",
                group.name,
                group.members.len()
            ));
        }
    }

    /// Warn about selectors that named neither a job nor a group.
    pub fn unresolved(&mut self, tokens: &[String], registry: &Registry) {
        if tokens.is_empty() {
            return;
        }
        for token in tokens {
            self.line(format_args!("⚠️  Unknown experiment/group: {token}"));
        }
        let jobs = registry.selectors().collect::<Vec<_>>().join(", ");
        let groups = registry
            .groups()
            .iter()
            .map(|g| g.name)
            .collect::<Vec<_>>()
            .join(", ");
        self.line(format_args!("Available experiments: {jobs}"));
        self.line(format_args!("Available groups: {groups}"));
    }

    pub fn no_valid_jobs(&mut self) {
        self.line(format_args!("❌ No valid experiments found!"));
    }

    /// Print the session header and the jobs about to run.
    pub fn plan(&mut self, session: &str, dry: &DryRunResult) {
        self.line(format_args!(""));
        self.line(format_args!("🎯 SELECTED EXPERIMENTS SESSION"));
        self.line(format_args!("🕐 Session: {session}"));
        self.line(format_args!(
            "📅 Start: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.line(format_args!(
            "⏱️  Timeout per experiment: {:.1} hours",
            dry.timeout.as_secs_f64() / 3600.0
        ));
        self.line(format_args!(
            "⏸️  Wait between experiments: {} seconds",
            dry.wait.as_secs()
        ));

        self.line(format_args!(""));
        self.line(format_args!("📊 Experiments to run ({}):", dry.jobs.len()));
        for (i, job) in dry.jobs.iter().enumerate() {
            self.line(format_args!(
                "  {:2}. {:15} - {}",
                i + 1,
                job.selector,
                job.description
            ));
        }

        self.line(format_args!(""));
        self.line(format_args!(
            "⏳ Estimated total time: {:.1} hours",
            dry.worst_case().as_secs_f64() / 3600.0
        ));
    }

    pub fn dry_run(&mut self) {
        self.line(format_args!(""));
        self.line(format_args!("🔍 DRY RUN - No experiments will be executed"));
        self.line(format_args!(
            "Remove --dry-run flag to actually run the experiments"
        ));
    }

    pub fn aborted(&mut self) {
        self.line(format_args!("❌ Aborted by user"));
    }

    /// Announce job `index` (1-based) of `total`.
    pub fn job_starting(&mut self, index: usize, total: usize, job: &JobDescriptor) {
        self.line(format_args!(""));
        self.line(format_args!(
            "🚀 [{index}/{total}] Starting: {}",
            job.selector
        ));
        self.line(format_args!("📝 Description: {}", job.description));
    }

    /// Banner printed right before the process is launched.
    pub fn job_header(&mut self, job: &JobDescriptor, config_path: &Path, command: &str) {
        self.line(format_args!(""));
        self.rule('=');
        self.line(format_args!("EXPERIMENT: {}", job.display_name));
        self.line(format_args!("CONFIG: {}", config_path.display()));
        self.line(format_args!(
            "TIME: {}",
            chrono::Local::now().format("%H:%M:%S")
        ));
        self.line(format_args!("COMMAND: {command}"));
        self.rule('=');
    }

    pub fn preflight_failed(&mut self, job: &JobDescriptor, error: &DispatchError) {
        self.line(format_args!("ERROR: {}: {error}", job.selector));
    }

    pub fn spinner_start(&mut self, job: &JobDescriptor) {
        if !self.show_spinner {
            return;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("{:15}: running", job.selector));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    pub fn spinner_stop(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Status line for a finished job, with any captured metrics or error text.
    pub fn job_result(&mut self, outcome: &JobOutcome, timeout: Duration) {
        let glyph = outcome.status.glyph();
        match outcome.status {
            JobStatus::Success => {
                self.line(format_args!(
                    "{glyph} COMPLETED ({:.1} minutes)",
                    outcome.elapsed_seconds / 60.0
                ));
                for metric in &outcome.captured_metric_lines {
                    self.line(format_args!("  📊 {metric}"));
                }
            }
            JobStatus::Failure => {
                match outcome.exit_code {
                    Some(code) => self.line(format_args!("{glyph} FAILED (code: {code})")),
                    None => self.line(format_args!("{glyph} FAILED (killed by signal)")),
                }
                if let Some(ref stderr) = outcome.stderr_excerpt {
                    self.line(format_args!("Error details: {stderr}..."));
                }
            }
            JobStatus::Timeout => {
                self.line(format_args!(
                    "{glyph} TIMEOUT ({:.1} hours) - SKIPPING",
                    timeout.as_secs_f64() / 3600.0
                ));
            }
            JobStatus::Error => {
                self.line(format_args!(
                    "{glyph} UNEXPECTED ERROR: {}",
                    outcome.error.as_deref().unwrap_or("unknown")
                ));
            }
        }
    }

    /// Progress and ETA after job `index` (1-based) of `total`.
    pub fn progress(&mut self, index: usize, total: usize, outcome: &JobOutcome) {
        let minutes = outcome.elapsed_seconds / 60.0;
        if outcome.status.is_success() {
            self.line(format_args!(
                "✅ SUCCESS: {} completed ({minutes:.1}min)",
                outcome.selector
            ));
        } else {
            self.line(format_args!(
                "❌ {}: {} failed, continuing...",
                outcome.status, outcome.selector
            ));
        }

        let remaining = eta_minutes(total.saturating_sub(index), outcome.elapsed());
        self.line(format_args!("📈 Progress: {index}/{total}"));
        self.line(format_args!(
            "⏳ Est. remaining: {remaining:.1}min ({:.1}h)",
            remaining / 60.0
        ));
    }

    pub fn waiting(&mut self, wait: Duration) {
        self.line(format_args!("⏸️  Waiting {} seconds...", wait.as_secs()));
    }

    /// Final summary of the batch.
    pub fn summary(&mut self, summary: &RunSummary, log_dir: &Path) {
        let minutes = summary.total_elapsed_seconds / 60.0;

        self.line(format_args!(""));
        self.rule('=');
        self.line(format_args!("🎉 SELECTED EXPERIMENTS COMPLETED!"));
        self.line(format_args!(
            "⏱️  Total time: {minutes:.1} minutes ({:.1} hours)",
            minutes / 60.0
        ));
        self.line(format_args!(
            "✅ Completed: {}/{}",
            summary.completed, summary.total
        ));
        self.line(format_args!("❌ Failed: {}/{}", summary.failed, summary.total));
        self.line(format_args!(
            "📊 Success rate: {:.1}%",
            summary.success_rate()
        ));
        self.line(format_args!(""));
        self.line(format_args!(
            "📁 Results saved in: {}/ directory",
            log_dir.display()
        ));
        self.rule('=');
    }

    pub fn report_written(&mut self, path: &Path) {
        self.line(format_args!("📝 Run report written to {}", path.display()));
    }
}

/// Machine-readable record of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session: String,
    pub started_at: String,
    pub finished_at: String,
    pub timeout_secs: u64,
    pub wait_secs: u64,
    pub outcomes: Vec<JobOutcome>,
    pub summary: RunSummary,
    pub success_rate: f64,
}

impl RunReport {
    #[must_use]
    pub fn new(
        session: impl Into<String>,
        started_at: impl Into<String>,
        dry: &DryRunResult,
        outcomes: Vec<JobOutcome>,
        summary: RunSummary,
    ) -> Self {
        Self {
            session: session.into(),
            started_at: started_at.into(),
            finished_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            timeout_secs: dry.timeout.as_secs(),
            wait_secs: dry.wait.as_secs(),
            success_rate: summary.success_rate(),
            outcomes,
            summary,
        }
    }
}

/// Write `report` as pretty JSON, creating parent directories.
pub fn write_report(path: impl AsRef<Path>, report: &RunReport) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::Io(parent.to_path_buf(), e))?;
    }

    let file = std::fs::File::create(path).map_err(|e| ReportError::Io(path.to_path_buf(), e))?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)
        .map_err(|e| ReportError::Serialize(path.to_path_buf(), e.to_string()))
}

/// Errors that can occur when writing the run report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to serialize report {0}: {1}")]
    Serialize(PathBuf, String),
}
