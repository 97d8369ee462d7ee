//! Subprocess execution for experiment runs.

use std::{
    collections::VecDeque,
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use reid_config::JobDescriptor;
use serde::Serialize;
use tokio::{
    fs::OpenOptions,
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};

use crate::{config::HarnessSettings, report::Reporter};

/// Case-insensitive keywords marking stdout lines worth surfacing.
pub const METRIC_KEYWORDS: &[&str] = &["rank", "map", "accuracy", "best"];

/// Number of trailing stdout lines scanned for metrics.
pub const METRIC_WINDOW_LINES: usize = 20;

/// Maximum number of stderr characters kept on failure.
pub const STDERR_EXCERPT_CHARS: usize = 500;

/// Terminal classification of one experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Exited with code zero.
    Success,
    /// Exited non-zero or was killed by a signal.
    Failure,
    /// Exceeded its timeout and was killed.
    Timeout,
    /// Could not be launched or supervised.
    Error,
}

impl JobStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Failure => "❌",
            Self::Timeout => "⏰",
            Self::Error => "💥",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one experiment run.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub selector: String,
    pub display_name: String,
    pub status: JobStatus,
    pub elapsed_seconds: f64,
    pub exit_code: Option<i32>,
    /// Leading part of stderr, only for failed runs.
    pub stderr_excerpt: Option<String>,
    /// Launch or supervision error, only for `Error` outcomes.
    pub error: Option<String>,
    pub save_dir: Option<PathBuf>,
    pub captured_metric_lines: Vec<String>,
}

impl JobOutcome {
    fn new(job: &JobDescriptor, status: JobStatus, elapsed: Duration) -> Self {
        Self {
            selector: job.selector.to_string(),
            display_name: job.display_name.to_string(),
            status,
            elapsed_seconds: elapsed.as_secs_f64(),
            exit_code: None,
            stderr_excerpt: None,
            error: None,
            save_dir: None,
            captured_metric_lines: Vec::new(),
        }
    }

    /// Outcome for a run that never got going or lost its child process.
    #[must_use]
    pub fn error(job: &JobDescriptor, elapsed: Duration, error: &DispatchError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(job, JobStatus::Error, elapsed)
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_seconds)
    }
}

/// Pick the metric lines out of a run's stdout.
///
/// Only the last [`METRIC_WINDOW_LINES`] lines are scanned, after trailing
/// blank lines are dropped.
#[must_use]
pub fn extract_metric_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut lines: Vec<&str> = lines.into_iter().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    let start = lines.len().saturating_sub(METRIC_WINDOW_LINES);
    lines[start..]
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            METRIC_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .map(|line| (*line).to_string())
        .collect()
}

/// The part of a stdout stream [`extract_metric_lines`] looks at.
///
/// Blank lines are held back until a non-blank line follows them, so a
/// trailing run of blanks never pushes real output out of the window.
#[derive(Debug, Default)]
pub struct StdoutTail {
    lines: VecDeque<String>,
    pending_blank: usize,
}

impl StdoutTail {
    pub fn push(&mut self, line: &str) {
        if line.trim().is_empty() {
            self.pending_blank += 1;
            return;
        }
        let blanks = std::mem::take(&mut self.pending_blank).min(METRIC_WINDOW_LINES);
        for _ in 0..blanks {
            self.keep(String::new());
        }
        self.keep(line.to_string());
    }

    fn keep(&mut self, line: String) {
        if self.lines.len() >= METRIC_WINDOW_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    #[must_use]
    pub fn metric_lines(&self) -> Vec<String> {
        extract_metric_lines(self.lines.iter().map(String::as_str))
    }
}

/// First `max_chars` characters of `text`.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Something that can run one experiment to an outcome.
///
/// Implementations must never fail: every problem becomes a [`JobOutcome`].
pub trait Dispatch {
    fn dispatch<W: Write>(
        &self,
        job: &'static JobDescriptor,
        timeout: Duration,
        reporter: &mut Reporter<W>,
    ) -> impl Future<Output = JobOutcome>;
}

/// Launches experiments as `<interpreter> <entry_script> --config-file ... data.save_dir ...`.
#[derive(Debug, Clone)]
pub struct Runner {
    interpreter: String,
    entry_script: PathBuf,
    config_dir: PathBuf,
    log_dir: PathBuf,
}

impl Runner {
    /// Create a new runner.
    #[must_use]
    pub fn new(
        interpreter: impl Into<String>,
        entry_script: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            entry_script: entry_script.into(),
            config_dir: config_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &HarnessSettings) -> Self {
        Self::new(
            settings.interpreter.clone(),
            settings.entry_script.clone(),
            settings.config_dir.clone(),
            settings.log_dir.clone(),
        )
    }

    /// Path of the YAML config for `job`.
    #[must_use]
    pub fn config_path(&self, job: &JobDescriptor) -> PathBuf {
        self.config_dir.join(job.config_file_name())
    }

    /// Arguments passed to the interpreter.
    #[must_use]
    pub fn to_args(&self, job: &JobDescriptor, save_dir: &Path) -> Vec<String> {
        vec![
            self.entry_script.display().to_string(),
            "--config-file".to_string(),
            self.config_path(job).display().to_string(),
            "data.save_dir".to_string(),
            save_dir.display().to_string(),
        ]
    }

    /// Check that everything the job needs exists before launching it.
    pub fn preflight(&self, job: &JobDescriptor) -> Result<PathBuf, DispatchError> {
        let config_path = self.config_path(job);
        if !config_path.is_file() {
            return Err(DispatchError::MissingConfig(config_path));
        }
        if !self.entry_script.is_file() {
            return Err(DispatchError::MissingEntryScript(self.entry_script.clone()));
        }
        Ok(config_path)
    }

    /// Create a fresh save directory named `<display_name>_<timestamp>`.
    ///
    /// If that name is already taken, `-1`, `-2`, ... is appended until
    /// creation succeeds.
    pub fn claim_save_dir(&self, job: &JobDescriptor) -> Result<PathBuf, DispatchError> {
        std::fs::create_dir_all(&self.log_dir)
            .map_err(|e| DispatchError::SaveDir(self.log_dir.clone(), e))?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{stamp}", job.display_name);

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.log_dir.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(DispatchError::SaveDir(path, e)),
            }
        }
    }

    /// Spawn the experiment as a subprocess.
    pub fn spawn(&self, job: &JobDescriptor, save_dir: &Path) -> Result<Child, DispatchError> {
        let args = self.to_args(job, save_dir);
        tracing::debug!("Spawning: {} {}", self.interpreter, args.join(" "));

        Command::new(&self.interpreter)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::Spawn(job.selector.to_string(), e))
    }

    /// Run `job` to completion, killing it if it outlives `timeout`.
    pub async fn run<W: Write>(
        &self,
        job: &'static JobDescriptor,
        timeout: Duration,
        reporter: &mut Reporter<W>,
    ) -> JobOutcome {
        let start = Instant::now();

        let config_path = match self.preflight(job) {
            Ok(path) => path,
            Err(e) => {
                reporter.preflight_failed(job, &e);
                return JobOutcome::error(job, start.elapsed(), &e);
            }
        };

        let save_dir = match self.claim_save_dir(job) {
            Ok(dir) => dir,
            Err(e) => {
                reporter.preflight_failed(job, &e);
                return JobOutcome::error(job, start.elapsed(), &e);
            }
        };

        let command = format!(
            "{} {}",
            self.interpreter,
            self.to_args(job, &save_dir).join(" ")
        );
        reporter.job_header(job, &config_path, &command);

        let start = Instant::now();
        let mut outcome = match self.spawn(job, &save_dir) {
            Ok(child) => {
                tracing::info!(
                    "Started {} (PID {})",
                    job.selector,
                    child.id().unwrap_or_default()
                );
                reporter.spinner_start(job);
                let outcome = supervise(job, child, &save_dir, timeout, start).await;
                reporter.spinner_stop();
                outcome
            }
            Err(e) => JobOutcome::error(job, start.elapsed(), &e),
        };
        outcome.save_dir = Some(save_dir);

        reporter.job_result(&outcome, timeout);
        outcome
    }
}

impl Dispatch for Runner {
    async fn dispatch<W: Write>(
        &self,
        job: &'static JobDescriptor,
        timeout: Duration,
        reporter: &mut Reporter<W>,
    ) -> JobOutcome {
        self.run(job, timeout, reporter).await
    }
}

/// Wait for `child`, collecting output, and classify how it ended.
///
/// `timeout` bounds both the child's exit and the draining of its output,
/// so a background process that inherited the pipes cannot hold the
/// dispatch open.
async fn supervise(
    job: &JobDescriptor,
    mut child: Child,
    save_dir: &Path,
    timeout: Duration,
    start: Instant,
) -> JobOutcome {
    // Absurd timeouts saturate to roughly thirty years
    let deadline = tokio::time::Instant::now()
        .checked_add(timeout)
        .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(86_400 * 365 * 30));

    let mut stdout_task = child.stdout.take().map(|stdout| {
        let path = save_dir.join("stdout.log");
        tokio::spawn(async move {
            let mut tail = StdoutTail::default();
            drain(stdout, &path, |line| tail.push(line)).await;
            tail.metric_lines()
        })
    });

    // Keep the head of stderr for error reporting
    let mut stderr_task = child.stderr.take().map(|stderr| {
        let path = save_dir.join("stderr.log");
        tokio::spawn(async move {
            let mut head = String::new();
            drain(stderr, &path, |line| {
                if head.chars().count() < STDERR_EXCERPT_CHARS {
                    if !head.is_empty() {
                        head.push('\n');
                    }
                    head.push_str(line);
                }
            })
            .await;
            excerpt(&head, STDERR_EXCERPT_CHARS)
        })
    });

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            abort_tasks(stdout_task, stderr_task);
            return JobOutcome::error(
                job,
                start.elapsed(),
                &DispatchError::Wait(job.selector.to_string(), e),
            );
        }
        Err(_) => {
            tracing::error!(
                "{}: no exit after {}s, killing",
                job.selector,
                timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill {}: {}", job.selector, e);
            }
            // Grandchildren may still hold the pipes open
            abort_tasks(stdout_task, stderr_task);
            return JobOutcome::new(job, JobStatus::Timeout, start.elapsed());
        }
    };

    let drained = tokio::time::timeout_at(deadline, async {
        (
            join_or_default(&mut stdout_task).await,
            join_or_default(&mut stderr_task).await,
        )
    })
    .await;

    let Ok((metrics, stderr)) = drained else {
        tracing::error!(
            "{} exited with {} but its output was still open after {}s",
            job.selector,
            status,
            timeout.as_secs()
        );
        abort_tasks(stdout_task, stderr_task);
        return JobOutcome::new(job, JobStatus::Timeout, start.elapsed());
    };
    let elapsed = start.elapsed();

    if status.success() {
        JobOutcome {
            exit_code: status.code(),
            captured_metric_lines: metrics,
            ..JobOutcome::new(job, JobStatus::Success, elapsed)
        }
    } else {
        tracing::warn!("{} exited with {}", job.selector, status);
        JobOutcome {
            exit_code: status.code(),
            stderr_excerpt: (!stderr.is_empty()).then_some(stderr),
            ..JobOutcome::new(job, JobStatus::Failure, elapsed)
        }
    }
}

async fn join_or_default<T: Default>(task: &mut Option<JoinHandle<T>>) -> T {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => T::default(),
    }
}

fn abort_tasks<A, B>(stdout_task: Option<JoinHandle<A>>, stderr_task: Option<JoinHandle<B>>) {
    if let Some(task) = stdout_task {
        task.abort();
    }
    if let Some(task) = stderr_task {
        task.abort();
    }
}

/// Read `stream` line by line until EOF, appending every line to `log_path`.
async fn drain<R: AsyncRead + Unpin>(stream: R, log_path: &Path, mut on_line: impl FnMut(&str)) {
    let mut reader = BufReader::new(stream);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await
        .ok();

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Stopped reading output for {}: {}", log_path.display(), e);
                break;
            }
        }
        if let Some(ref mut f) = file {
            let _ = f.write_all(&buf).await;
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(&['\n', '\r'][..]));
    }

    if let Some(ref mut f) = file {
        let _ = f.flush().await;
    }
}

/// Errors that can occur when launching or supervising a run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("config file {} not found", .0.display())]
    MissingConfig(PathBuf),
    #[error("entry script {} not found", .0.display())]
    MissingEntryScript(PathBuf),
    #[error("failed to create save directory {}: {}", .0.display(), .1)]
    SaveDir(PathBuf, std::io::Error),
    #[error("failed to spawn process for {0}: {1}")]
    Spawn(String, std::io::Error),
    #[error("failed waiting for {0}: {1}")]
    Wait(String, std::io::Error),
}
