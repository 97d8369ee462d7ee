//! Sequential batch execution.

use std::{
    io::Write,
    time::{Duration, Instant},
};

use reid_config::JobDescriptor;
use serde::Serialize;

use crate::{
    plan::ResolvedPlan,
    report::Reporter,
    runner::{Dispatch, JobOutcome},
};

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Not started yet.
    Pending,
    /// Job at this plan index is running.
    Running(usize),
    /// Every planned job has an outcome.
    Done,
    /// Declined before any job started.
    Aborted,
}

/// Runs a plan one job at a time.
pub struct Scheduler<D> {
    jobs: Vec<&'static JobDescriptor>,
    dispatcher: D,
    timeout: Duration,
    wait: Duration,
    state: BatchState,
}

/// What a batch would run, without running it.
#[derive(Debug, Clone)]
pub struct DryRunResult {
    pub jobs: Vec<&'static JobDescriptor>,
    pub timeout: Duration,
    pub wait: Duration,
}

impl DryRunResult {
    /// Estimated batch time if every job runs up to its timeout.
    ///
    /// Inter-job pauses are not counted.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let n = u32::try_from(self.jobs.len()).unwrap_or(u32::MAX);
        self.timeout.saturating_mul(n)
    }
}

/// Counts derived from the outcome list at the end of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_elapsed_seconds: f64,
}

impl RunSummary {
    #[must_use]
    pub fn from_outcomes(outcomes: &[JobOutcome], elapsed: Duration) -> Self {
        let completed = outcomes.iter().filter(|o| o.status.is_success()).count();
        Self {
            total: outcomes.len(),
            completed,
            failed: outcomes.len() - completed,
            total_elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    /// Percentage of jobs that succeeded; zero for an empty batch.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Outcomes of a finished batch, in plan order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcomes: Vec<JobOutcome>,
    pub summary: RunSummary,
}

impl<D: Dispatch> Scheduler<D> {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(plan: &ResolvedPlan, dispatcher: D, timeout: Duration, wait: Duration) -> Self {
        Self {
            jobs: plan.jobs.clone(),
            dispatcher,
            timeout,
            wait,
            state: BatchState::Pending,
        }
    }

    #[must_use]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Describe the batch without dispatching anything.
    #[must_use]
    pub fn dry_run(&self) -> DryRunResult {
        DryRunResult {
            jobs: self.jobs.clone(),
            timeout: self.timeout,
            wait: self.wait,
        }
    }

    /// Cancel a batch that has not started.
    pub fn abort(&mut self) -> Result<(), SchedulerError> {
        if self.state != BatchState::Pending {
            return Err(SchedulerError::NotPending(self.state));
        }
        self.state = BatchState::Aborted;
        Ok(())
    }

    /// Run every job in plan order.
    ///
    /// A failed job never stops the batch; its outcome is recorded and the
    /// next job starts after the inter-job pause.
    pub async fn run<W: Write>(
        &mut self,
        reporter: &mut Reporter<W>,
    ) -> Result<BatchResult, SchedulerError> {
        if self.state != BatchState::Pending {
            return Err(SchedulerError::NotPending(self.state));
        }

        let start = Instant::now();
        let total = self.jobs.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, &job) in self.jobs.iter().enumerate() {
            self.state = BatchState::Running(i);
            reporter.job_starting(i + 1, total, job);

            let outcome = self
                .dispatcher
                .dispatch(job, self.timeout, &mut *reporter)
                .await;
            if outcome.status.is_success() {
                tracing::info!("{} completed in {:.1}s", job.selector, outcome.elapsed_seconds);
            } else {
                tracing::warn!("{} finished with {}", job.selector, outcome.status);
            }
            reporter.progress(i + 1, total, &outcome);
            outcomes.push(outcome);

            if i + 1 < total && !self.wait.is_zero() {
                reporter.waiting(self.wait);
                tokio::time::sleep(self.wait).await;
            }
        }

        self.state = BatchState::Done;
        let summary = RunSummary::from_outcomes(&outcomes, start.elapsed());
        Ok(BatchResult { outcomes, summary })
    }
}

/// Errors that can occur during scheduling.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("batch already left the pending state ({0:?})")]
    NotPending(BatchState),
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use reid_config::Registry;

    use super::*;
    use crate::{plan::resolve, runner::JobStatus};

    /// Returns a fixed status per selector and records dispatch order.
    #[derive(Default)]
    struct ScriptedDispatcher {
        statuses: Vec<(&'static str, JobStatus)>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl ScriptedDispatcher {
        fn with(statuses: &[(&'static str, JobStatus)]) -> Self {
            Self {
                statuses: statuses.to_vec(),
                calls: RefCell::default(),
            }
        }
    }

    impl Dispatch for ScriptedDispatcher {
        async fn dispatch<W: Write>(
            &self,
            job: &'static JobDescriptor,
            _timeout: Duration,
            _reporter: &mut Reporter<W>,
        ) -> JobOutcome {
            self.calls.borrow_mut().push(job.selector);
            let status = self
                .statuses
                .iter()
                .find(|(s, _)| *s == job.selector)
                .map_or(JobStatus::Success, |(_, status)| *status);
            JobOutcome {
                selector: job.selector.to_string(),
                display_name: job.display_name.to_string(),
                status,
                elapsed_seconds: 60.0,
                exit_code: (status == JobStatus::Failure).then_some(1),
                stderr_excerpt: None,
                error: None,
                save_dir: None,
                captured_metric_lines: Vec::new(),
            }
        }
    }

    fn plan(selectors: &[&str]) -> ResolvedPlan {
        resolve(&Registry::builtin(), selectors)
    }

    #[tokio::test]
    async fn test_runs_in_plan_order() {
        let plan = plan(&["quick"]);
        let mut scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(1),
            Duration::ZERO,
        );
        let mut reporter = Reporter::new(Vec::new());

        let result = scheduler.run(&mut reporter).await.unwrap();

        assert_eq!(
            *scheduler.dispatcher.calls.borrow(),
            vec!["baseline", "osnet", "triplet"]
        );
        let order: Vec<_> = result.outcomes.iter().map(|o| o.selector.as_str()).collect();
        assert_eq!(order, ["baseline", "osnet", "triplet"]);
        assert_eq!(scheduler.state(), BatchState::Done);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_batch() {
        let plan = plan(&["baseline", "osnet", "triplet", "best"]);
        let dispatcher = ScriptedDispatcher::with(&[
            ("baseline", JobStatus::Failure),
            ("osnet", JobStatus::Timeout),
            ("triplet", JobStatus::Error),
        ]);
        let mut scheduler =
            Scheduler::new(&plan, dispatcher, Duration::from_secs(1), Duration::ZERO);
        let mut reporter = Reporter::new(Vec::new());

        let result = scheduler.run(&mut reporter).await.unwrap();

        assert_eq!(result.outcomes.len(), 4);
        assert_eq!(result.outcomes[1].status, JobStatus::Timeout);
        assert_eq!(result.outcomes[3].status, JobStatus::Success);
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.completed, 1);
        assert_eq!(result.summary.failed, 3);
        assert!((result.summary.success_rate() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let plan = plan(&["core"]);
        let mut scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(1),
            Duration::ZERO,
        );
        let mut reporter = Reporter::new(Vec::new());

        let result = scheduler.run(&mut reporter).await.unwrap();

        assert_eq!(result.summary.completed, plan.len());
        assert_eq!(result.summary.failed, 0);
        assert!((result.summary.success_rate() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let plan = plan(&["unknown_token"]);
        let mut scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(1),
            Duration::from_secs(10),
        );
        let mut reporter = Reporter::new(Vec::new());

        let result = scheduler.run(&mut reporter).await.unwrap();

        assert!(result.outcomes.is_empty());
        assert!(scheduler.dispatcher.calls.borrow().is_empty());
        assert_eq!(result.summary.total, 0);
        assert!(result.summary.success_rate().abs() < f64::EPSILON);
        assert_eq!(scheduler.state(), BatchState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_only_between_jobs() {
        let plan = plan(&["quick"]);
        let mut scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(1),
            Duration::from_secs(10),
        );
        let mut reporter = Reporter::new(Vec::new());

        let before = tokio::time::Instant::now();
        scheduler.run(&mut reporter).await.unwrap();
        let paused = before.elapsed();

        assert!(paused >= Duration::from_secs(20), "paused {paused:?}");
        assert!(paused < Duration::from_secs(30), "paused {paused:?}");
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out.matches("Waiting 10 seconds").count(), 2);
    }

    #[test]
    fn test_dry_run_dispatches_nothing() {
        let plan = plan(&["architecture"]);
        let scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(3600),
            Duration::from_secs(10),
        );

        let dry = scheduler.dry_run();

        assert_eq!(dry.jobs.len(), 4);
        assert_eq!(dry.worst_case(), Duration::from_secs(4 * 3600));
        assert!(scheduler.dispatcher.calls.borrow().is_empty());
        assert_eq!(scheduler.state(), BatchState::Pending);
    }

    #[test]
    fn test_worst_case_ignores_pauses() {
        let quick = plan(&["quick"]);
        let dry = Scheduler::new(
            &quick,
            ScriptedDispatcher::default(),
            Duration::from_secs(14400),
            Duration::from_secs(600),
        )
        .dry_run();
        assert_eq!(dry.worst_case(), Duration::from_secs(3 * 14400));

        let empty = plan(&[]);
        let dry = Scheduler::new(
            &empty,
            ScriptedDispatcher::default(),
            Duration::from_secs(14400),
            Duration::from_secs(600),
        )
        .dry_run();
        assert_eq!(dry.worst_case(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_abort_before_start() {
        let plan = plan(&["quick"]);
        let mut scheduler = Scheduler::new(
            &plan,
            ScriptedDispatcher::default(),
            Duration::from_secs(1),
            Duration::ZERO,
        );
        let mut reporter = Reporter::new(Vec::new());

        scheduler.abort().unwrap();

        assert_eq!(scheduler.state(), BatchState::Aborted);
        assert!(matches!(
            scheduler.run(&mut reporter).await,
            Err(SchedulerError::NotPending(BatchState::Aborted))
        ));
        assert!(scheduler.dispatcher.calls.borrow().is_empty());
    }

    #[test]
    fn test_summary_from_outcomes() {
        assert_eq!(
            RunSummary::from_outcomes(&[], Duration::ZERO),
            RunSummary::default()
        );
        assert!(RunSummary::default().success_rate().abs() < f64::EPSILON);
    }
}
