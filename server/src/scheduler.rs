use std::{
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use oracle_core::retry::{RetryPolicy, retry_with_backoff};
use oracle_executors::webhook::{FailureReport, Notifier};

use crate::{
    circuit_breaker::CircuitBreaker,
    config::{ConfigError, OracleConfig},
    oracle::OracleRunner,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const LAST_RUN_FORMAT: &str = "%Y-%m-%d";

/// Whole-run retry budget: 5 attempts, 60 s growing to 600 s.
pub fn run_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_delay_ms: 60_000,
        max_delay_ms: 600_000,
        backoff_factor: 2.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// Too many recent failures. The process should stop and let an operator look.
    CircuitOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupted,
    CircuitOpen,
}

/// First occurrence of `run_time` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, run_time: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_time).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Days skipped since the last successful run, when more than yesterday's run is missing.
pub fn missed_runs(last_run: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    let last_run = last_run?;
    let missed = (today - last_run).num_days() - 1;
    (missed >= 1).then_some(missed)
}

pub async fn read_last_run_date(path: &Path) -> Option<NaiveDate> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => NaiveDate::parse_from_str(contents.trim(), LAST_RUN_FORMAT)
            .inspect_err(|e| tracing::error!(error = %e, "Error parsing last run date"))
            .ok(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::error!(error = %e, "Error reading last run date");
            None
        }
    }
}

pub async fn save_last_run_date(path: &Path, run_date: NaiveDate) {
    let contents = run_date.format(LAST_RUN_FORMAT).to_string();
    if let Err(e) = write_state_file(path, contents).await {
        tracing::error!(path = %path.display(), error = %e, "Error saving last run date");
    }
}

pub async fn update_healthcheck(path: &Path, message: &str) {
    let contents = format!("Last update: {}\n{message}", Utc::now().to_rfc3339());
    if let Err(e) = write_state_file(path, contents).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to update healthcheck file");
    }
}

async fn write_state_file(path: &Path, contents: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}

/// Runs the oracle once a day and keeps the on-disk run state current.
pub struct Scheduler<R, N> {
    runner: R,
    notifier: N,
    breaker: CircuitBreaker,
    run_time: NaiveTime,
    run_on_startup: bool,
    last_run_file: PathBuf,
    healthcheck_file: PathBuf,
    retry_policy: RetryPolicy,
}

impl<R: OracleRunner, N: Notifier> Scheduler<R, N> {
    pub fn from_config(config: &OracleConfig, runner: R, notifier: N) -> Result<Self, ConfigError> {
        Ok(Self {
            runner,
            notifier,
            breaker: CircuitBreaker::new(
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.window_minutes,
                config.circuit_breaker.log_file.clone(),
            ),
            run_time: config.scheduled_run_time()?,
            run_on_startup: config.scheduling.run_on_startup,
            last_run_file: config.scheduling.last_run_file.clone(),
            healthcheck_file: config.scheduling.healthcheck_file.clone(),
            retry_policy: run_retry_policy(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run for `run_date`, retrying the whole run, and record the outcome.
    pub async fn run_once(&self, run_date: NaiveDate, stage: &str) -> RunOutcome {
        if !self.breaker.check().await {
            let report = FailureReport {
                error_message: format!(
                    "Circuit breaker is open after repeated failures. Halting until {} is cleared.",
                    self.breaker.log_file().display()
                ),
                stage: "Circuit Breaker".to_string(),
                ..FailureReport::default()
            };
            if let Err(e) = self.notifier.notify_failure(&report).await {
                tracing::error!(error = %e, "Failed to send circuit breaker notification");
            }
            return RunOutcome::CircuitOpen;
        }

        let started = Instant::now();
        let result = retry_with_backoff(
            &self.retry_policy,
            "oracle_run",
            |_| true,
            || self.runner.run(run_date),
        )
        .await;

        match result {
            Ok(summary) => {
                save_last_run_date(&self.last_run_file, run_date).await;
                let message = format!(
                    "Run completed successfully for {run_date}. Duration: {:.2}s",
                    summary.execution_time.as_secs_f64()
                );
                tracing::info!(%run_date, "{message}");
                update_healthcheck(&self.healthcheck_file, &message).await;
                self.breaker.reset().await;
                RunOutcome::Completed
            }
            Err(e) => {
                tracing::error!(%run_date, error = %e, "Run failed after all retries");
                update_healthcheck(&self.healthcheck_file, &format!("ERROR: Run failed due to: {e}"))
                    .await;
                self.breaker.record_failure().await;

                let report = FailureReport {
                    error_message: e.to_string(),
                    stage: stage.to_string(),
                    execution_time: Some(started.elapsed()),
                    ..FailureReport::default()
                };
                if let Err(e) = self.notifier.notify_failure(&report).await {
                    tracing::error!(error = %e, "Failed to send failure notification");
                }
                RunOutcome::Failed
            }
        }
    }

    /// When yesterday's run (or more) is missing, announce it and run for yesterday only.
    pub async fn check_missed_runs(&self, today: NaiveDate) -> Option<RunOutcome> {
        let last_run = read_last_run_date(&self.last_run_file).await;
        let Some(missed) = missed_runs(last_run, today) else {
            if last_run.is_none() {
                tracing::info!("No record of previous runs. Will run at next scheduled time");
            }
            return None;
        };

        let last_run = last_run?;
        let yesterday = today.pred_opt()?;
        tracing::warn!(missed, %last_run, "Detected missed runs");

        let message = format!(
            "Detected {missed} missed oracle runs. Last successful run was on {last_run}. Attempting to execute missed run for yesterday."
        );
        if let Err(e) = self.notifier.notify_info(&message, "Missed Runs Detected").await {
            tracing::warn!(error = %e, "Failed to send missed run notification");
        }

        Some(
            self.run_once(yesterday, &format!("Missed Run ({yesterday})"))
                .await,
        )
    }

    /// Drive the daily schedule until `shutdown` resolves or the circuit breaker opens.
    /// `shutdown` is also watched while a run and its retry backoff are in flight.
    pub async fn start(self, shutdown: impl Future<Output = ()>) -> Shutdown {
        tokio::pin!(shutdown);

        let startup_message = format!(
            "Service Quality Oracle scheduler started successfully.\nScheduled time: {} UTC",
            self.run_time.format("%H:%M")
        );
        if let Err(e) = self.notifier.notify_info(&startup_message, "Scheduler Started").await {
            tracing::warn!(error = %e, "Failed to send startup notification");
        }
        update_healthcheck(&self.healthcheck_file, "Scheduler initialized").await;

        let today = Utc::now().date_naive();
        let startup = async {
            if self.run_on_startup {
                tracing::info!("Run on startup enabled, executing oracle immediately");
                Some(self.run_once(today, "Scheduled Run").await)
            } else {
                self.check_missed_runs(today).await
            }
        };
        let startup_outcome = tokio::select! {
            biased;
            _ = &mut shutdown => return self.stopped().await,
            outcome = startup => outcome,
        };
        if startup_outcome == Some(RunOutcome::CircuitOpen) {
            return Shutdown::CircuitOpen;
        }

        loop {
            let next_run = next_run_after(Utc::now(), self.run_time);
            tracing::info!(%next_run, "Waiting for next scheduled run");

            loop {
                let now = Utc::now();
                if now >= next_run {
                    break;
                }
                let wait = (next_run - now)
                    .to_std()
                    .unwrap_or_default()
                    .min(HEARTBEAT_INTERVAL);

                tokio::select! {
                    biased;
                    _ = &mut shutdown => return self.stopped().await,
                    _ = tokio::time::sleep(wait) => {
                        update_healthcheck(&self.healthcheck_file, "Scheduler heartbeat").await;
                    }
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => return self.stopped().await,
                outcome = self.run_once(next_run.date_naive(), "Scheduled Run") => outcome,
            };
            if outcome == RunOutcome::CircuitOpen {
                return Shutdown::CircuitOpen;
            }
        }
    }

    async fn stopped(&self) -> Shutdown {
        tracing::info!("Scheduler stopped by user");
        if let Err(e) = self
            .notifier
            .notify_info("Scheduler stopped by user interrupt", "Scheduler Stopped")
            .await
        {
            tracing::warn!(error = %e, "Failed to send shutdown notification");
        }
        Shutdown::Interrupted
    }
}
