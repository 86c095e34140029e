use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tokio::io::AsyncWriteExt;

/// Stops a restart loop from hammering the chain when every run fails the same way.
///
/// Failures are persisted as RFC 3339 timestamps, one per line, so the count
/// survives process restarts. I/O problems are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    window: Duration,
    log_file: PathBuf,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, window_minutes: i64, log_file: impl Into<PathBuf>) -> Self {
        Self {
            failure_threshold,
            window: Duration::minutes(window_minutes),
            log_file: log_file.into(),
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// `true` when it is safe to proceed.
    pub async fn check(&self) -> bool {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> bool {
        let window_start = now - self.window;
        let recent = self
            .failure_timestamps()
            .await
            .into_iter()
            .filter(|ts| *ts > window_start)
            .count();

        if recent >= self.failure_threshold && recent > 0 {
            tracing::error!(
                recent_failures = recent,
                window_minutes = self.window.num_minutes(),
                threshold = self.failure_threshold,
                "CIRCUIT BREAKER OPEN. Halting execution"
            );
            return false;
        }

        tracing::info!(recent_failures = recent, "Circuit breaker is closed");
        true
    }

    pub async fn record_failure(&self) {
        self.record_failure_at(Utc::now()).await
    }

    pub async fn record_failure_at(&self, at: DateTime<Utc>) {
        match self.append_failure(at).await {
            Ok(()) => tracing::warn!("Circuit breaker recorded a failure"),
            Err(e) => tracing::error!(
                path = %self.log_file.display(),
                error = %e,
                "Failed to record failure to circuit breaker log"
            ),
        }
    }

    async fn append_failure(&self, at: DateTime<Utc>) -> std::io::Result<()> {
        if let Some(parent) = self.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .await?;
        file.write_all(format!("{}\n", at.to_rfc3339()).as_bytes())
            .await?;
        file.flush().await
    }

    pub async fn reset(&self) {
        match tokio::fs::remove_file(&self.log_file).await {
            Ok(()) => tracing::info!("Circuit breaker reset after a successful run"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                path = %self.log_file.display(),
                error = %e,
                "Failed to reset circuit breaker log"
            ),
        }
    }

    async fn failure_timestamps(&self) -> Vec<DateTime<Utc>> {
        let contents = match tokio::fs::read_to_string(&self.log_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!(path = %self.log_file.display(), error = %e, "Error reading circuit breaker log");
                return Vec::new();
            }
        };

        let parsed: Result<Vec<_>, _> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| DateTime::parse_from_rfc3339(line).map(|ts| ts.with_timezone(&Utc)))
            .collect();

        parsed.unwrap_or_else(|e| {
            tracing::error!(path = %self.log_file.display(), error = %e, "Error parsing circuit breaker log");
            Vec::new()
        })
    }
}
