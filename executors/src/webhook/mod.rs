use std::future::Future;
use std::time::Duration;

use oracle_core::retry::{RetryPolicy, retry_with_backoff};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::webhook::envelope::{SlackMessage, failure_message, info_message, success_message};

pub mod envelope;

pub use envelope::{FailureReport, SuccessReport};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BODY_PREVIEW: usize = 512;

/// Retry budget for webhook delivery.
pub fn slack_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 8,
        initial_delay_ms: 1_000,
        max_delay_ms: 128_000,
        backoff_factor: 2.0,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, thiserror::Error)]
#[serde(
    rename_all = "SCREAMING_SNAKE_CASE",
    tag = "errorCode",
    content = "message"
)]
pub enum NotifierError {
    #[error("Network error during notification dispatch: {0}")]
    Network(String),

    #[error("Failed to construct notification request: {0}")]
    RequestConstruction(String),

    #[error("Notification request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error from endpoint: status {status}, body: {body_preview}")]
    Http { status: u16, body_preview: String },
}

impl NotifierError {
    fn is_retryable(&self) -> bool {
        match self {
            NotifierError::Network(_) | NotifierError::Timeout(_) => true,
            NotifierError::Http { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            NotifierError::RequestConstruction(_) => false,
        }
    }
}

/// Fire-and-forget observability sink.
///
/// Callers log and discard errors; a failed notification never fails the operation it reports on.
pub trait Notifier: Send + Sync {
    fn notify_info(
        &self,
        message: &str,
        title: &str,
    ) -> impl Future<Output = Result<(), NotifierError>> + Send;

    fn notify_success(
        &self,
        report: &SuccessReport,
    ) -> impl Future<Output = Result<(), NotifierError>> + Send;

    fn notify_failure(
        &self,
        report: &FailureReport,
    ) -> impl Future<Output = Result<(), NotifierError>> + Send;
}

/// A missing notifier silently accepts everything.
impl<N: Notifier> Notifier for Option<N> {
    async fn notify_info(&self, message: &str, title: &str) -> Result<(), NotifierError> {
        match self {
            Some(notifier) => notifier.notify_info(message, title).await,
            None => Ok(()),
        }
    }

    async fn notify_success(&self, report: &SuccessReport) -> Result<(), NotifierError> {
        match self {
            Some(notifier) => notifier.notify_success(report).await,
            None => Ok(()),
        }
    }

    async fn notify_failure(&self, report: &FailureReport) -> Result<(), NotifierError> {
        match self {
            Some(notifier) => notifier.notify_failure(report).await,
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlackNotifier {
    http_client: reqwest::Client,
    webhook_url: String,
    retry_policy: RetryPolicy,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Result<Self, NotifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::RequestConstruction(e.to_string()))?;

        Ok(Self {
            http_client,
            webhook_url: webhook_url.trim().to_string(),
            retry_policy: slack_retry_policy(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    async fn send_message(&self, message: &SlackMessage) -> Result<(), NotifierError> {
        tracing::info!(message_type = %message.text, "Sending Slack notification");

        retry_with_backoff(
            &self.retry_policy,
            "slack_notification",
            NotifierError::is_retryable,
            || self.post_once(message),
        )
        .await
        .inspect(|_| tracing::info!("Slack notification sent successfully"))
        .inspect_err(|e| tracing::error!(error = %e, "Failed to send Slack notification"))
    }

    async fn post_once(&self, message: &SlackMessage) -> Result<(), NotifierError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Timeout(e.to_string())
                } else if e.is_connect() || e.is_request() {
                    NotifierError::Network(e.to_string())
                } else {
                    NotifierError::RequestConstruction(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_preview = response
            .text()
            .await
            .map(|body| {
                if body.len() > MAX_BODY_PREVIEW {
                    let cut: String = body.chars().take(MAX_BODY_PREVIEW).collect();
                    format!("{cut}...")
                } else {
                    body
                }
            })
            .unwrap_or_else(|_| "No body or failed to read body".to_string());

        tracing::warn!(status = ?status, "Slack webhook returned an error status");

        Err(NotifierError::Http {
            status: status.as_u16(),
            body_preview,
        })
    }
}

impl Notifier for SlackNotifier {
    async fn notify_info(&self, message: &str, title: &str) -> Result<(), NotifierError> {
        self.send_message(&info_message(message, title)).await
    }

    async fn notify_success(&self, report: &SuccessReport) -> Result<(), NotifierError> {
        self.send_message(&success_message(report)).await
    }

    async fn notify_failure(&self, report: &FailureReport) -> Result<(), NotifierError> {
        self.send_message(&failure_message(report)).await
    }
}

/// Build a notifier from an optional webhook URL. Blank or missing URLs disable notifications.
pub fn create_slack_notifier(webhook_url: Option<&str>) -> Option<SlackNotifier> {
    match webhook_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => match SlackNotifier::new(url) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create Slack notifier");
                None
            }
        },
        None => {
            tracing::info!("No Slack webhook URL provided - Slack notifications disabled");
            None
        }
    }
}
