pub mod submission;
pub mod webhook;

pub use submission::{BatchRequest, BatchResult, SubmissionConfig, SubmissionEngine};
pub use webhook::{Notifier, SlackNotifier, create_slack_notifier};
