use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MESSAGE_TITLE_PREFIX: &str = "Service Quality Oracle";
const FOOTER: &str = "Service Quality Oracle";
const MAX_ERROR_CHARS: usize = 1000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentColor {
    Good,
    Danger,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl SlackField {
    fn short(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: true,
        }
    }

    fn long(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlackAttachment {
    pub color: AttachmentColor,
    pub fields: Vec<SlackField>,
    pub footer: String,
    pub ts: i64,
}

/// Incoming-webhook message body: a headline plus one coloured attachment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlackMessage {
    pub text: String,
    pub attachments: Vec<SlackAttachment>,
}

impl SlackMessage {
    fn new(title: &str, color: AttachmentColor, fields: Vec<SlackField>) -> Self {
        Self {
            text: format!("{MESSAGE_TITLE_PREFIX} - {title}"),
            attachments: vec![SlackAttachment {
                color,
                fields,
                footer: FOOTER.to_string(),
                ts: chrono::Utc::now().timestamp(),
            }],
        }
    }
}

/// Summary of a completed oracle run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessReport {
    pub eligible_indexers: usize,
    pub total_processed: usize,
    pub execution_time: Option<Duration>,
    pub transaction_links: Vec<String>,
}

/// What is known about a run at the point it failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureReport {
    pub error_message: String,
    pub stage: String,
    pub execution_time: Option<Duration>,
    pub indexers_processed: Option<usize>,
    pub partial_transaction_links: Vec<String>,
}

fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_seconds(duration: Duration) -> String {
    format!("{:.2} seconds", duration.as_secs_f64())
}

fn numbered_links(links: &[String]) -> String {
    links
        .iter()
        .enumerate()
        .map(|(i, link)| format!("Batch {}: {link}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut an error message down to a readable size, on a char boundary.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() > MAX_ERROR_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_CHARS).collect();
        format!("{truncated}...")
    } else {
        message.to_string()
    }
}

pub fn success_message(report: &SuccessReport) -> SlackMessage {
    let mut fields = vec![
        SlackField::short("Status", "Successfully completed"),
        SlackField::short("Timestamp", timestamp_now()),
        SlackField::short("Eligible Indexers", report.eligible_indexers.to_string()),
        SlackField::short("Total Processed", report.total_processed.to_string()),
    ];

    if let Some(execution_time) = report.execution_time {
        fields.push(SlackField::short(
            "Execution Time",
            format_seconds(execution_time),
        ));
    }

    if !report.transaction_links.is_empty() {
        fields.push(SlackField::short(
            "Transaction Batches",
            report.transaction_links.len().to_string(),
        ));
        fields.push(SlackField::long(
            "Transactions",
            numbered_links(&report.transaction_links),
        ));
    }

    SlackMessage::new("Success", AttachmentColor::Good, fields)
}

pub fn failure_message(report: &FailureReport) -> SlackMessage {
    let mut fields = vec![
        SlackField::short("Status", "Failed"),
        SlackField::short("Timestamp", timestamp_now()),
        SlackField::short("Failed Stage", report.stage.clone()),
    ];

    if let Some(execution_time) = report.execution_time {
        fields.push(SlackField::short("Runtime", format_seconds(execution_time)));
    }

    if let Some(processed) = report.indexers_processed.filter(|n| *n > 0) {
        fields.push(SlackField::short("Indexers Processed", processed.to_string()));
    }

    if !report.partial_transaction_links.is_empty() {
        fields.push(SlackField::long(
            "Partial Transactions",
            numbered_links(&report.partial_transaction_links),
        ));
    }

    fields.push(SlackField::long(
        "Error",
        format!("```{}```", truncate_error(&report.error_message)),
    ));

    SlackMessage::new("FAILURE", AttachmentColor::Danger, fields)
}

pub fn info_message(message: &str, title: &str) -> SlackMessage {
    let fields = vec![
        SlackField::long("Message", message),
        SlackField::short("Timestamp", timestamp_now()),
    ];

    SlackMessage::new(title, AttachmentColor::Good, fields)
}
