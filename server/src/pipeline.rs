use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    csv::join_record,
    data_source::{ELIGIBILITY_COLUMN, EligibilityRow, INDEXER_COLUMN},
};

pub const RAW_DATA_FILE: &str = "indexer_issuance_eligibility_data.csv";
pub const ELIGIBLE_FILE: &str = "eligible_indexers.csv";
pub const INELIGIBLE_FILE: &str = "ineligible_indexers.csv";

const DATE_DIR_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum PipelineError {
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },
}

/// Splits eligibility rows and keeps a dated copy of every run's inputs and outputs.
#[derive(Debug, Clone)]
pub struct EligibilityPipeline {
    output_dir: PathBuf,
}

impl EligibilityPipeline {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn date_output_directory(&self, run_date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(run_date.format(DATE_DIR_FORMAT).to_string())
    }

    /// Returns `(eligible, ineligible)` indexer addresses in input order and writes the three CSV artifacts.
    pub async fn process(
        &self,
        rows: &[EligibilityRow],
        run_date: NaiveDate,
    ) -> Result<(Vec<String>, Vec<String>), PipelineError> {
        let (eligible, ineligible): (Vec<&EligibilityRow>, Vec<&EligibilityRow>) =
            rows.iter().partition(|row| row.is_eligible());

        let eligible: Vec<String> = eligible.into_iter().map(|r| r.indexer.clone()).collect();
        let ineligible: Vec<String> = ineligible.into_iter().map(|r| r.indexer.clone()).collect();

        let dir = self.date_output_directory(run_date);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_error(&dir, e))?;

        let raw_path = dir.join(RAW_DATA_FILE);
        write_file(&raw_path, &raw_csv(rows)).await?;
        tracing::info!(path = %raw_path.display(), "Saved raw eligibility data");

        let eligible_path = dir.join(ELIGIBLE_FILE);
        write_file(&eligible_path, &indexer_csv(&eligible)).await?;
        tracing::info!(count = eligible.len(), path = %eligible_path.display(), "Saved eligible indexers");

        let ineligible_path = dir.join(INELIGIBLE_FILE);
        write_file(&ineligible_path, &indexer_csv(&ineligible)).await?;
        tracing::info!(count = ineligible.len(), path = %ineligible_path.display(), "Saved ineligible indexers");

        Ok((eligible, ineligible))
    }

    /// Delete dated output directories more than `max_age_days` old. Negative ages disable pruning.
    pub async fn prune_older_than(&self, max_age_days: i64, today: NaiveDate) -> usize {
        if max_age_days < 0 {
            tracing::info!("Negative max age provided, no directories will be removed");
            return 0;
        }

        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.output_dir.display(), error = %e, "Output directory is not readable");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(path = %self.output_dir.display(), error = %e, "Failed to list output directory");
                    break;
                }
            };
            let path = entry.path();
            let is_dir = tokio::fs::metadata(&path)
                .await
                .is_ok_and(|meta| meta.is_dir());
            if !is_dir {
                continue;
            }

            let Some(dir_date) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| NaiveDate::parse_from_str(name, DATE_DIR_FORMAT).ok())
            else {
                tracing::debug!(path = %path.display(), "Skipping non-date directory");
                continue;
            };

            let age_days = (today - dir_date).num_days();
            if age_days > max_age_days {
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), age_days, "Removed old data directory");
                        removed += 1;
                    }
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove old data directory"),
                }
            }
        }

        if removed == 0 {
            tracing::info!("No old data directories found to remove");
        }
        removed
    }
}

fn write_error(path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), PipelineError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| write_error(path, e))
}

fn indexer_csv(indexers: &[String]) -> String {
    let mut out = format!("{INDEXER_COLUMN}\n");
    for indexer in indexers {
        out.push_str(&join_record(&[indexer]));
        out.push('\n');
    }
    out
}

fn raw_csv(rows: &[EligibilityRow]) -> String {
    let extra_columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.extra.keys().map(String::as_str))
        .collect();

    let mut header = vec![INDEXER_COLUMN, ELIGIBILITY_COLUMN];
    header.extend(extra_columns.iter().copied());

    let mut out = join_record(&header);
    out.push('\n');

    for row in rows {
        let mut fields = vec![row.indexer.clone(), row.eligible_for_indexing_rewards.to_string()];
        fields.extend(
            extra_columns
                .iter()
                .map(|column| row.extra.get(*column).cloned().unwrap_or_default()),
        );
        out.push_str(&join_record(&fields));
        out.push('\n');
    }
    out
}
