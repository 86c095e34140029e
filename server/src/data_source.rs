use std::{collections::BTreeMap, future::Future, path::PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::csv::{is_blank, read_records};

pub const INDEXER_COLUMN: &str = "indexer";
pub const ELIGIBILITY_COLUMN: &str = "eligible_for_indexing_rewards";
/// Optional per-row date. When present, rows outside the requested window are dropped.
pub const DATE_COLUMN: &str = "day";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum DataSourceError {
    #[error("Failed to read eligibility data from {path}: {message}")]
    Io { path: String, message: String },

    #[error("Eligibility data is missing required columns {missing:?}. Found columns: {found:?}")]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Malformed eligibility data at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// One indexer's eligibility result as exported by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityRow {
    pub indexer: String,
    pub eligible_for_indexing_rewards: i64,
    /// Every other exported column, kept for the raw output artifact.
    pub extra: BTreeMap<String, String>,
}

impl EligibilityRow {
    pub fn is_eligible(&self) -> bool {
        self.eligible_for_indexing_rewards == 1
    }
}

/// Numeric eligibility flag. Anything that is not a whole number counts as 0.
pub fn coerce_eligibility(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => value as i64,
        _ => 0,
    }
}

pub trait EligibilityDataSource: Send + Sync {
    /// Rows covering the inclusive date window `[start, end]`.
    fn fetch_eligibility_rows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<EligibilityRow>, DataSourceError>> + Send;
}

/// Reads a CSV export of the eligibility query.
#[derive(Debug, Clone)]
pub struct CsvExportSource {
    path: PathBuf,
}

impl CsvExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl EligibilityDataSource for CsvExportSource {
    async fn fetch_eligibility_rows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EligibilityRow>, DataSourceError> {
        tracing::info!(
            path = %self.path.display(),
            %start,
            %end,
            "Fetching eligibility data"
        );

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DataSourceError::Io {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        let rows = parse_export(&contents, start, end)?;
        tracing::info!(rows = rows.len(), "Fetched eligibility data");
        Ok(rows)
    }
}

pub fn parse_export(
    contents: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<EligibilityRow>, DataSourceError> {
    let records = read_records(contents).map_err(|line| DataSourceError::Malformed {
        line,
        message: "unterminated quote".into(),
    })?;
    let mut records = records.into_iter().filter(|(_, fields)| !is_blank(fields));

    let Some((_, header)) = records.next() else {
        return Err(DataSourceError::MissingColumns {
            missing: vec![INDEXER_COLUMN.into(), ELIGIBILITY_COLUMN.into()],
            found: Vec::new(),
        });
    };
    let header: Vec<String> = header.into_iter().map(|name| name.trim().to_string()).collect();

    let position = |name: &str| header.iter().position(|h| h == name);
    let (indexer_idx, eligibility_idx) = match (position(INDEXER_COLUMN), position(ELIGIBILITY_COLUMN)) {
        (Some(i), Some(e)) => (i, e),
        (i, e) => {
            let mut missing = Vec::new();
            if i.is_none() {
                missing.push(INDEXER_COLUMN.to_string());
            }
            if e.is_none() {
                missing.push(ELIGIBILITY_COLUMN.to_string());
            }
            return Err(DataSourceError::MissingColumns {
                missing,
                found: header.clone(),
            });
        }
    };
    let date_idx = position(DATE_COLUMN);

    let mut rows = Vec::new();
    for (line_number, fields) in records {
        if fields.len() != header.len() {
            return Err(DataSourceError::Malformed {
                line: line_number,
                message: format!("expected {} fields, found {}", header.len(), fields.len()),
            });
        }

        if let Some(date_idx) = date_idx {
            match NaiveDate::parse_from_str(fields[date_idx].trim(), "%Y-%m-%d") {
                Ok(day) if day < start || day > end => continue,
                Ok(_) => {}
                Err(_) => tracing::debug!(line = line_number, "Row has no parseable date, keeping it"),
            }
        }

        let extra = header
            .iter()
            .zip(&fields)
            .enumerate()
            .filter(|(i, _)| *i != indexer_idx && *i != eligibility_idx)
            .map(|(_, (name, value))| (name.clone(), value.clone()))
            .collect();

        rows.push(EligibilityRow {
            indexer: fields[indexer_idx].trim().to_string(),
            eligible_for_indexing_rewards: coerce_eligibility(&fields[eligibility_idx]),
            extra,
        });
    }

    Ok(rows)
}
