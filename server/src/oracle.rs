use std::{
    fmt,
    future::Future,
    time::{Duration, Instant},
};

use alloy::primitives::{B256, Bytes};
use chrono::{NaiveDate, TimeDelta};
use oracle_core::{chain::EndpointConnector, error::OracleError};
use oracle_executors::{
    BatchRequest, SubmissionEngine,
    webhook::{FailureReport, Notifier, SuccessReport},
};

use crate::{
    config::{ConfigError, OracleConfig},
    data_source::{DataSourceError, EligibilityDataSource},
    pipeline::{EligibilityPipeline, PipelineError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    DataProcessing,
    BlockchainSubmission,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::DataProcessing => "Data Processing",
            RunStage::BlockchainSubmission => "Blockchain Submission",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RunErrorKind {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Submission(#[from] OracleError),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[error("Oracle failed at stage '{stage}': {kind}")]
pub struct RunError {
    pub stage: RunStage,
    #[source]
    pub kind: RunErrorKind,
}

trait AtRunStage<T> {
    fn at(self, stage: RunStage) -> Result<T, RunError>;
}

impl<T, E: Into<RunErrorKind>> AtRunStage<T> for Result<T, E> {
    fn at(self, stage: RunStage) -> Result<T, RunError> {
        self.map_err(|e| RunError {
            stage,
            kind: e.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub eligible_indexers: Vec<String>,
    pub ineligible_count: usize,
    pub transaction_hashes: Vec<B256>,
    pub transaction_links: Vec<String>,
    pub endpoint_used: Option<String>,
    pub execution_time: Duration,
}

/// One complete oracle run for a given date.
pub trait OracleRunner: Send + Sync {
    fn run(&self, run_date: NaiveDate) -> impl Future<Output = Result<RunSummary, RunError>> + Send;
}

/// Fetches eligibility data, archives it and pushes the eligible set on chain.
pub struct Oracle<D, C, N> {
    config: OracleConfig,
    data_source: D,
    connector: C,
    notifier: N,
    pipeline: EligibilityPipeline,
}

impl<D, C, N> Oracle<D, C, N>
where
    D: EligibilityDataSource,
    C: EndpointConnector + Clone,
    N: Notifier + Clone,
{
    pub fn new(config: OracleConfig, data_source: D, connector: C, notifier: N) -> Self {
        let pipeline = EligibilityPipeline::new(config.processing.output_dir.clone());
        Self {
            config,
            data_source,
            connector,
            notifier,
            pipeline,
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    async fn run_stages(
        &self,
        run_date: NaiveDate,
        eligible_count: &mut Option<usize>,
        partial_links: &mut Vec<String>,
        started: Instant,
    ) -> Result<RunSummary, RunError> {
        // Data processing
        let lookback = TimeDelta::days(self.config.processing.lookback_days);
        let start_date = run_date.checked_sub_signed(lookback).unwrap_or(NaiveDate::MIN);

        let rows = self
            .data_source
            .fetch_eligibility_rows(start_date, run_date)
            .await
            .at(RunStage::DataProcessing)?;

        let (eligible, ineligible) = self
            .pipeline
            .process(&rows, run_date)
            .await
            .at(RunStage::DataProcessing)?;
        tracing::info!(eligible = eligible.len(), ineligible = ineligible.len(), "Found eligible indexers");
        *eligible_count = Some(eligible.len());

        self.pipeline
            .prune_older_than(self.config.processing.max_age_before_deletion, run_date)
            .await;

        // Blockchain submission
        let submission_config = self
            .config
            .submission_config()
            .at(RunStage::BlockchainSubmission)?;
        let mut engine = SubmissionEngine::new(
            submission_config,
            self.connector.clone(),
            self.notifier.clone(),
        )
        .at(RunStage::BlockchainSubmission)?;

        let result = match engine
            .submit_batch(BatchRequest {
                addresses: &eligible,
                signing_key: &self.config.secrets.private_key,
                chain_id: self.config.blockchain.chain_id,
                contract_function: &self.config.blockchain.contract_function,
                batch_size: self.config.blockchain.batch_size,
                replace: true,
                payload: Bytes::new(),
            })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                *partial_links = engine
                    .completed_transactions()
                    .iter()
                    .map(|hash| engine.explorer_link(hash))
                    .collect();
                return Err(e).at(RunStage::BlockchainSubmission);
            }
        };

        let transaction_links = result
            .transaction_hashes
            .iter()
            .map(|hash| engine.explorer_link(hash))
            .collect();

        Ok(RunSummary {
            run_date,
            eligible_indexers: eligible,
            ineligible_count: ineligible.len(),
            transaction_hashes: result.transaction_hashes,
            transaction_links,
            endpoint_used: result.endpoint_used,
            execution_time: started.elapsed(),
        })
    }
}

impl<D, C, N> OracleRunner for Oracle<D, C, N>
where
    D: EligibilityDataSource,
    C: EndpointConnector + Clone,
    N: Notifier + Clone,
{
    #[tracing::instrument(skip_all, fields(%run_date))]
    async fn run(&self, run_date: NaiveDate) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        tracing::info!("Starting Service Quality Oracle run");

        let mut eligible_count = None;
        let mut partial_links = Vec::new();
        let result = self
            .run_stages(run_date, &mut eligible_count, &mut partial_links, started)
            .await;

        match &result {
            Ok(summary) => {
                tracing::info!(
                    execution_secs = summary.execution_time.as_secs_f64(),
                    transactions = summary.transaction_hashes.len(),
                    "Oracle run completed successfully"
                );
                let report = SuccessReport {
                    eligible_indexers: summary.eligible_indexers.len(),
                    total_processed: summary.eligible_indexers.len(),
                    execution_time: Some(summary.execution_time),
                    transaction_links: summary.transaction_links.clone(),
                };
                if let Err(e) = self.notifier.notify_success(&report).await {
                    tracing::error!(error = %e, "Failed to send success notification");
                }
            }
            Err(e) => {
                tracing::error!(stage = %e.stage, error = %e.kind, "Oracle run failed");
                let report = FailureReport {
                    error_message: e.kind.to_string(),
                    stage: e.stage.to_string(),
                    execution_time: Some(started.elapsed()),
                    indexers_processed: eligible_count,
                    partial_transaction_links: partial_links,
                };
                if let Err(e) = self.notifier.notify_failure(&report).await {
                    tracing::error!(error = %e, "Failed to send failure notification");
                }
            }
        }

        result
    }
}
