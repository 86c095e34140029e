use fixtures::*;

use oracle_core::chain::HttpConnector;
use oracle_core::error::OracleError;
use service_quality_oracle::{
    CsvExportSource, Oracle, OracleConfig, OracleRunner, RunStage, oracle::RunErrorKind,
    pipeline::{ELIGIBLE_FILE, INELIGIBLE_FILE, RAW_DATA_FILE},
};

fn oracle(
    config: &OracleConfig,
    notifier: &RecordingNotifier,
) -> Oracle<CsvExportSource, HttpConnector, RecordingNotifier> {
    Oracle::new(
        config.clone(),
        CsvExportSource::new(config.processing.input_path.clone()),
        HttpConnector::new().unwrap(),
        notifier.clone(),
    )
}

#[tokio::test]
async fn run_without_eligible_indexers_skips_the_chain() {
    setup_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = oracle_config(dir.path());
    write_export(
        &config,
        "indexer,eligible_for_indexing_rewards\n\
         0x1111111111111111111111111111111111111111,0\n\
         0x2222222222222222222222222222222222222222,not-a-number\n",
    );
    let notifier = RecordingNotifier::default();

    let summary = oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap();

    assert!(summary.eligible_indexers.is_empty());
    assert_eq!(summary.ineligible_count, 2);
    assert!(summary.transaction_hashes.is_empty());

    let out = config.processing.output_dir.join("2025-06-01");
    for file in [RAW_DATA_FILE, ELIGIBLE_FILE, INELIGIBLE_FILE] {
        assert!(out.join(file).exists(), "{file} should be written");
    }

    let successes = notifier.successes();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].eligible_indexers, 0);
    assert!(successes[0].transaction_links.is_empty());
}

#[tokio::test]
async fn unreachable_providers_fail_the_submission_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = oracle_config(dir.path());
    write_export(
        &config,
        "indexer,eligible_for_indexing_rewards\n\
         0x1111111111111111111111111111111111111111,1\n\
         0x2222222222222222222222222222222222222222,1\n\
         0x3333333333333333333333333333333333333333,0\n",
    );
    let notifier = RecordingNotifier::default();

    let err = oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunStage::BlockchainSubmission);
    assert_eq!(
        err.kind,
        RunErrorKind::Submission(OracleError::ConnectivityExhausted { pool_size: 1 })
    );

    let failures = notifier.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "Blockchain Submission");
    assert_eq!(failures[0].indexers_processed, Some(2));
    assert!(failures[0].execution_time.is_some());

    // Data processing still completed before the failure.
    let eligible = std::fs::read_to_string(
        config.processing.output_dir.join("2025-06-01").join(ELIGIBLE_FILE),
    )
    .unwrap();
    assert_eq!(eligible.lines().count(), 3);
}

#[tokio::test]
async fn missing_export_fails_the_data_processing_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = oracle_config(dir.path());
    let notifier = RecordingNotifier::default();

    let err = oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunStage::DataProcessing);
    assert!(matches!(err.kind, RunErrorKind::DataSource(_)));

    let failures = notifier.failures();
    assert_eq!(failures[0].stage, "Data Processing");
    assert_eq!(failures[0].indexers_processed, None);
    assert!(notifier.successes().is_empty());
}

#[tokio::test]
async fn invalid_private_key_fails_before_any_connection() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = oracle_config(dir.path());
    config.secrets.private_key = "0x1234".to_string();
    write_export(
        &config,
        "indexer,eligible_for_indexing_rewards\n0x1111111111111111111111111111111111111111,1\n",
    );
    let notifier = RecordingNotifier::default();

    let err = oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        RunErrorKind::Submission(OracleError::KeyValidation { .. })
    ));
}

#[tokio::test]
async fn missing_abi_fails_the_submission_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = oracle_config(dir.path());
    config.blockchain.abi_path = dir.path().join("missing.json");
    write_export(&config, "indexer,eligible_for_indexing_rewards\n");
    let notifier = RecordingNotifier::default();

    let err = oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunStage::BlockchainSubmission);
    assert!(matches!(
        err.kind,
        RunErrorKind::Submission(OracleError::AbiLoadError { .. })
    ));
}

#[tokio::test]
async fn runs_prune_expired_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let config = oracle_config(dir.path());
    write_export(&config, "indexer,eligible_for_indexing_rewards\n");
    let expired = config.processing.output_dir.join("2025-01-01");
    let recent = config.processing.output_dir.join("2025-05-20");
    std::fs::create_dir_all(&expired).unwrap();
    std::fs::create_dir_all(&recent).unwrap();
    let notifier = RecordingNotifier::default();

    oracle(&config, &notifier)
        .run(date("2025-06-01"))
        .await
        .unwrap();

    assert!(!expired.exists());
    assert!(recent.exists());
}
