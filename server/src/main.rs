use chrono::{NaiveDate, Utc};
use clap::Parser;
use oracle_core::chain::HttpConnector;
use oracle_executors::create_slack_notifier;
use service_quality_oracle::{
    CsvExportSource, Oracle, OracleRunner, Scheduler, Shutdown,
    config::{self, LogFormat},
};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Service Quality Oracle
#[derive(Parser, Debug)]
#[command(name = "service-quality-oracle")]
#[command(about = "Publishes indexer issuance eligibility on chain", long_about = None)]
struct Cli {
    /// Run the oracle once and exit instead of starting the daily scheduler
    #[arg(long)]
    once: bool,

    /// Date to run for (YYYY-MM-DD), defaults to today in UTC
    #[arg(long, requires = "once")]
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::get_config()?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to debug for our crates if RUST_LOG environment variable is not set
            "service_quality_oracle=debug,oracle_executors=debug,oracle_core=debug".into()
        }),
    );

    match config.server.log_format {
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    config.validate()?;
    tracing::info!(
        rpc_providers = config.rpc_urls().len(),
        chain_id = config.blockchain.chain_id,
        "Configuration loaded"
    );

    let notifier = create_slack_notifier(config.secrets.slack_webhook_url.as_deref());
    let data_source = CsvExportSource::new(config.processing.input_path.clone());
    let connector = HttpConnector::new()?;
    let oracle = Oracle::new(config.clone(), data_source, connector, notifier.clone());

    if cli.once {
        let run_date = cli.date.unwrap_or_else(|| Utc::now().date_naive());
        let summary = oracle.run(run_date).await?;
        tracing::info!(
            transactions = summary.transaction_hashes.len(),
            eligible = summary.eligible_indexers.len(),
            "Single run finished"
        );
        return Ok(());
    }

    let scheduler = Scheduler::from_config(&config, oracle, notifier)?;
    tracing::info!("Scheduler started and waiting for scheduled runs");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match scheduler.start(shutdown).await {
        Shutdown::Interrupted => tracing::info!("Shutdown signal received"),
        Shutdown::CircuitOpen => {
            tracing::error!("Circuit breaker is open, exiting without restart")
        }
    }

    Ok(())
}
