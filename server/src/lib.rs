pub mod circuit_breaker;
pub mod config;
pub mod csv;
pub mod data_source;
pub mod oracle;
pub mod pipeline;
pub mod scheduler;

// Re-export commonly used types for integration tests and external usage
pub use circuit_breaker::CircuitBreaker;
pub use config::{
    BlockchainConfig, CircuitBreakerConfig, ConfigError, LogFormat, OracleConfig,
    ProcessingConfig, SchedulingConfig, SecretsConfig, ServerConfig,
};
pub use data_source::{CsvExportSource, EligibilityDataSource, EligibilityRow};
pub use oracle::{Oracle, OracleRunner, RunError, RunStage, RunSummary};
pub use pipeline::EligibilityPipeline;
pub use scheduler::{RunOutcome, Scheduler, Shutdown};
