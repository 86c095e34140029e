use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, Bytes};
use oracle_core::{
    chain::{EndpointConnector, RpcEndpoint},
    contract::{ContractFunctions, ContractHandle, load_abi, parse_address},
    error::OracleError,
    retry::RetryPolicy,
    signer::SigningKey,
};

use crate::{submission::error::StageResultExt, webhook::Notifier};

pub mod connection;
pub mod error;
pub mod fees;
pub mod nonce;
pub mod transaction;

pub use connection::EndpointPool;
pub use error::SubmissionStage;
pub use fees::{FeeParameters, buffered_gas_limit};

/// Static inputs the engine is built from.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub abi_path: PathBuf,
    pub block_explorer_url: String,
    pub tx_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

/// The currently bound endpoint and contract. Replaced wholesale on rotation.
#[derive(Debug, Clone)]
pub struct ActiveConnection<E> {
    pub index: usize,
    pub endpoint: E,
    pub contract: ContractHandle,
}

/// Inputs for one on-chain call. Consumed by a single chunk submission.
#[derive(Debug)]
pub struct TransactionIntent {
    pub addresses: Vec<Address>,
    pub payload: Bytes,
    pub contract_function: String,
    pub chain_id: u64,
    pub replace: bool,
    pub signing_key: SigningKey,
}

/// Per-attempt gas, nonce and fee choices. Never reused across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub gas_limit: u64,
    pub nonce: u64,
    pub fees: FeeParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub transaction_hashes: Vec<B256>,
    pub endpoint_used: Option<String>,
}

/// A batch submission request as the caller sees it.
#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub addresses: &'a [String],
    pub signing_key: &'a str,
    pub chain_id: u64,
    pub contract_function: &'a str,
    pub batch_size: usize,
    pub replace: bool,
    pub payload: Bytes,
}

/// Submits address batches to a contract through a pool of interchangeable RPC endpoints.
///
/// One engine serves one sender. Chunks are submitted strictly in order so the
/// sender's nonces never interleave.
pub struct SubmissionEngine<C: EndpointConnector, N: Notifier> {
    pub(crate) connector: C,
    pub(crate) notifier: N,
    pub(crate) pool: EndpointPool,
    pub(crate) active: Option<ActiveConnection<C::Endpoint>>,
    pub(crate) contract_address: Address,
    pub(crate) functions: Arc<ContractFunctions>,
    pub(crate) block_explorer_url: String,
    pub(crate) tx_timeout: Duration,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) rotation_count: u64,
    pub(crate) completed: Vec<B256>,
}

impl<C: EndpointConnector, N: Notifier> SubmissionEngine<C, N> {
    /// Load the contract ABI and prepare the engine. No network activity happens here.
    pub fn new(config: SubmissionConfig, connector: C, notifier: N) -> Result<Self, OracleError> {
        let abi = load_abi(&config.abi_path)?;
        let functions = ContractFunctions::from_abi(&abi);
        Ok(Self::with_contract_functions(
            config, functions, connector, notifier,
        ))
    }

    pub fn with_contract_functions(
        config: SubmissionConfig,
        functions: ContractFunctions,
        connector: C,
        notifier: N,
    ) -> Self {
        Self {
            connector,
            notifier,
            pool: EndpointPool::new(config.rpc_urls),
            active: None,
            contract_address: config.contract_address,
            functions: Arc::new(functions),
            block_explorer_url: config.block_explorer_url,
            tx_timeout: config.tx_timeout,
            retry_policy: config.retry_policy,
            rotation_count: 0,
            completed: Vec::new(),
        }
    }

    /// Load the ABI and connect to the first reachable endpoint.
    pub async fn connect_new(
        config: SubmissionConfig,
        connector: C,
        notifier: N,
    ) -> Result<Self, OracleError> {
        let mut engine = Self::new(config, connector, notifier)?;
        engine.connect().await?;
        Ok(engine)
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn current_index(&self) -> usize {
        self.pool.current_index()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.endpoint.url())
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Hashes confirmed so far by the most recent `submit_batch` call, including one that failed part way.
    pub fn completed_transactions(&self) -> &[B256] {
        &self.completed
    }

    pub fn explorer_link(&self, transaction_hash: &B256) -> String {
        explorer_link(&self.block_explorer_url, transaction_hash)
    }

    /// Split `addresses` into chunks of `batch_size` and submit each one in order.
    ///
    /// The first failing chunk halts the batch. Hashes of chunks that already
    /// succeeded are not part of the error; read them from [`Self::completed_transactions`].
    #[tracing::instrument(skip_all, fields(
        addresses = request.addresses.len(),
        batch_size = request.batch_size,
        function = request.contract_function,
        replace = request.replace,
    ))]
    pub async fn submit_batch(
        &mut self,
        request: BatchRequest<'_>,
    ) -> Result<BatchResult, OracleError> {
        self.completed.clear();

        if request.batch_size == 0 {
            return Err(OracleError::ValidationError {
                message: "Batch size must be a positive integer".to_string(),
            })
            .at_stage(SubmissionStage::Validate);
        }

        if request.addresses.is_empty() {
            tracing::warn!("No indexer addresses provided");
            return Ok(BatchResult {
                transaction_hashes: Vec::new(),
                endpoint_used: self.active_url().map(str::to_string),
            });
        }

        // Fail fast on anything that would break every chunk, before touching the network.
        drop(
            SigningKey::parse(request.signing_key)
                .map_err(OracleError::from)
                .at_stage(SubmissionStage::Sign)?,
        );
        self.functions
            .resolve(request.contract_function)
            .at_stage(SubmissionStage::Build)?;
        let addresses = request
            .addresses
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()
            .at_stage(SubmissionStage::Build)?;

        let chunk_count = addresses.len().div_ceil(request.batch_size);
        tracing::info!(
            total = addresses.len(),
            chunks = chunk_count,
            "Starting batch submission"
        );

        if self.active.is_none() {
            self.connect().await?;
        }

        for (i, chunk) in addresses.chunks(request.batch_size).enumerate() {
            let batch_number = i + 1;
            tracing::info!(batch_number, size = chunk.len(), "Processing batch");

            let intent = TransactionIntent {
                addresses: chunk.to_vec(),
                payload: request.payload.clone(),
                contract_function: request.contract_function.to_string(),
                chain_id: request.chain_id,
                replace: request.replace,
                signing_key: SigningKey::parse(request.signing_key)?,
            };

            match self.submit_chunk(intent).await {
                Ok(hash) => {
                    tracing::info!(batch_number, transaction_hash = %hash, "Successfully sent batch");
                    self.completed.push(hash);
                }
                Err(e) => {
                    tracing::error!(
                        batch_number,
                        completed = self.completed.len(),
                        error = %e,
                        "Failed to send batch. Halting batch processing"
                    );
                    return Err(e);
                }
            }
        }

        Ok(BatchResult {
            transaction_hashes: self.completed.clone(),
            endpoint_used: self.active_url().map(str::to_string),
        })
    }
}

/// `{base}/tx/{hash}`, tolerating a trailing slash on the base URL.
pub fn explorer_link(block_explorer_url: &str, transaction_hash: &B256) -> String {
    format!(
        "{}/tx/{transaction_hash}",
        block_explorer_url.trim_end_matches('/')
    )
}
