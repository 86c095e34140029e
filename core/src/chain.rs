use std::{future::Future, time::Duration};

use alloy::{
    consensus::{Transaction as _, TxEnvelope},
    eips::BlockNumberOrTag,
    network::TransactionResponse,
    primitives::{Address, B256, U256},
    providers::{Provider, RootProvider},
    rpc::{client::RpcClient, types::TransactionRequest},
    transports::{
        RpcError, TransportErrorKind,
        http::{
            Http,
            reqwest::{Client as HttpClient, Url},
        },
    },
};
use serde::{Deserialize, Serialize};

use crate::error::{AlloyRpcErrorToOracleError, OracleError, RpcErrorKind};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which block tag to count a sender's transactions at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceTag {
    /// Confirmed transactions only. Also the "next available nonce".
    Latest,
    /// Confirmed plus mempool transactions known to the node.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub from: Address,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub transaction_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// The network operations the submission engine needs from an endpoint.
///
/// Every method maps failures into [`OracleError`] so the caller can classify them
/// with [`OracleError::is_transient`].
pub trait RpcEndpoint: Clone + Send + Sync + 'static {
    fn url(&self) -> &str;

    fn get_chain_id(&self) -> impl Future<Output = Result<u64, OracleError>> + Send;

    fn get_balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, OracleError>> + Send;

    fn estimate_gas(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<u64, OracleError>> + Send;

    fn get_transaction_count(
        &self,
        address: Address,
        tag: NonceTag,
    ) -> impl Future<Output = Result<u64, OracleError>> + Send;

    /// All transactions in the node's pending block.
    fn get_pending_transactions(
        &self,
    ) -> impl Future<Output = Result<Vec<PendingTransaction>, OracleError>> + Send;

    fn get_latest_base_fee(&self) -> impl Future<Output = Result<u128, OracleError>> + Send;

    fn get_max_priority_fee(&self) -> impl Future<Output = Result<u128, OracleError>> + Send;

    fn send_transaction(
        &self,
        envelope: TxEnvelope,
    ) -> impl Future<Output = Result<B256, OracleError>> + Send;

    /// Wait until the transaction is included, failing with
    /// [`OracleError::ReceiptWaitFailed`] once `timeout` elapses.
    fn wait_for_receipt(
        &self,
        transaction_hash: B256,
        timeout: Duration,
    ) -> impl Future<Output = Result<ReceiptOutcome, OracleError>> + Send;
}

/// Opens clients for endpoint URLs. Opening is local; liveness is checked separately.
pub trait EndpointConnector: Send + Sync {
    type Endpoint: RpcEndpoint;

    fn open(&self, url: &str) -> Result<Self::Endpoint, OracleError>;
}

#[derive(Clone, Debug)]
pub struct HttpEndpoint {
    url: String,
    provider: RootProvider,
}

impl HttpEndpoint {
    fn rpc_error(&self, err: &RpcError<TransportErrorKind>) -> OracleError {
        err.to_oracle_error(&self.url)
    }

    fn rpc_kind_error(&self, kind: RpcErrorKind) -> OracleError {
        OracleError::RpcError {
            rpc_url: self.url.clone(),
            message: kind.to_string(),
            kind,
        }
    }
}

impl RpcEndpoint for HttpEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_chain_id(&self) -> Result<u64, OracleError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| self.rpc_error(&e))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, OracleError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| self.rpc_error(&e))
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, OracleError> {
        self.provider
            .estimate_gas(request)
            .await
            .map_err(|e| self.rpc_error(&e))
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        tag: NonceTag,
    ) -> Result<u64, OracleError> {
        let request = self.provider.get_transaction_count(address);
        let request = match tag {
            NonceTag::Latest => request.latest(),
            NonceTag::Pending => request.pending(),
        };
        request.await.map_err(|e| self.rpc_error(&e))
    }

    async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>, OracleError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Pending)
            .full()
            .await
            .map_err(|e| self.rpc_error(&e))?;

        Ok(block
            .map(|block| {
                block
                    .transactions
                    .txns()
                    .map(|tx| PendingTransaction {
                        from: tx.from(),
                        nonce: tx.nonce(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_latest_base_fee(&self) -> Result<u128, OracleError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| self.rpc_error(&e))?
            .ok_or_else(|| self.rpc_kind_error(RpcErrorKind::NullResp))?;

        block
            .header
            .base_fee_per_gas
            .map(u128::from)
            .ok_or_else(|| {
                self.rpc_kind_error(RpcErrorKind::InternalError {
                    message: "latest block has no base fee".to_string(),
                })
            })
    }

    async fn get_max_priority_fee(&self) -> Result<u128, OracleError> {
        self.provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(|e| self.rpc_error(&e))
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> Result<B256, OracleError> {
        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| self.rpc_error(&e))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        transaction_hash: B256,
        timeout: Duration,
    ) -> Result<ReceiptOutcome, OracleError> {
        let poll = async {
            loop {
                let receipt = self
                    .provider
                    .get_transaction_receipt(transaction_hash)
                    .await
                    .map_err(|e| self.rpc_error(&e))?;

                if let Some(receipt) = receipt {
                    return Ok::<_, OracleError>(ReceiptOutcome {
                        transaction_hash,
                        success: receipt.status(),
                        block_number: receipt.block_number,
                    });
                }

                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| OracleError::ReceiptWaitFailed {
                transaction_hash: transaction_hash.to_string(),
                message: format!(
                    "Transaction not included after {} seconds",
                    timeout.as_secs()
                ),
            })?
    }
}

/// Opens [`HttpEndpoint`]s sharing one pooled HTTP client.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    client: HttpClient,
}

impl HttpConnector {
    pub fn new() -> Result<Self, OracleError> {
        let client = HttpClient::builder()
            .timeout(RPC_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OracleError::RpcConfigError {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

impl EndpointConnector for HttpConnector {
    type Endpoint = HttpEndpoint;

    fn open(&self, url: &str) -> Result<HttpEndpoint, OracleError> {
        let parsed = Url::parse(url).map_err(|e| OracleError::RpcConfigError {
            message: format!("Failed to parse RPC URL {url}: {e}"),
        })?;

        let transport = Http::with_client(self.client.clone(), parsed);
        let rpc_client = RpcClient::builder().transport(transport, false);

        Ok(HttpEndpoint {
            url: url.to_string(),
            provider: RootProvider::new(rpc_client),
        })
    }
}
