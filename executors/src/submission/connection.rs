use std::future::Future;

use oracle_core::{
    chain::{EndpointConnector, RpcEndpoint},
    contract::ContractHandle,
    error::OracleError,
    retry::retry_with_backoff,
};

use crate::{
    submission::{ActiveConnection, SubmissionEngine, SubmissionStage},
    webhook::Notifier,
};

/// Ordered endpoint URLs (primary first) and a cursor that only moves forward, wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    urls: Vec<String>,
    current_index: usize,
}

impl EndpointPool {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            current_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_url(&self) -> Option<&str> {
        self.urls.get(self.current_index).map(String::as_str)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub(crate) fn advance(&mut self) {
        if !self.urls.is_empty() {
            self.current_index = (self.current_index + 1) % self.urls.len();
        }
    }
}

impl<C: EndpointConnector, N: Notifier> SubmissionEngine<C, N> {
    /// Bind to the first live endpoint, starting at the current index and trying each one once.
    ///
    /// A failed lap leaves the cursor where it started and the engine unbound.
    pub async fn connect(&mut self) -> Result<(), OracleError> {
        self.active = None;
        let pool_size = self.pool.len();

        if pool_size == 0 {
            tracing::error!(stage = SubmissionStage::Connect.as_str(), "No RPC providers configured");
            return Err(OracleError::ConnectivityExhausted { pool_size });
        }

        for _ in 0..pool_size {
            let index = self.pool.current_index();
            let Some(url) = self.pool.current_url().map(str::to_string) else {
                break;
            };

            tracing::info!(index, rpc_url = %url, "Attempting to connect to RPC provider");

            match self.check_endpoint(&url).await {
                Ok(endpoint) => {
                    tracing::info!(index, rpc_url = %url, "Connected to RPC provider");
                    self.active = Some(ActiveConnection {
                        index,
                        endpoint,
                        contract: ContractHandle::new(
                            self.contract_address,
                            self.functions.clone(),
                        ),
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(index, rpc_url = %url, error = %e, "Could not connect to RPC provider");
                    self.pool.advance();
                }
            }
        }

        tracing::error!(
            stage = SubmissionStage::Connect.as_str(),
            pool_size,
            "Failed to connect to any RPC provider"
        );
        Err(OracleError::ConnectivityExhausted { pool_size })
    }

    async fn check_endpoint(&self, url: &str) -> Result<C::Endpoint, OracleError> {
        let endpoint = self.connector.open(url)?;
        let chain_id = endpoint.get_chain_id().await?;
        tracing::debug!(rpc_url = url, chain_id, "RPC provider responded to liveness check");
        Ok(endpoint)
    }

    /// Move to the next endpoint and reconnect from there.
    pub async fn rotate(&mut self) -> Result<(), OracleError> {
        let previous_url = self.pool.current_url().unwrap_or_default().to_string();
        self.pool.advance();
        self.rotation_count += 1;
        let new_url = self.pool.current_url().unwrap_or_default().to_string();

        if new_url == previous_url {
            tracing::warn!(rpc_url = %new_url, "No other RPC provider to rotate to, reconnecting");
        } else {
            let message = format!(
                "Switching from previous RPC provider due to persistent errors.\nPrevious: `{previous_url}`\nNew: `{new_url}`"
            );
            tracing::warn!(previous = %previous_url, new = %new_url, "Rotating RPC provider");

            if let Err(e) = self
                .notifier
                .notify_info(&message, "RPC Provider Rotation")
                .await
            {
                tracing::warn!(error = %e, "Failed to send rotation notification");
            }
        }

        self.connect().await
    }

    pub(crate) fn active_endpoint(&self) -> Result<C::Endpoint, OracleError> {
        self.active
            .as_ref()
            .map(|active| active.endpoint.clone())
            .ok_or_else(|| OracleError::ConnectivityExhausted {
                pool_size: self.pool.len(),
            })
    }

    pub(crate) fn active_contract(&self) -> Result<ContractHandle, OracleError> {
        self.active
            .as_ref()
            .map(|active| active.contract.clone())
            .ok_or_else(|| OracleError::InternalError {
                message: "No contract bound: engine is not connected".to_string(),
            })
    }

    /// Run one network call against the bound endpoint.
    ///
    /// Transient failures are retried on the same endpoint with backoff, then the
    /// engine rotates. Once the rotation comes back to the endpoint this call started
    /// on, the call fails with [`OracleError::AllEndpointsUnreachable`]. Other errors
    /// are returned as-is on first occurrence.
    pub async fn execute_rpc<T, F, Fut>(
        &mut self,
        operation: &str,
        mut call: F,
    ) -> Result<T, OracleError>
    where
        F: FnMut(C::Endpoint) -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        if self.active.is_none() {
            self.connect().await?;
        }

        let pool_size = self.pool.len();
        let initial_index = self.pool.current_index();
        let policy = self.retry_policy.clone();
        let mut rotations = 0;

        loop {
            let endpoint = self.active_endpoint()?;
            let result = retry_with_backoff(&policy, operation, OracleError::is_transient, || {
                call(endpoint.clone())
            })
            .await;

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            tracing::warn!(
                operation,
                index = self.pool.current_index(),
                rpc_url = endpoint.url(),
                error = %error,
                "RPC call failed after retries"
            );

            rotations += 1;
            let rotated = self.rotate().await;

            if rotated.is_err()
                || self.pool.current_index() == initial_index
                || rotations >= pool_size
            {
                tracing::error!(operation, pool_size, "All RPC providers failed");
                return Err(OracleError::AllEndpointsUnreachable {
                    pool_size,
                    last_error: Box::new(error),
                });
            }
        }
    }
}
