use alloy::primitives::Address;
use oracle_core::{
    chain::{EndpointConnector, NonceTag, PendingTransaction, RpcEndpoint},
    error::OracleError,
};

use crate::{submission::SubmissionEngine, webhook::Notifier};

/// Lowest nonce among the sender's transactions in a pending block.
pub fn oldest_pending_nonce(pending: &[PendingTransaction], sender: Address) -> Option<u64> {
    pending
        .iter()
        .filter(|tx| tx.from == sender)
        .map(|tx| tx.nonce)
        .min()
}

/// When the node knows of more transactions than have been confirmed, the first
/// unconfirmed slot is the confirmed count.
pub fn gap_nonce(pending_count: u64, latest_count: u64) -> Option<u64> {
    (pending_count > latest_count).then_some(latest_count)
}

impl<C: EndpointConnector, N: Notifier> SubmissionEngine<C, N> {
    /// Choose the nonce for the next transaction from `sender`.
    ///
    /// When replacing, the oldest pending transaction wins, then the first slot of a
    /// nonce gap, then the next available nonce. Lookup failures along the way are
    /// logged and skipped; only the final fallback can fail.
    pub async fn resolve_nonce(&mut self, sender: Address, replace: bool) -> Result<u64, OracleError> {
        if replace {
            tracing::info!("Attempting to find and replace a pending transaction");

            match self.find_oldest_pending_nonce(sender).await {
                Ok(Some(nonce)) => {
                    tracing::info!(nonce, "Found pending transaction for replacement");
                    return Ok(nonce);
                }
                Ok(None) => tracing::debug!("No pending transactions from sender"),
                Err(e) => tracing::warn!(error = %e, "Could not check pending transactions"),
            }

            match self.find_nonce_gap(sender).await {
                Ok(Some(nonce)) => return Ok(nonce),
                Ok(None) => tracing::debug!("No nonce gap detected"),
                Err(e) => tracing::warn!(error = %e, "Could not check nonce gap"),
            }
        }

        let nonce = self.next_available_nonce(sender).await?;
        tracing::info!(nonce, "Using next available nonce");
        Ok(nonce)
    }

    async fn find_oldest_pending_nonce(&mut self, sender: Address) -> Result<Option<u64>, OracleError> {
        let pending = self
            .execute_rpc("get_pending_transactions", |endpoint| async move {
                endpoint.get_pending_transactions().await
            })
            .await?;

        Ok(oldest_pending_nonce(&pending, sender))
    }

    async fn find_nonce_gap(&mut self, sender: Address) -> Result<Option<u64>, OracleError> {
        let pending_count = self.transaction_count(sender, NonceTag::Pending).await?;
        let latest_count = self.transaction_count(sender, NonceTag::Latest).await?;

        let gap = gap_nonce(pending_count, latest_count);
        if gap.is_some() {
            tracing::info!(
                latest = latest_count,
                pending = pending_count,
                "Detected nonce gap"
            );
        }
        Ok(gap)
    }

    async fn next_available_nonce(&mut self, sender: Address) -> Result<u64, OracleError> {
        self.transaction_count(sender, NonceTag::Latest).await
    }

    async fn transaction_count(&mut self, sender: Address, tag: NonceTag) -> Result<u64, OracleError> {
        self.execute_rpc("get_transaction_count", move |endpoint| async move {
            endpoint.get_transaction_count(sender, tag).await
        })
        .await
    }
}
