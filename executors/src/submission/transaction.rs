use alloy::{
    consensus::{TxEnvelope, TypedTransaction},
    network::TransactionBuilder,
    primitives::{Address, B256, Bytes, utils::format_ether},
    rpc::types::TransactionRequest,
};
use oracle_core::{
    chain::{EndpointConnector, RpcEndpoint},
    error::OracleError,
    signer::LocalAccount,
};

use crate::{
    submission::{
        GasPlan, SubmissionEngine, SubmissionStage, TransactionIntent,
        error::StageResultExt,
    },
    webhook::Notifier,
};

impl<C: EndpointConnector, N: Notifier> SubmissionEngine<C, N> {
    /// Submit one chunk and wait for it to be mined.
    ///
    /// The signing key inside `intent` is dropped before this returns.
    #[tracing::instrument(skip_all, fields(
        chunk_size = intent.addresses.len(),
        function = %intent.contract_function,
        chain_id = intent.chain_id,
    ))]
    pub async fn submit_chunk(&mut self, intent: TransactionIntent) -> Result<B256, OracleError> {
        let TransactionIntent {
            addresses,
            payload,
            contract_function,
            chain_id,
            replace,
            signing_key,
        } = intent;

        let account = LocalAccount::from_signing_key(signing_key).at_stage(SubmissionStage::Sign)?;
        let sender = account.address();

        let (contract_address, calldata, plan) = self
            .prepare_chunk(sender, &contract_function, &addresses, &payload, replace)
            .await?;

        tracing::info!(
            nonce = plan.nonce,
            gas = plan.gas_limit,
            chain_id,
            "Transaction parameters"
        );

        let typed_tx = build_transaction(sender, contract_address, calldata, chain_id, &plan)
            .at_stage(SubmissionStage::Build)?;

        let signed = account
            .sign_transaction(typed_tx)
            .at_stage(SubmissionStage::Sign)?;
        drop(account);
        tracing::info!("Transaction built and signed successfully");

        let envelope: TxEnvelope = signed.into();
        let transaction_hash = self
            .send_envelope(envelope)
            .await
            .at_stage(SubmissionStage::Send)?;

        self.confirm_transaction(transaction_hash)
            .await
            .at_stage(SubmissionStage::AwaitReceipt)?;

        Ok(transaction_hash)
    }

    /// Everything that reads chain state before signing. If the engine rotated to another
    /// endpoint while this ran, the values came from mixed endpoints and the whole
    /// preparation starts over on the new one, at most once per endpoint.
    async fn prepare_chunk(
        &mut self,
        sender: Address,
        contract_function: &str,
        addresses: &[Address],
        payload: &Bytes,
        replace: bool,
    ) -> Result<(Address, Bytes, GasPlan), OracleError> {
        let max_passes = self.pool.len().max(1);
        let mut pass = 1;

        loop {
            let generation = self.rotation_count;

            if self.active.is_none() {
                self.connect().await.at_stage(SubmissionStage::Connect)?;
            }
            let contract = self.active_contract().at_stage(SubmissionStage::Connect)?;
            let calldata = contract
                .functions
                .encode_call(contract_function, addresses, payload)
                .at_stage(SubmissionStage::Build)?;

            self.log_balance(sender).await;

            let gas_limit = self
                .estimate_gas_limit(sender, contract.address, &calldata)
                .await
                .at_stage(SubmissionStage::EstimateGas)?;

            let nonce = self
                .resolve_nonce(sender, replace)
                .await
                .at_stage(SubmissionStage::ResolveNonce)?;

            let fees = self.get_fee_parameters(replace).await;

            let plan = GasPlan {
                gas_limit,
                nonce,
                fees,
            };

            if generation == self.rotation_count || pass >= max_passes {
                return Ok((contract.address, calldata, plan));
            }

            tracing::warn!(
                pass,
                "RPC provider changed while preparing the transaction, restarting chunk"
            );
            pass += 1;
        }
    }

    async fn log_balance(&mut self, sender: Address) {
        match self
            .execute_rpc("get_balance", move |endpoint| async move {
                endpoint.get_balance(sender).await
            })
            .await
        {
            Ok(balance) => {
                tracing::info!(account = %sender, balance_eth = %format_ether(balance), "Account balance")
            }
            Err(e) => tracing::warn!(account = %sender, error = %e, "Could not read account balance"),
        }
    }

    async fn send_envelope(&mut self, envelope: TxEnvelope) -> Result<B256, OracleError> {
        let transaction_hash = self
            .execute_rpc("send_transaction", |endpoint| {
                let envelope = envelope.clone();
                async move { endpoint.send_transaction(envelope).await }
            })
            .await?;

        tracing::info!(transaction_hash = %transaction_hash, "Transaction sent");
        Ok(transaction_hash)
    }

    /// Wait for the receipt and turn an on-chain failure into [`OracleError::TransactionReverted`].
    pub async fn confirm_transaction(&mut self, transaction_hash: B256) -> Result<(), OracleError> {
        let timeout = self.tx_timeout;
        let outcome = self
            .execute_rpc("wait_for_receipt", move |endpoint| async move {
                endpoint.wait_for_receipt(transaction_hash, timeout).await
            })
            .await?;

        let explorer_link = self.explorer_link(&transaction_hash);

        if outcome.success {
            tracing::info!(
                block_number = ?outcome.block_number,
                link = %explorer_link,
                "Transaction successful"
            );
            Ok(())
        } else {
            Err(OracleError::TransactionReverted {
                transaction_hash: transaction_hash.to_string(),
                explorer_link,
            })
        }
    }
}

pub fn build_transaction(
    sender: Address,
    contract_address: Address,
    calldata: Bytes,
    chain_id: u64,
    plan: &GasPlan,
) -> Result<TypedTransaction, OracleError> {
    TransactionRequest::default()
        .with_from(sender)
        .with_to(contract_address)
        .with_input(calldata)
        .with_nonce(plan.nonce)
        .with_chain_id(chain_id)
        .with_gas_limit(plan.gas_limit)
        .with_max_fee_per_gas(plan.fees.max_fee_per_gas)
        .with_max_priority_fee_per_gas(plan.fees.max_priority_fee_per_gas)
        .build_typed_tx()
        .map_err(|request| OracleError::TransactionBuildFailed {
            message: format!("Failed to build typed transaction: {request:?}"),
        })
}
