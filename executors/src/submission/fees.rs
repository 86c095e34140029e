use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, utils::format_units},
    rpc::types::TransactionRequest,
};
use oracle_core::{
    chain::{EndpointConnector, RpcEndpoint},
    error::OracleError,
};

use crate::{
    submission::{SubmissionEngine, SubmissionStage},
    webhook::Notifier,
};

/// Used when the latest block's base fee cannot be read.
pub const DEFAULT_BASE_FEE_WEI: u128 = 10_000_000_000;
/// Used when the node cannot suggest a priority fee.
pub const DEFAULT_PRIORITY_FEE_WEI: u128 = 2_000_000_000;

const GAS_BUFFER_PERCENT: u128 = 125;

/// Raw estimate plus 25%, truncated.
pub fn buffered_gas_limit(estimate: u64) -> u64 {
    let buffered = u128::from(estimate) * GAS_BUFFER_PERCENT / 100;
    u64::try_from(buffered).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParameters {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeParameters {
    /// EIP-1559 fee caps. Replacements double both terms so they outbid the stuck transaction.
    pub fn compute(base_fee: u128, priority_fee: u128, replace: bool) -> Self {
        if replace {
            Self {
                max_fee_per_gas: base_fee
                    .saturating_mul(4)
                    .saturating_add(priority_fee.saturating_mul(2)),
                max_priority_fee_per_gas: priority_fee.saturating_mul(2),
            }
        } else {
            Self {
                max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
                max_priority_fee_per_gas: priority_fee,
            }
        }
    }
}

fn gwei(wei: u128) -> String {
    format_units(wei, "gwei").unwrap_or_else(|_| wei.to_string())
}

impl<C: EndpointConnector, N: Notifier> SubmissionEngine<C, N> {
    pub(crate) async fn estimate_gas_limit(
        &mut self,
        sender: Address,
        contract_address: Address,
        calldata: &Bytes,
    ) -> Result<u64, OracleError> {
        let request = TransactionRequest::default()
            .with_from(sender)
            .with_to(contract_address)
            .with_input(calldata.clone());

        let estimate = self
            .execute_rpc("estimate_gas", |endpoint| {
                let request = request.clone();
                async move { endpoint.estimate_gas(request).await }
            })
            .await?;

        let gas_limit = buffered_gas_limit(estimate);
        tracing::info!(estimated_gas = estimate, gas_limit, "Estimated gas");
        Ok(gas_limit)
    }

    /// Current fee caps. Lookup failures fall back to fixed defaults.
    pub(crate) async fn get_fee_parameters(&mut self, replace: bool) -> FeeParameters {
        let base_fee = match self
            .execute_rpc("get_latest_base_fee", |endpoint| async move {
                endpoint.get_latest_base_fee().await
            })
            .await
        {
            Ok(base_fee) => {
                tracing::info!(base_fee_gwei = %gwei(base_fee), "Latest block base fee");
                base_fee
            }
            Err(e) => {
                tracing::warn!(
                    stage = SubmissionStage::GetFees.as_str(),
                    error = %e,
                    "Could not get base fee, using default"
                );
                DEFAULT_BASE_FEE_WEI
            }
        };

        let priority_fee = match self
            .execute_rpc("get_max_priority_fee", |endpoint| async move {
                endpoint.get_max_priority_fee().await
            })
            .await
        {
            Ok(priority_fee) => {
                tracing::info!(priority_fee_gwei = %gwei(priority_fee), "Max priority fee");
                priority_fee
            }
            Err(e) => {
                tracing::warn!(
                    stage = SubmissionStage::GetFees.as_str(),
                    error = %e,
                    "Could not get max priority fee, using default"
                );
                DEFAULT_PRIORITY_FEE_WEI
            }
        };

        let fees = FeeParameters::compute(base_fee, priority_fee, replace);
        tracing::info!(
            replace,
            max_fee_gwei = %gwei(fees.max_fee_per_gas),
            max_priority_fee_gwei = %gwei(fees.max_priority_fee_per_gas),
            "Computed fee parameters"
        );
        fees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_buffer_truncates() {
        assert_eq!(buffered_gas_limit(100_000), 125_000);
        assert_eq!(buffered_gas_limit(21_001), 26_251);
        assert_eq!(buffered_gas_limit(0), 0);
        assert_eq!(buffered_gas_limit(u64::MAX), u64::MAX);
    }

    #[test]
    fn standard_fees() {
        assert_eq!(
            FeeParameters::compute(100, 10, false),
            FeeParameters {
                max_fee_per_gas: 210,
                max_priority_fee_per_gas: 10,
            }
        );
    }

    #[test]
    fn replacement_fees() {
        assert_eq!(
            FeeParameters::compute(100, 10, true),
            FeeParameters {
                max_fee_per_gas: 420,
                max_priority_fee_per_gas: 20,
            }
        );
    }

    #[test]
    fn default_fees() {
        let fees = FeeParameters::compute(DEFAULT_BASE_FEE_WEI, DEFAULT_PRIORITY_FEE_WEI, false);
        assert_eq!(fees.max_fee_per_gas, 22_000_000_000);
        assert_eq!(fees.max_priority_fee_per_gas, 2_000_000_000);
    }
}
