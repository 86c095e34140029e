use std::{fmt, str::FromStr};

use alloy::{
    consensus::{SignableTransaction, Signed, TypedTransaction},
    network::TxSignerSync,
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use thiserror::Error;

use crate::error::OracleError;

const PRIVATE_KEY_HEX_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyValidationError {
    #[error("Private key must be a non-empty string")]
    Empty,

    #[error("Private key must be 64 hex characters")]
    InvalidFormat,
}

/// Validate a raw private key and normalise it to a lowercase, `0x` prefixed, 64 character hex string.
///
/// Surrounding whitespace and an optional `0x`/`0X` prefix are accepted.
pub fn validate_and_format_private_key(private_key: &str) -> Result<String, KeyValidationError> {
    let clean_key = private_key.trim();
    if clean_key.is_empty() {
        return Err(KeyValidationError::Empty);
    }

    let hex_key = clean_key
        .strip_prefix("0x")
        .or_else(|| clean_key.strip_prefix("0X"))
        .unwrap_or(clean_key);

    if hex_key.len() != PRIVATE_KEY_HEX_LEN || !hex_key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KeyValidationError::InvalidFormat);
    }

    Ok(format!("0x{}", hex_key.to_ascii_lowercase()))
}

/// A validated signing key. Only ever lives for the duration of a single submission.
pub struct SigningKey(String);

impl SigningKey {
    pub fn parse(raw: &str) -> Result<Self, KeyValidationError> {
        validate_and_format_private_key(raw).map(SigningKey)
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Local account derived from a [`SigningKey`]. The key material is consumed on construction.
pub struct LocalAccount {
    signer: PrivateKeySigner,
}

impl LocalAccount {
    pub fn from_signing_key(key: SigningKey) -> Result<Self, OracleError> {
        let signer = PrivateKeySigner::from_str(key.as_hex())?;
        tracing::info!(account = %signer.address(), "Using account");
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign_transaction(
        &self,
        mut typed_tx: TypedTransaction,
    ) -> Result<Signed<TypedTransaction>, OracleError> {
        let signature = self
            .signer
            .sign_transaction_sync(&mut typed_tx)
            .map_err(|e| OracleError::SigningError {
                message: format!("Failed to sign transaction: {e}"),
            })?;

        Ok(typed_tx.into_signed(signature))
    }
}

impl fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
