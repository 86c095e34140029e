use alloy::{
    signers::local::LocalSignerError,
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signer::KeyValidationError;

/// JSON-RPC error code for "method not found".
const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {}", .0.as_display())]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Rpc server returned an unsupported feature.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// Returned when a local pre-processing step fails.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    /// JSON serialization error.
    #[error("serialization error: {message}")]
    SerError { message: String },

    /// JSON deserialization error, usually a malformed or truncated response.
    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcErrorResponse {
    /// The error code.
    pub code: i64,
    /// The error message (if any).
    pub message: String,
    /// The error data (if any).
    pub data: Option<String>,
}

impl RpcErrorResponse {
    pub fn as_display(&self) -> String {
        format!(
            "code {}: {}{}",
            self.code,
            self.message,
            self.data
                .as_ref()
                .map(|data| format!(", data: {data}"))
                .unwrap_or_default()
        )
    }
}

impl RpcErrorKind {
    /// Whether this failure is worth retrying, first on the same endpoint and then on another one.
    ///
    /// Connectivity problems, timeouts, malformed responses and "not found" style null
    /// responses are transient. Application level error responses (reverts, nonce and
    /// parameter errors) are not, except for "method not found" which another provider
    /// may well support.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcErrorKind::ErrorResp(resp) => {
                let message = resp.message.to_lowercase();
                resp.code == METHOD_NOT_FOUND_CODE
                    || message.contains("method not found")
                    || message.contains("method not available")
                    || message.contains("header not found")
            }
            RpcErrorKind::NullResp => true,
            RpcErrorKind::UnsupportedFeature { .. } => true,
            RpcErrorKind::InternalError { .. } => false,
            RpcErrorKind::SerError { .. } => false,
            RpcErrorKind::DeserError { .. } => true,
            RpcErrorKind::TransportHttpError { .. } => true,
            RpcErrorKind::OtherTransportError { .. } => true,
        }
    }
}

/// A serializable contract interaction error type
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractInteractionErrorKind {
    /// Unknown function referenced.
    #[error("unknown function: function {function_name} does not exist")]
    UnknownFunction {
        #[serde(rename = "functionName")]
        function_name: String,
    },

    /// The function exists but does not take the eligibility call arguments.
    #[error("function {function_name} has an unsupported signature: {signature}")]
    UnsupportedSignature {
        #[serde(rename = "functionName")]
        function_name: String,
        signature: String,
    },

    /// An error occurred ABI encoding or decoding.
    #[error("ABI error: {message}")]
    AbiError { message: String },

    /// Parameter validation error
    #[error("parameter validation failed: {message}")]
    ParameterValidationFailed { message: String },
}

#[derive(Error, Debug, Serialize, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum OracleError {
    #[error("Failed to connect to any of the {pool_size} RPC providers")]
    ConnectivityExhausted { pool_size: usize },

    #[error("All {pool_size} RPC providers are unreachable: {last_error}")]
    AllEndpointsUnreachable {
        pool_size: usize,
        last_error: Box<OracleError>,
    },

    #[error("Invalid private key: {message}")]
    #[serde(rename_all = "camelCase")]
    KeyValidation { message: String },

    #[error("RPC error at {rpc_url}: {message}")]
    #[serde(rename_all = "camelCase")]
    RpcError {
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Contract interaction error: {message}")]
    ContractInteractionError {
        message: String,
        kind: ContractInteractionErrorKind,
    },

    #[error("Transaction build failed: {message}")]
    TransactionBuildFailed { message: String },

    #[error("Transaction signing failed: {message}")]
    SigningError { message: String },

    #[error("Transaction failed: {explorer_link}")]
    #[serde(rename_all = "camelCase")]
    TransactionReverted {
        transaction_hash: String,
        explorer_link: String,
    },

    #[error("Error waiting for receipt of {transaction_hash}: {message}")]
    #[serde(rename_all = "camelCase")]
    ReceiptWaitFailed {
        transaction_hash: String,
        message: String,
    },

    #[error("Failed to load contract ABI from {path}: {message}")]
    AbiLoadError { path: String, message: String },

    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl OracleError {
    /// Transient errors are retried locally and then escalate to endpoint rotation.
    /// Everything else propagates on first occurrence.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::RpcError { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    pub fn unknown_function(function_name: &str) -> Self {
        OracleError::ContractInteractionError {
            message: format!("Contract function '{function_name}' not found in ABI"),
            kind: ContractInteractionErrorKind::UnknownFunction {
                function_name: function_name.to_string(),
            },
        }
    }

    pub fn contract_parameter_error(message: String) -> Self {
        OracleError::ContractInteractionError {
            message: message.clone(),
            kind: ContractInteractionErrorKind::ParameterValidationFailed { message },
        }
    }
}

impl From<KeyValidationError> for OracleError {
    fn from(err: KeyValidationError) -> Self {
        OracleError::KeyValidation {
            message: err.to_string(),
        }
    }
}

impl From<LocalSignerError> for OracleError {
    fn from(err: LocalSignerError) -> Self {
        OracleError::SigningError {
            message: err.to_string(),
        }
    }
}

pub fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

pub trait AlloyRpcErrorToOracleError {
    fn to_oracle_error(&self, rpc_url: &str) -> OracleError;
}

impl AlloyRpcErrorToOracleError for AlloyRpcError<TransportErrorKind> {
    fn to_oracle_error(&self, rpc_url: &str) -> OracleError {
        OracleError::RpcError {
            rpc_url: rpc_url.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}
