use std::{collections::HashMap, path::Path, sync::Arc};

use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::{Function, JsonAbi},
    primitives::{Address, Bytes},
};

use crate::error::{ContractInteractionErrorKind, OracleError};

/// The argument shapes an eligibility submission function may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `fn(address[])`
    Addresses,
    /// `fn(address[], bytes)`
    AddressesWithPayload,
}

impl CallShape {
    fn of(function: &Function) -> Option<Self> {
        let types: Vec<&str> = function.inputs.iter().map(|p| p.ty.as_str()).collect();
        match types.as_slice() {
            ["address[]"] => Some(CallShape::Addresses),
            ["address[]", "bytes"] => Some(CallShape::AddressesWithPayload),
            _ => None,
        }
    }
}

/// Read a contract ABI from disk.
///
/// Both a bare JSON array and an artifact object with an `abi` field are accepted.
pub fn load_abi(path: &Path) -> Result<JsonAbi, OracleError> {
    let abi_error = |message: String| OracleError::AbiLoadError {
        path: path.display().to_string(),
        message,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| abi_error(e.to_string()))?;
    parse_abi(&raw).map_err(abi_error)
}

pub fn parse_abi(raw: &str) -> Result<JsonAbi, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;

    let abi_value = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| "artifact object has no `abi` field".to_string())?,
        _ => return Err("ABI must be a JSON array or an object with an `abi` field".to_string()),
    };

    serde_json::from_value(abi_value).map_err(|e| format!("malformed ABI: {e}"))
}

/// Name-keyed view of the submission functions a contract exposes.
#[derive(Debug, Clone, Default)]
pub struct ContractFunctions {
    functions: HashMap<String, (Function, CallShape)>,
    unsupported: HashMap<String, String>,
}

impl ContractFunctions {
    pub fn from_abi(abi: &JsonAbi) -> Self {
        let mut registry = Self::default();

        for function in abi.functions() {
            match CallShape::of(function) {
                Some(shape) => {
                    registry
                        .functions
                        .entry(function.name.clone())
                        .or_insert_with(|| (function.clone(), shape));
                }
                None => {
                    registry
                        .unsupported
                        .entry(function.name.clone())
                        .or_insert_with(|| function.signature());
                }
            }
        }

        registry
    }

    pub fn resolve(&self, function_name: &str) -> Result<(&Function, CallShape), OracleError> {
        if let Some((function, shape)) = self.functions.get(function_name) {
            return Ok((function, *shape));
        }

        if let Some(signature) = self.unsupported.get(function_name) {
            return Err(OracleError::ContractInteractionError {
                message: format!(
                    "Contract function '{function_name}' does not accept an address list"
                ),
                kind: ContractInteractionErrorKind::UnsupportedSignature {
                    function_name: function_name.to_string(),
                    signature: signature.clone(),
                },
            });
        }

        Err(OracleError::unknown_function(function_name))
    }

    /// ABI encode a call to `function_name` with the given addresses and opaque payload.
    ///
    /// The payload is only passed to functions that take a trailing `bytes` argument.
    pub fn encode_call(
        &self,
        function_name: &str,
        addresses: &[Address],
        payload: &Bytes,
    ) -> Result<Bytes, OracleError> {
        let (function, shape) = self.resolve(function_name)?;

        let address_list = DynSolValue::Array(
            addresses
                .iter()
                .map(|address| DynSolValue::Address(*address))
                .collect(),
        );

        let args = match shape {
            CallShape::Addresses => vec![address_list],
            CallShape::AddressesWithPayload => {
                vec![address_list, DynSolValue::Bytes(payload.to_vec())]
            }
        };

        function
            .abi_encode_input(&args)
            .map(Bytes::from)
            .map_err(|e| OracleError::ContractInteractionError {
                message: format!("Failed to encode call to '{function_name}': {e}"),
                kind: ContractInteractionErrorKind::AbiError {
                    message: e.to_string(),
                },
            })
    }
}

/// A contract address bound to its function registry.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: Address,
    pub functions: Arc<ContractFunctions>,
}

impl ContractHandle {
    pub fn new(address: Address, functions: Arc<ContractFunctions>) -> Self {
        Self { address, functions }
    }
}

/// Parse and checksum-normalise a hex address, rejecting anything malformed.
pub fn parse_address(raw: &str) -> Result<Address, OracleError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| OracleError::ValidationError {
            message: format!("Invalid address '{raw}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use alloy::primitives::{address, hex};

    use super::*;

    const ABI: &str = r#"[
        {"type":"function","name":"renewIndexerEligibility","stateMutability":"nonpayable",
         "inputs":[{"name":"indexers","type":"address[]"},{"name":"data","type":"bytes"}],
         "outputs":[{"name":"","type":"uint256"}]},
        {"type":"function","name":"allow","stateMutability":"nonpayable",
         "inputs":[{"name":"indexers","type":"address[]"}],"outputs":[]},
        {"type":"function","name":"owner","stateMutability":"view",
         "inputs":[],"outputs":[{"name":"","type":"address"}]}
    ]"#;

    fn registry() -> ContractFunctions {
        ContractFunctions::from_abi(&parse_abi(ABI).unwrap())
    }

    #[test]
    fn accepts_bare_arrays_and_artifacts() {
        let artifact = format!(r#"{{"contractName":"Oracle","abi":{ABI}}}"#);
        assert_eq!(parse_abi(ABI).unwrap().functions().count(), 3);
        assert_eq!(parse_abi(&artifact).unwrap().functions().count(), 3);
        assert!(parse_abi(r#"{"bytecode":"0x"}"#).is_err());
        assert!(parse_abi("not json").is_err());
    }

    #[test]
    fn missing_file_is_an_abi_load_error() {
        let err = load_abi(Path::new("/nonexistent/abi.json")).unwrap_err();
        assert!(matches!(err, OracleError::AbiLoadError { .. }));
    }

    #[test]
    fn loads_abi_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ABI.as_bytes()).unwrap();
        let abi = load_abi(file.path()).unwrap();
        assert!(abi.function("allow").is_some());
    }

    #[test]
    fn encodes_both_call_shapes() {
        let registry = registry();
        let indexer = address!("0x1111111111111111111111111111111111111111");
        let payload = Bytes::from_static(b"\x01\x02");

        let with_payload = registry
            .encode_call("renewIndexerEligibility", &[indexer], &payload)
            .unwrap();
        let (function, shape) = registry.resolve("renewIndexerEligibility").unwrap();
        assert_eq!(shape, CallShape::AddressesWithPayload);
        assert_eq!(&with_payload[..4], function.selector().as_slice());

        let plain = registry.encode_call("allow", &[indexer], &payload).unwrap();
        assert_eq!(plain.len(), 4 + 32 * 3);
        assert!(hex::encode(&plain).contains("1111111111111111111111111111111111111111"));
    }

    #[test]
    fn unknown_and_unsupported_functions_are_rejected() {
        let registry = registry();
        let err = registry
            .encode_call("doesNotExist", &[], &Bytes::new())
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::ContractInteractionError {
                kind: ContractInteractionErrorKind::UnknownFunction { .. },
                ..
            }
        ));

        let err = registry.resolve("owner").unwrap_err();
        assert!(matches!(
            err,
            OracleError::ContractInteractionError {
                kind: ContractInteractionErrorKind::UnsupportedSignature { .. },
                ..
            }
        ));
    }

    #[test]
    fn address_parsing() {
        assert!(parse_address(" 0x1111111111111111111111111111111111111111 ").is_ok());
        assert!(matches!(
            parse_address("0x1234"),
            Err(OracleError::ValidationError { .. })
        ));
    }
}
