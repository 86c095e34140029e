use std::fmt;

use oracle_core::error::OracleError;

/// The named steps of a chunk submission, used to label failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Validate,
    Connect,
    EstimateGas,
    ResolveNonce,
    GetFees,
    Build,
    Sign,
    Send,
    AwaitReceipt,
}

impl SubmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStage::Validate => "validate",
            SubmissionStage::Connect => "connect",
            SubmissionStage::EstimateGas => "estimate-gas",
            SubmissionStage::ResolveNonce => "resolve-nonce",
            SubmissionStage::GetFees => "get-fees",
            SubmissionStage::Build => "build",
            SubmissionStage::Sign => "sign",
            SubmissionStage::Send => "send",
            SubmissionStage::AwaitReceipt => "await-receipt",
        }
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags a failing step with its stage before it propagates.
pub trait StageResultExt<T> {
    fn at_stage(self, stage: SubmissionStage) -> Result<T, OracleError>;
}

impl<T> StageResultExt<T> for Result<T, OracleError> {
    fn at_stage(self, stage: SubmissionStage) -> Result<T, OracleError> {
        if let Err(error) = &self {
            tracing::error!(
                stage = stage.as_str(),
                error = %error,
                "Batch submission failed"
            );
        }
        self
    }
}
