pub mod chain;
pub mod contract;
pub mod error;
pub mod retry;
pub mod signer;
