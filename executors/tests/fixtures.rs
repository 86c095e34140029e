#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, B256, U256, address};
use alloy::rpc::types::TransactionRequest;

use oracle_core::chain::{EndpointConnector, NonceTag, PendingTransaction, ReceiptOutcome, RpcEndpoint};
use oracle_core::contract::{ContractFunctions, parse_abi};
use oracle_core::error::{OracleError, RpcErrorKind, RpcErrorResponse};
use oracle_core::retry::RetryPolicy;
use oracle_executors::submission::{SubmissionConfig, SubmissionEngine};
use oracle_executors::webhook::{FailureReport, Notifier, NotifierError, SuccessReport};

pub const PRIVATE_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const SENDER: Address = address!("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23");
pub const CONTRACT: Address = address!("0x9BED32d2b562043a426376b99d289fE821f5b04E");
pub const FUNCTION: &str = "renewIndexerEligibility";
pub const EXPLORER: &str = "https://explorer.test";
pub const CHAIN_ID: u64 = 421614;

pub const TEST_ABI: &str = r#"[
    {"type":"function","name":"renewIndexerEligibility","stateMutability":"nonpayable",
     "inputs":[{"name":"indexers","type":"address[]"},{"name":"data","type":"bytes"}],
     "outputs":[{"name":"","type":"uint256"}]}
]"#;

// Setup tracing for tests
pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "oracle_executors=debug,oracle_core=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Collects formatted log output for the current thread until the guard is dropped.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || logs.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn contract_functions() -> ContractFunctions {
    ContractFunctions::from_abi(&parse_abi(TEST_ABI).unwrap())
}

pub fn indexer(n: u8) -> String {
    format!("0x{}", hex_byte(n).repeat(20))
}

fn hex_byte(n: u8) -> String {
    format!("{n:02x}")
}

pub fn transient_error(url: &str) -> OracleError {
    let kind = RpcErrorKind::OtherTransportError {
        message: "connection refused".to_string(),
    };
    OracleError::RpcError {
        rpc_url: url.to_string(),
        message: kind.to_string(),
        kind,
    }
}

pub fn application_error(url: &str, message: &str) -> OracleError {
    let kind = RpcErrorKind::ErrorResp(RpcErrorResponse {
        code: 3,
        message: message.to_string(),
        data: None,
    });
    OracleError::RpcError {
        rpc_url: url.to_string(),
        message: kind.to_string(),
        kind,
    }
}

/// Every network call a mock endpoint receives, tagged with the endpoint URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String),
    ChainId(String),
    Balance(String),
    EstimateGas(String),
    TransactionCount(String, NonceTag),
    PendingBlock(String),
    BaseFee(String),
    PriorityFee(String),
    Send(String),
    Receipt(String),
}

impl Call {
    pub fn url(&self) -> &str {
        match self {
            Call::Open(url)
            | Call::ChainId(url)
            | Call::Balance(url)
            | Call::EstimateGas(url)
            | Call::TransactionCount(url, _)
            | Call::PendingBlock(url)
            | Call::BaseFee(url)
            | Call::PriorityFee(url)
            | Call::Send(url)
            | Call::Receipt(url) => url,
        }
    }
}

/// Scripted chain state shared by every endpoint the connector opens.
pub struct MockState {
    pub calls: Vec<Call>,
    /// Endpoints that fail every call, including the liveness check.
    pub dead: HashSet<String>,
    /// Endpoints that pass the liveness check but fail everything else.
    pub flaky: HashSet<String>,
    /// The first call matching this takes every endpoint down for good.
    pub outage_trigger: Option<fn(&Call) -> bool>,
    pub outage: bool,
    pub gas_estimate: u64,
    pub estimate_script: VecDeque<Result<u64, OracleError>>,
    pub pending_transactions: Result<Vec<PendingTransaction>, OracleError>,
    pub pending_count: u64,
    pub latest_count: u64,
    pub base_fee: Result<u128, OracleError>,
    pub priority_fee: Result<u128, OracleError>,
    pub receipt_success: bool,
    pub receipt_error: Option<OracleError>,
    pub sent: Vec<TxEnvelope>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            dead: HashSet::new(),
            flaky: HashSet::new(),
            outage_trigger: None,
            outage: false,
            gas_estimate: 100_000,
            estimate_script: VecDeque::new(),
            pending_transactions: Ok(Vec::new()),
            pending_count: 5,
            latest_count: 5,
            base_fee: Ok(100),
            priority_fee: Ok(10),
            receipt_success: true,
            receipt_error: None,
            sent: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn sent(&self) -> Vec<TxEnvelope> {
        self.state().sent.clone()
    }

    pub fn kill(&self, url: &str) {
        self.state().dead.insert(url.to_string());
    }

    pub fn make_flaky(&self, url: &str) {
        self.state().flaky.insert(url.to_string());
    }

    pub fn revive(&self, url: &str) {
        let mut state = self.state();
        state.dead.remove(url);
        state.flaky.remove(url);
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl EndpointConnector for MockConnector {
    type Endpoint = MockEndpoint;

    fn open(&self, url: &str) -> Result<MockEndpoint, OracleError> {
        self.state().calls.push(Call::Open(url.to_string()));
        Ok(MockEndpoint {
            url: url.to_string(),
            state: self.state.clone(),
        })
    }
}

#[derive(Clone)]
pub struct MockEndpoint {
    url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockEndpoint {
    /// Record the call and apply the endpoint's failure mode.
    fn record(&self, call: Call) -> Result<MutexGuard<'_, MockState>, OracleError> {
        let mut state = self.state.lock().unwrap();
        let is_liveness = matches!(call, Call::ChainId(_));
        if state.outage_trigger.is_some_and(|trigger| trigger(&call)) {
            state.outage = true;
        }
        state.calls.push(call);

        if state.outage
            || state.dead.contains(&self.url)
            || (!is_liveness && state.flaky.contains(&self.url))
        {
            return Err(transient_error(&self.url));
        }
        Ok(state)
    }
}

impl RpcEndpoint for MockEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_chain_id(&self) -> Result<u64, OracleError> {
        self.record(Call::ChainId(self.url.clone()))?;
        Ok(CHAIN_ID)
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, OracleError> {
        self.record(Call::Balance(self.url.clone()))?;
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn estimate_gas(&self, _request: TransactionRequest) -> Result<u64, OracleError> {
        let mut state = self.record(Call::EstimateGas(self.url.clone()))?;
        let gas = state.gas_estimate;
        state.estimate_script.pop_front().unwrap_or(Ok(gas))
    }

    async fn get_transaction_count(&self, _address: Address, tag: NonceTag) -> Result<u64, OracleError> {
        let state = self.record(Call::TransactionCount(self.url.clone(), tag))?;
        Ok(match tag {
            NonceTag::Latest => state.latest_count,
            NonceTag::Pending => state.pending_count,
        })
    }

    async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>, OracleError> {
        let state = self.record(Call::PendingBlock(self.url.clone()))?;
        state.pending_transactions.clone()
    }

    async fn get_latest_base_fee(&self) -> Result<u128, OracleError> {
        let state = self.record(Call::BaseFee(self.url.clone()))?;
        state.base_fee.clone()
    }

    async fn get_max_priority_fee(&self) -> Result<u128, OracleError> {
        let state = self.record(Call::PriorityFee(self.url.clone()))?;
        state.priority_fee.clone()
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> Result<B256, OracleError> {
        let mut state = self.record(Call::Send(self.url.clone()))?;
        let hash = *envelope.tx_hash();
        state.sent.push(envelope);
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        transaction_hash: B256,
        _timeout: Duration,
    ) -> Result<ReceiptOutcome, OracleError> {
        let state = self.record(Call::Receipt(self.url.clone()))?;
        if let Some(error) = state.receipt_error.clone() {
            return Err(error);
        }
        Ok(ReceiptOutcome {
            transaction_hash,
            success: state.receipt_success,
            block_number: Some(1),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Info { title: String, message: String },
    Success(SuccessReport),
    Failure(FailureReport),
}

/// Records notifications; optionally fails every delivery.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub notifications: Arc<Mutex<Vec<Notification>>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Info { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) -> Result<(), NotifierError> {
        self.notifications.lock().unwrap().push(notification);
        if self.fail {
            Err(NotifierError::Network("webhook down".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Notifier for RecordingNotifier {
    async fn notify_info(&self, message: &str, title: &str) -> Result<(), NotifierError> {
        self.push(Notification::Info {
            title: title.to_string(),
            message: message.to_string(),
        })
    }

    async fn notify_success(&self, report: &SuccessReport) -> Result<(), NotifierError> {
        self.push(Notification::Success(report.clone()))
    }

    async fn notify_failure(&self, report: &FailureReport) -> Result<(), NotifierError> {
        self.push(Notification::Failure(report.clone()))
    }
}

pub fn config(urls: &[&str]) -> SubmissionConfig {
    SubmissionConfig {
        rpc_urls: urls.iter().map(|url| url.to_string()).collect(),
        contract_address: CONTRACT,
        abi_path: "unused.json".into(),
        block_explorer_url: format!("{EXPLORER}/"),
        tx_timeout: Duration::from_secs(30),
        retry_policy: RetryPolicy::rpc(),
    }
}

pub fn engine(
    urls: &[&str],
    connector: &MockConnector,
    notifier: &RecordingNotifier,
) -> SubmissionEngine<MockConnector, RecordingNotifier> {
    SubmissionEngine::with_contract_functions(
        config(urls),
        contract_functions(),
        connector.clone(),
        notifier.clone(),
    )
}
