//! In-memory collaborators for tests: ledger with allowance, wallet sink,
//! KYC registry and a manually driven clock. Plus a scoped log capture.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::{Clock, EligibilityOracle, FundsSink, TokenLedger};
use crate::error::BackendError;
use crate::types::{Address, Balance, Timestamp, TOKEN_DECIMALS};

pub(crate) fn addr(x: u8) -> Address {
    let mut a = [0u8; 20];
    a[0] = x;
    Address(a)
}

#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub(crate) fn at(t: Timestamp) -> Self {
        Self { now: AtomicU64::new(t) }
    }

    pub(crate) fn set(&self, t: Timestamp) {
        self.now.store(t, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct MockLedger {
    address: Address,
    decimals: u8,
    allowance: Mutex<Balance>,
    balances: RwLock<HashMap<Address, Balance>>,
    fail_issue: AtomicBool,
}

impl MockLedger {
    pub(crate) fn new(address: Address) -> Self {
        Self::with_decimals(address, TOKEN_DECIMALS)
    }

    pub(crate) fn with_decimals(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            allowance: Mutex::new(0),
            balances: RwLock::new(HashMap::new()),
            fail_issue: AtomicBool::new(false),
        }
    }

    pub(crate) fn approve(&self, amount: Balance) {
        *self.allowance.lock() = amount;
    }

    pub(crate) fn balance_of(&self, who: Address) -> Balance {
        *self.balances.read().get(&who).unwrap_or(&0)
    }

    pub(crate) fn fail_issue(&self, fail: bool) {
        self.fail_issue.store(fail, Ordering::SeqCst);
    }
}

impl TokenLedger for MockLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn allowance(&self) -> Balance {
        *self.allowance.lock()
    }

    fn issue(&self, beneficiary: Address, amount: Balance) -> Result<(), BackendError> {
        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(BackendError::Other("token transfer reverted".into()));
        }
        let mut allowance = self.allowance.lock();
        if *allowance < amount {
            return Err(BackendError::Insufficient);
        }
        *allowance -= amount;
        *self.balances.write().entry(beneficiary).or_default() += amount;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MockSink {
    address: Address,
    balance: Mutex<Balance>,
    fail_forward: AtomicBool,
    fail_refund: AtomicBool,
}

impl MockSink {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            balance: Mutex::new(0),
            fail_forward: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
        }
    }

    pub(crate) fn balance(&self) -> Balance {
        *self.balance.lock()
    }

    pub(crate) fn fail_forward(&self, fail: bool) {
        self.fail_forward.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_refund(&self, fail: bool) {
        self.fail_refund.store(fail, Ordering::SeqCst);
    }
}

impl FundsSink for MockSink {
    fn address(&self) -> Address {
        self.address
    }

    fn forward(&self, _payer: Address, amount: Balance) -> Result<(), BackendError> {
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("wallet refused transfer".into()));
        }
        *self.balance.lock() += amount;
        Ok(())
    }

    fn refund(&self, _payer: Address, amount: Balance) -> Result<(), BackendError> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("wallet refused refund".into()));
        }
        let mut b = self.balance.lock();
        if *b < amount {
            return Err(BackendError::Insufficient);
        }
        *b -= amount;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct KycRegistry {
    address: Address,
    verified: RwLock<HashSet<Address>>,
}

impl KycRegistry {
    pub(crate) fn new(address: Address) -> Self {
        Self { address, verified: RwLock::new(HashSet::new()) }
    }

    pub(crate) fn verify(&self, who: Address) {
        self.verified.write().insert(who);
    }
}

impl EligibilityOracle for KycRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn is_eligible(&self, who: Address) -> bool {
        self.verified.read().contains(&who)
    }
}

/// Shared buffer the capture subscriber writes formatted events into.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}
