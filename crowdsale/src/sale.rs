// crowdsale/src/sale.rs
//! Purchase orchestration.
//!
//! A purchase is checked in a fixed order and short-circuits on the first
//! failure: stage open -> beneficiary -> payment -> eligibility -> presale
//! minimum -> quote -> cap -> allowance. Only then are funds forwarded and
//! tokens issued. If issuance fails the forward is refunded and `tokens_sold`
//! is left alone, so a rejected purchase has no observable effect.
//!
//! The one exception: if issuance fails and the refund fails too, the payment
//! stays with the funds sink. Sale state is still untouched and the issuance
//! error is returned, but the payer has to be made whole out of band. That
//! case is logged at `error!` with the payer and amount.
//!
//! Concurrency: every purchase runs under the sale's execute mutex, so the
//! cap check and the `tokens_sold` update form one critical section. Readers
//! only take the state `RwLock`.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{Clock, EligibilityOracle, FundsSink, SystemClock, TokenLedger};
use crate::caps::CapConfig;
use crate::config::{SaleParams, DEFAULT_EVENT_CAPACITY};
use crate::error::SaleError;
use crate::pricing::{PricingConfig, Quote};
use crate::schedule::{SaleSchedule, Stage};
use crate::types::{Address, Balance, TOKEN_DECIMALS};

// ---------- Events / results ----------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaleEvent {
    TokenPurchase {
        payer: Address,
        beneficiary: Address,
        stage: Stage,
        payment: Balance,
        tokens: Balance,
    },
}

/// Outcome of an accepted purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub stage: Stage,
    pub payment: Balance,
    pub base: Balance,
    pub bonus: Balance,
    pub tokens: Balance,
    pub tokens_sold_after: Balance,
}

/// Mutable sale state. Only a successful purchase changes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaleState {
    pub tokens_sold: Balance,
    pub purchases: u64,
    pub payment_forwarded: Balance,
}

/// Read-only view at the current clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub stage: Stage,
    pub tokens_sold: Balance,
    /// Headroom under the cap that applies to `stage`.
    pub remaining: Balance,
    pub has_ended: bool,
    pub purchases: u64,
    pub payment_forwarded: Balance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    /// Payer buys for themselves.
    Direct,
    /// Payer buys on behalf of a distinct beneficiary.
    Proxy,
}

// ---------- Builder ----------

/// Assembles a [`Crowdsale`], checking every construction invariant.
#[derive(Default)]
pub struct CrowdsaleBuilder {
    schedule: Option<SaleSchedule>,
    pricing: Option<PricingConfig>,
    caps: Option<CapConfig>,
    ledger: Option<Arc<dyn TokenLedger>>,
    sink: Option<Arc<dyn FundsSink>>,
    kyc: Option<Arc<dyn EligibilityOracle>>,
    clock: Option<Arc<dyn Clock>>,
    event_capacity: Option<usize>,
}

impl CrowdsaleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(p: SaleParams) -> Self {
        Self::new()
            .schedule(p.schedule)
            .pricing(p.pricing)
            .caps(p.caps)
            .event_capacity(p.events.capacity)
    }

    pub fn schedule(mut self, s: SaleSchedule) -> Self {
        self.schedule = Some(s);
        self
    }

    pub fn pricing(mut self, p: PricingConfig) -> Self {
        self.pricing = Some(p);
        self
    }

    pub fn caps(mut self, c: CapConfig) -> Self {
        self.caps = Some(c);
        self
    }

    pub fn token_ledger(mut self, l: Arc<dyn TokenLedger>) -> Self {
        self.ledger = Some(l);
        self
    }

    pub fn funds_sink(mut self, s: Arc<dyn FundsSink>) -> Self {
        self.sink = Some(s);
        self
    }

    /// Enables KYC gating. Without it every identity is accepted.
    pub fn eligibility(mut self, o: Arc<dyn EligibilityOracle>) -> Self {
        self.kyc = Some(o);
        self
    }

    pub fn clock(mut self, c: Arc<dyn Clock>) -> Self {
        self.clock = Some(c);
        self
    }

    pub fn event_capacity(mut self, n: usize) -> Self {
        self.event_capacity = Some(n);
        self
    }

    pub fn build(self) -> Result<Arc<Crowdsale>, SaleError> {
        let schedule = self.schedule.ok_or_else(|| SaleError::invalid("schedule is required"))?;
        let pricing = self.pricing.ok_or_else(|| SaleError::invalid("pricing is required"))?;
        let caps = self.caps.ok_or_else(|| SaleError::invalid("caps are required"))?;
        let ledger = self.ledger.ok_or_else(|| SaleError::invalid("token ledger is required"))?;
        let sink = self.sink.ok_or_else(|| SaleError::invalid("funds sink is required"))?;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let event_capacity = self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);

        schedule.validate(clock.now_unix())?;
        pricing.validate()?;
        caps.validate()?;
        if event_capacity == 0 {
            return Err(SaleError::invalid("event capacity must be > 0"));
        }
        if ledger.decimals() != TOKEN_DECIMALS {
            return Err(SaleError::invalid(format!(
                "token decimals {} != {}",
                ledger.decimals(),
                TOKEN_DECIMALS
            )));
        }
        check_identities(sink.address(), ledger.address(), self.kyc.as_ref().map(|k| k.address()))?;

        let (events_tx, _) = broadcast::channel(event_capacity);
        Ok(Arc::new(Crowdsale {
            schedule,
            pricing,
            caps,
            ledger,
            sink,
            kyc: self.kyc,
            clock,
            exec: Mutex::new(()),
            state: RwLock::new(SaleState::default()),
            events_tx,
        }))
    }
}

/// Wallet, token and KYC registry must be set and pairwise distinct.
fn check_identities(wallet: Address, token: Address, kyc: Option<Address>) -> Result<(), SaleError> {
    if wallet.is_zero() {
        return Err(SaleError::invalid("wallet address is zero"));
    }
    if token.is_zero() {
        return Err(SaleError::invalid("token address is zero"));
    }
    if wallet == token {
        return Err(SaleError::invalid("wallet equals token"));
    }
    if let Some(kyc) = kyc {
        if kyc.is_zero() {
            return Err(SaleError::invalid("kyc registry address is zero"));
        }
        if kyc == token {
            return Err(SaleError::invalid("kyc registry equals token"));
        }
        if kyc == wallet {
            return Err(SaleError::invalid("kyc registry equals wallet"));
        }
    }
    Ok(())
}

// ---------- Sale core ----------

pub struct Crowdsale {
    schedule: SaleSchedule,
    pricing: PricingConfig,
    caps: CapConfig,
    ledger: Arc<dyn TokenLedger>,
    sink: Arc<dyn FundsSink>,
    kyc: Option<Arc<dyn EligibilityOracle>>,
    clock: Arc<dyn Clock>,
    /// Serializes purchases.
    exec: Mutex<()>,
    state: RwLock<SaleState>,
    events_tx: broadcast::Sender<SaleEvent>,
}

impl fmt::Debug for Crowdsale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crowdsale")
            .field("schedule", &self.schedule)
            .field("pricing", &self.pricing)
            .field("caps", &self.caps)
            .field("kyc", &self.kyc.is_some())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Crowdsale {
    pub fn builder() -> CrowdsaleBuilder {
        CrowdsaleBuilder::new()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaleEvent> {
        self.events_tx.subscribe()
    }

    pub fn schedule(&self) -> &SaleSchedule {
        &self.schedule
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    pub fn caps(&self) -> &CapConfig {
        &self.caps
    }

    /// Destination of raised funds.
    pub fn wallet(&self) -> Address {
        self.sink.address()
    }

    pub fn token(&self) -> Address {
        self.ledger.address()
    }

    pub fn kyc_registry(&self) -> Option<Address> {
        self.kyc.as_ref().map(|k| k.address())
    }

    pub fn tokens_sold(&self) -> Balance {
        self.state.read().tokens_sold
    }

    pub fn stage(&self) -> Stage {
        self.schedule.stage_at(self.clock.now_unix())
    }

    /// True once the end time passed or the global cap is sold out.
    pub fn has_ended(&self) -> bool {
        let sold = self.tokens_sold();
        self.schedule.is_ended(self.clock.now_unix(), sold, self.caps.global_cap)
    }

    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now_unix();
        let st = *self.state.read();
        let stage = self.schedule.stage_at(now);
        Snapshot {
            stage,
            tokens_sold: st.tokens_sold,
            remaining: if stage.is_open() { self.caps.remaining(stage, st.tokens_sold) } else { 0 },
            has_ended: self.schedule.is_ended(now, st.tokens_sold, self.caps.global_cap),
            purchases: st.purchases,
            payment_forwarded: st.payment_forwarded,
        }
    }

    /// Buy tokens for `beneficiary` with `payment`. Under KYC gating the
    /// payer and the beneficiary must be the same verified identity.
    #[instrument(level = "debug", skip(self), target = "crowdsale")]
    pub fn purchase(
        &self,
        payer: Address,
        beneficiary: Address,
        payment: Balance,
    ) -> Result<PurchaseReceipt, SaleError> {
        self.execute(payer, beneficiary, payment, Route::Direct)
    }

    /// Buy on behalf of someone else. Under KYC gating both identities must
    /// pass the oracle independently.
    #[instrument(level = "debug", skip(self), target = "crowdsale")]
    pub fn proxy_purchase(
        &self,
        payer: Address,
        beneficiary: Address,
        payment: Balance,
    ) -> Result<PurchaseReceipt, SaleError> {
        self.execute(payer, beneficiary, payment, Route::Proxy)
    }

    /// Plain transfer with no call data: the payer is the beneficiary.
    pub fn fallback_purchase(&self, payer: Address, payment: Balance) -> Result<PurchaseReceipt, SaleError> {
        self.purchase(payer, payer, payment)
    }

    fn execute(
        &self,
        payer: Address,
        beneficiary: Address,
        payment: Balance,
        route: Route,
    ) -> Result<PurchaseReceipt, SaleError> {
        let res = self.try_execute(payer, beneficiary, payment, route);
        if let Err(e) = &res {
            debug!(target: "crowdsale", %payer, %beneficiary, payment, error = %e, "purchase rejected");
        }
        res
    }

    fn try_execute(
        &self,
        payer: Address,
        beneficiary: Address,
        payment: Balance,
        route: Route,
    ) -> Result<PurchaseReceipt, SaleError> {
        let _ex = self.exec.lock();

        let stage = self.stage();
        if !stage.is_open() {
            return Err(SaleError::SaleNotOpen(stage));
        }
        if beneficiary.is_zero() {
            return Err(SaleError::InvalidBeneficiary);
        }
        if payment == 0 {
            return Err(SaleError::ZeroPayment);
        }
        self.check_eligibility(payer, beneficiary, route)?;
        if stage.is_private_presale() && payment < self.pricing.minimum_deposit {
            return Err(SaleError::BelowMinimumDeposit);
        }

        let Quote { base, bonus, total: tokens } = self.pricing.quote(payment, stage)?;
        let current = *self.state.read();
        let proposed = current.tokens_sold.checked_add(tokens).ok_or(SaleError::MathOverflow)?;
        self.caps.admit(proposed, stage)?;
        if self.ledger.allowance() < tokens {
            return Err(SaleError::InsufficientAllowance);
        }
        let next = SaleState {
            tokens_sold: proposed,
            purchases: current.purchases.checked_add(1).ok_or(SaleError::MathOverflow)?,
            payment_forwarded: current
                .payment_forwarded
                .checked_add(payment)
                .ok_or(SaleError::MathOverflow)?,
        };

        self.settle(payer, beneficiary, payment, tokens)?;

        *self.state.write() = next;

        info!(
            target: "crowdsale",
            %payer, %beneficiary, ?stage, payment, tokens, tokens_sold = proposed,
            "token purchase"
        );
        let _ = self.events_tx.send(SaleEvent::TokenPurchase { payer, beneficiary, stage, payment, tokens });

        Ok(PurchaseReceipt { stage, payment, base, bonus, tokens, tokens_sold_after: proposed })
    }

    fn check_eligibility(&self, payer: Address, beneficiary: Address, route: Route) -> Result<(), SaleError> {
        let Some(kyc) = &self.kyc else {
            return Ok(());
        };
        if route == Route::Direct && payer != beneficiary {
            return Err(SaleError::NotEligible);
        }
        if !kyc.is_eligible(payer) || !kyc.is_eligible(beneficiary) {
            return Err(SaleError::NotEligible);
        }
        Ok(())
    }

    /// Forward funds, then issue tokens; refund the forward if issuance fails.
    /// A failed refund leaves `payment` with the sink and is only logged.
    fn settle(&self, payer: Address, beneficiary: Address, payment: Balance, tokens: Balance) -> Result<(), SaleError> {
        self.sink.forward(payer, payment)?;
        if let Err(e) = self.ledger.issue(beneficiary, tokens) {
            warn!(target: "crowdsale", %payer, payment, error = %e, "issuance failed, refunding payment");
            if let Err(re) = self.sink.refund(payer, payment) {
                error!(target: "crowdsale", %payer, payment, error = %re, "refund after failed issuance failed");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

// ---------- Tests ----------
