// Transactions - Signed staking transactions and their handlers
//
// Each kind implements [`Transaction`]; `process_check` and `process_deliver`
// call the same execution function, so mempool admission and block delivery
// cannot diverge. Payloads travel as JSON, signed over the canonical raw-tx
// bytes by every declared signer.
pub mod apply_validator;
pub mod purge;
pub mod stake;
pub mod unstake;
pub mod withdraw;

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::balance::{BalanceError, BalanceStore};
use crate::delegation::{DelegationError, DelegationStore};
use crate::fees::{FeeError, FeePool};
use crate::governance::{GovernanceError, GovernanceStore};
use crate::types::keys::KeyError;
use crate::types::{
    Amount, BlockNumber, Coin, CurrencySet, Gas, RawTx, SignedTx, Timestamp, TxResponse, TxType,
};
use crate::validator::{ValidatorError, ValidatorStore};

pub use apply_validator::ApplyValidatorTx;
pub use purge::PurgeTx;
pub use stake::StakeTx;
pub use unstake::UnstakeTx;
pub use withdraw::WithdrawTx;

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("wrong tx type: {0}")]
    WrongTxType(String),

    #[error("no handler registered for {0}")]
    UnknownTxType(TxType),

    #[error("missing required data")]
    MissingData,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("currency {0} not registered")]
    UnknownCurrency(String),

    #[error("currency {0} not valid for this transaction")]
    InvalidCurrency(String),

    #[error("not enough funds")]
    NotEnoughFund,

    #[error("stake address already in use")]
    StakeAddressInUse,

    #[error(transparent)]
    Signature(#[from] KeyError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),
}

/// Everything a handler may touch, threaded through by the block driver
pub struct TxContext<'a> {
    pub balances: &'a BalanceStore,
    pub delegation: &'a DelegationStore,
    pub validators: &'a ValidatorStore,
    pub governance: &'a GovernanceStore,
    pub fee_pool: &'a FeePool,
    pub currencies: &'a CurrencySet,
    /// Height of the block under execution
    pub height: BlockNumber,
    pub time: Option<Timestamp>,
}

/// A currency-tagged amount as it appears inside transaction payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAmount {
    pub currency: String,
    /// Base units of `currency`
    pub value: Amount,
}

impl TxAmount {
    pub fn new(currency: &str, value: Amount) -> Self {
        TxAmount {
            currency: currency.to_string(),
            value,
        }
    }

    pub fn to_coin(&self, currencies: &CurrencySet) -> Result<Coin, TxError> {
        let currency = currencies
            .get(&self.currency)
            .ok_or_else(|| TxError::UnknownCurrency(self.currency.clone()))?;
        Ok(currency.coin_from_amount(self.value.clone()))
    }
}

/// One transaction kind. `validate` runs stateless and signature checks;
/// `process_check` / `process_deliver` execute against state; `process_fee`
/// settles the declared fee.
pub trait Transaction {
    fn validate(&self, ctx: &TxContext, tx: &SignedTx) -> Result<(), TxError>;

    fn process_check(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError>;

    fn process_deliver(&self, ctx: &TxContext, tx: &RawTx) -> Result<TxResponse, TxError>;

    fn process_fee(&self, ctx: &TxContext, tx: &SignedTx) -> Result<TxResponse, TxError>;
}

/// Dispatch table from tx kind to handler
pub struct Router {
    handlers: HashMap<TxType, Box<dyn Transaction>>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            handlers: HashMap::new(),
        }
    }

    /// All five staking transaction kinds
    pub fn standard() -> Self {
        let mut router = Router::new();
        router.register(TxType::Stake, Box::new(StakeTx));
        router.register(TxType::Unstake, Box::new(UnstakeTx));
        router.register(TxType::Withdraw, Box::new(WithdrawTx));
        router.register(TxType::ApplyValidator, Box::new(ApplyValidatorTx));
        router.register(TxType::Purge, Box::new(PurgeTx));
        router
    }

    pub fn register(&mut self, tx_type: TxType, handler: Box<dyn Transaction>) {
        self.handlers.insert(tx_type, handler);
    }

    pub fn route(&self, tx_type: TxType) -> Option<&dyn Transaction> {
        self.handlers.get(&tx_type).map(|h| h.as_ref())
    }
}

impl Default for Router {
    fn default() -> Self {
        Router::standard()
    }
}

/// Decode a JSON payload, mapping failure to the routing-level error
pub(crate) fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T, TxError> {
    serde_json::from_slice(data).map_err(|e| TxError::WrongTxType(e.to_string()))
}

/// Shared fee settlement: validate the declared fee against the chain minimum
/// and debit `price * weight` from the first signer into the pool
pub fn basic_fee_handling(
    ctx: &TxContext,
    tx: &SignedTx,
    weight: Gas,
) -> Result<TxResponse, TxError> {
    let option = ctx.governance.get_fee_option()?;
    ctx.fee_pool.validate_fee(&option, &tx.raw.fee)?;
    let payer = tx
        .signatures
        .first()
        .ok_or(TxError::MissingData)?
        .signer
        .address();
    let used = ctx.fee_pool.charge(ctx.balances, &payer, &tx.raw.fee, weight)?;
    Ok(TxResponse {
        gas_wanted: tx.raw.fee.gas,
        gas_used: used,
        ..Default::default()
    })
}
