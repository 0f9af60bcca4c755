// App - Block driver sequencing the deterministic state transition
//
// Owns every store over one shared state handle and runs the block lifecycle
// the consensus engine dictates: begin_block, any number of deliver_tx calls,
// end_block, commit. Each transaction executes inside a state session so a
// failing handler leaves nothing behind.
use tracing::debug;

use crate::balance::BalanceStore;
use crate::delegation::{DelegationError, DelegationStore};
use crate::evidence::{EvidenceError, EvidenceStore};
use crate::fees::FeePool;
use crate::governance::{FeeOption, GovernanceError, GovernanceStore};
use crate::storage::{SharedState, StateError};
use crate::txs::{Router, TxContext, TxError};
use crate::types::{
    BlockNumber, CurrencySet, Event, GenesisValidator, Hash, PowerUpdate, SignedTx, Timestamp,
    TxResponse, Version,
};
use crate::validator::{BeginBlockInfo, ValidatorContext, ValidatorError, ValidatorStore};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Tx(#[from] TxError),
}

/// What end_block hands back to the consensus engine
#[derive(Debug, Default)]
pub struct EndBlockResult {
    pub power_updates: Vec<PowerUpdate>,
    pub events: Vec<Event>,
}

pub struct App {
    state: SharedState,
    pub validators: ValidatorStore,
    pub balances: BalanceStore,
    pub delegation: DelegationStore,
    pub evidence: EvidenceStore,
    pub governance: GovernanceStore,
    pub fee_pool: FeePool,
    currencies: CurrencySet,
    router: Router,
    height: BlockNumber,
    time: Option<Timestamp>,
}

impl App {
    pub fn new(state: SharedState, currencies: CurrencySet) -> Self {
        App {
            validators: ValidatorStore::new(state.clone()),
            balances: BalanceStore::new(state.clone()),
            delegation: DelegationStore::new(state.clone()),
            evidence: EvidenceStore::new(state.clone()),
            governance: GovernanceStore::new(state.clone()),
            fee_pool: FeePool::new(state.clone()),
            state,
            currencies,
            router: Router::standard(),
            height: 0,
            time: None,
        }
    }

    pub fn currencies(&self) -> &CurrencySet {
        &self.currencies
    }

    /// Genesis: persist chain parameters and the initial validator set
    pub fn init_chain(
        &self,
        genesis: &[GenesisValidator],
        fee: FeeOption,
    ) -> Result<Vec<PowerUpdate>, AppError> {
        self.governance.init_defaults(fee)?;
        Ok(self.validators.init(genesis, &self.currencies)?)
    }

    /// Vote bookkeeping, validator synchronization, missed-vote detection
    pub fn begin_block(&mut self, info: &BeginBlockInfo) -> Result<(), AppError> {
        debug!(height = info.height, "begin block");
        self.height = info.height;
        self.time = info.time;

        self.evidence
            .set_vote_block(info.height, &info.last_commit_votes)?;
        let opts = self.governance.get_evidence_options()?;
        let cv = self.evidence.get_cumulative_vote()?;
        self.evidence
            .set_cumulative_vote(cv, info.height, opts.block_votes_diff)?;

        self.validators.setup(info)?;
        self.validators
            .check_malicious_validators(&self.evidence, &self.governance)?;
        Ok(())
    }

    fn tx_context(&self) -> TxContext<'_> {
        TxContext {
            balances: &self.balances,
            delegation: &self.delegation,
            validators: &self.validators,
            governance: &self.governance,
            fee_pool: &self.fee_pool,
            currencies: &self.currencies,
            height: self.height,
            time: self.time,
        }
    }

    /// Mempool admission: full execution in a session that is always thrown
    /// away
    pub fn check_tx(&self, tx: &SignedTx) -> Result<TxResponse, AppError> {
        let handler = self
            .router
            .route(tx.raw.tx_type)
            .ok_or(TxError::UnknownTxType(tx.raw.tx_type))?;

        self.state.borrow_mut().begin_session()?;
        let result: Result<TxResponse, TxError> = (|| {
            let ctx = self.tx_context();
            handler.validate(&ctx, tx)?;
            let mut response = handler.process_check(&ctx, &tx.raw)?;
            let fee = handler.process_fee(&ctx, tx)?;
            response.gas_wanted = fee.gas_wanted;
            response.gas_used = fee.gas_used;
            Ok(response)
        })();
        self.state.borrow_mut().discard_session()?;
        result.map_err(AppError::from)
    }

    /// Block execution: the session commits into the block buffer only if
    /// validation, delivery, and fee settlement all succeed
    pub fn deliver_tx(&self, tx: &SignedTx) -> Result<TxResponse, AppError> {
        let handler = self
            .router
            .route(tx.raw.tx_type)
            .ok_or(TxError::UnknownTxType(tx.raw.tx_type))?;

        self.state.borrow_mut().begin_session()?;
        let result: Result<TxResponse, TxError> = (|| {
            let ctx = self.tx_context();
            handler.validate(&ctx, tx)?;
            let mut response = handler.process_deliver(&ctx, &tx.raw)?;
            let fee = handler.process_fee(&ctx, tx)?;
            response.gas_wanted = fee.gas_wanted;
            response.gas_used = fee.gas_used;
            Ok(response)
        })();
        match result {
            Ok(response) => {
                self.state.borrow_mut().commit_session()?;
                Ok(response)
            }
            Err(e) => {
                self.state.borrow_mut().discard_session()?;
                Err(e.into())
            }
        }
    }

    /// Allegation resolution, power updates, matured-delegation release
    pub fn end_block(&mut self, height: BlockNumber) -> Result<EndBlockResult, AppError> {
        let active = self.validators.active_count();
        // nothing to resolve before any validator has signed a commit
        if active > 0 {
            let ctx = ValidatorContext {
                balances: &self.balances,
                delegation: &self.delegation,
                evidence: &self.evidence,
                governance: &self.governance,
                currencies: &self.currencies,
            };
            self.validators
                .execute_allegation_tracker(&ctx, active as u64)?;
        }

        let power_updates = self.validators.get_end_block_update(height);
        self.delegation.release_matured(height)?;
        let events = self.validators.drain_events();
        Ok(EndBlockResult {
            power_updates,
            events,
        })
    }

    pub fn commit(&mut self) -> Result<(Hash, Version), AppError> {
        Ok(self.state.borrow_mut().commit()?)
    }
}
