// ValidatorStore - Authoritative validator records and per-block lifecycle
//
// Validator records live under `val/<address>`; penalty-derived delayed
// unstakes under `vpg/unstake/<height>/<address>`. The queue is rebuilt from
// persisted state every block and never outlives it.
pub mod accountability;
pub mod queue;

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::balance::{BalanceError, BalanceStore};
use crate::delegation::{DelegationError, DelegationStore};
use crate::evidence::{EvidenceError, EvidenceStore, LastValidatorHistory, VoteInfo};
use crate::governance::{GovernanceError, GovernanceStore};
use crate::storage::{Prefix, SharedState};
use crate::types::currency::STAKING_CURRENCY;
use crate::types::validator::calculate_power;
use crate::types::{
    Address, Amount, BlockNumber, CurrencySet, Event, GenesisValidator, Power, PowerUpdate, Stake,
    Timestamp, Unstake, Validator,
};
use queue::ValidatorQueue;

/// Upper bound on power updates reported to the consensus engine per block
pub const MAX_POWER_UPDATES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("stake token not registered")]
    StakeTokenNotRegistered,

    #[error("invalid pubkey type for validator {0}")]
    InvalidPubkeyType(Address),

    #[error("validator set not match to last commit")]
    ValidatorSetMismatch,

    #[error("validator {0} not found")]
    ValidatorNotFound(Address),

    #[error("insufficient stake for {address}: have {have}, need {need}")]
    InsufficientStake {
        address: Address,
        have: Amount,
        need: Amount,
    },

    #[error("last block time not set")]
    NoBlockTime,

    #[error("active validator count could not be zero")]
    ZeroActiveCount,

    #[error("failed to decode validator record: {0}")]
    Codec(String),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Balance(#[from] BalanceError),
}

/// Collaborator stores threaded through block-level operations
pub struct ValidatorContext<'a> {
    pub balances: &'a BalanceStore,
    pub delegation: &'a DelegationStore,
    pub evidence: &'a EvidenceStore,
    pub governance: &'a GovernanceStore,
    pub currencies: &'a CurrencySet,
}

/// Per-block inputs handed over by the consensus engine
#[derive(Debug, Clone)]
pub struct BeginBlockInfo {
    pub height: BlockNumber,
    pub time: Option<Timestamp>,
    pub proposer: Address,
    pub last_commit_votes: Vec<VoteInfo>,
    /// Validators the consensus engine proved byzantine (e.g. double-sign)
    pub byzantine: Vec<Address>,
}

pub struct ValidatorStore {
    state: SharedState,
    queue: ValidatorQueue,
    proposer: Address,
    byzantine: Vec<Validator>,
    last_active: BTreeMap<Address, Power>,
    malicious: BTreeMap<Address, LastValidatorHistory>,
    total_power: Power,
    last_height: BlockNumber,
    last_block_time: Option<Timestamp>,
    events: Vec<Event>,
}

impl ValidatorStore {
    pub fn new(state: SharedState) -> Self {
        ValidatorStore {
            state,
            queue: ValidatorQueue::new(),
            proposer: Address::from_bytes([0u8; 20]),
            byzantine: Vec::new(),
            last_active: BTreeMap::new(),
            malicious: BTreeMap::new(),
            total_power: 0,
            last_height: 0,
            last_block_time: None,
            events: Vec::new(),
        }
    }

    // --- record access ---------------------------------------------------

    pub fn get(&self, address: &Address) -> Result<Validator, ValidatorError> {
        match self.state.borrow().get(&Prefix::validator(address)) {
            Some(raw) => {
                bincode::deserialize(&raw).map_err(|e| ValidatorError::Codec(e.to_string()))
            }
            None => Err(ValidatorError::ValidatorNotFound(*address)),
        }
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.state.borrow().exists(&Prefix::validator(address))
    }

    pub fn set(&self, validator: &Validator) -> Result<(), ValidatorError> {
        let raw =
            bincode::serialize(validator).map_err(|e| ValidatorError::Codec(e.to_string()))?;
        self.state
            .borrow_mut()
            .set(&Prefix::validator(&validator.address), raw);
        Ok(())
    }

    /// Validator record as committed at `height`, or `None`
    pub fn get_at(&self, height: BlockNumber, address: &Address) -> Option<Validator> {
        let state = self.state.borrow();
        let raw = state.snapshot_at(height).get(&Prefix::validator(address))?;
        match bincode::deserialize(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                error!(%address, "undecodable versioned validator record: {e}");
                None
            }
        }
    }

    /// All persisted validators in key order
    pub fn iterate(&self) -> Vec<Validator> {
        let (start, end) = Prefix::VALIDATOR.range(b"");
        let pairs = self.state.borrow().range(&start, &end, false);
        let mut out = Vec::with_capacity(pairs.len());
        for (_, raw) in pairs {
            match bincode::deserialize::<Validator>(&raw) {
                Ok(v) => out.push(v),
                Err(e) => error!("undecodable validator record: {e}"),
            }
        }
        out
    }

    pub fn get_validator_set(&self) -> Vec<Validator> {
        self.iterate()
    }

    pub fn is_validator_address(&self, address: &Address) -> bool {
        self.get(address).map(|v| v.power > 0).unwrap_or(false)
    }

    pub fn total_power(&self) -> Power {
        self.total_power
    }

    pub fn last_height(&self) -> BlockNumber {
        self.last_height
    }

    pub fn proposer(&self) -> &Address {
        &self.proposer
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Validators that signed the previous block's commit
    pub fn active_count(&self) -> usize {
        self.last_active.len()
    }

    pub(crate) fn malicious_count(&self) -> usize {
        self.malicious.len()
    }

    pub(crate) fn last_block_time(&self) -> Option<Timestamp> {
        self.last_block_time
    }

    // --- genesis ---------------------------------------------------------

    /// Persist the genesis validator set. Power is taken verbatim from
    /// genesis; `staked` is backfilled as whole tokens so the derivation
    /// invariant holds from the first block.
    pub fn init(
        &self,
        genesis: &[GenesisValidator],
        currencies: &CurrencySet,
    ) -> Result<Vec<PowerUpdate>, ValidatorError> {
        let currency = currencies
            .get(STAKING_CURRENCY)
            .ok_or(ValidatorError::StakeTokenNotRegistered)?;

        let mut updates = Vec::with_capacity(genesis.len());
        for gv in genesis {
            gv.pubkey
                .verifying_key()
                .map_err(|_| ValidatorError::InvalidPubkeyType(gv.address))?;

            let validator = Validator {
                address: gv.address,
                stake_address: gv.stake_address,
                pubkey: gv.pubkey.clone(),
                ecdsa_pubkey: gv.ecdsa_pubkey.clone(),
                power: gv.power,
                name: gv.name.clone(),
                staked: currency.coin_from_int(gv.power.max(0) as u64).amount,
            };
            self.set(&validator)?;
            updates.push(PowerUpdate {
                pubkey: gv.pubkey.clone(),
                power: gv.power,
            });
        }
        Ok(updates)
    }

    // --- per-block synchronization ---------------------------------------

    /// Once per block, before any transaction: byzantine slashing, delayed
    /// penalty application, queue rebuild, active-set caching.
    pub fn setup(&mut self, info: &BeginBlockInfo) -> Result<(), ValidatorError> {
        self.last_height = info.height;
        self.last_block_time = info.time;
        self.proposer = info.proposer;

        // divergence from the replicated log is fatal, not recoverable
        for vote in &info.last_commit_votes {
            if !self.exists(&vote.address) {
                return Err(ValidatorError::ValidatorSetMismatch);
            }
        }

        self.byzantine.clear();
        for addr in &info.byzantine {
            let mut validator = match self.get(addr) {
                Ok(v) => v,
                Err(_) => {
                    warn!(address = %addr, "byzantine evidence for unknown validator");
                    continue;
                }
            };
            validator.power = 0;
            self.set(&validator)?;
            info!(address = %addr, "slashed byzantine validator");
            self.byzantine.push(validator);
        }

        self.apply_postponed_unstakes()?;
        self.rebuild_queue();
        self.cache_active_validators(&info.last_commit_votes);
        Ok(())
    }

    /// Apply delayed unstakes written by a guilty verdict one block ago
    fn apply_postponed_unstakes(&mut self) -> Result<(), ValidatorError> {
        if self.last_height == 0 {
            return Ok(());
        }
        let verdict_height = self.last_height - 1;
        for validator in self.iterate() {
            let Some(unstake) = self.get_delay_unstake(verdict_height, &validator.address) else {
                continue;
            };
            match self.handle_unstake(&unstake) {
                Ok(()) => {
                    info!(
                        address = %validator.address,
                        amount = %unstake.amount,
                        "applied postponed unstake"
                    );
                    self.state
                        .borrow_mut()
                        .delete(&Prefix::delayed_unstake(verdict_height, &validator.address));
                }
                Err(e) => {
                    error!(address = %validator.address, "postponed unstake failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Rebuild the queue from the previous block's committed powers
    fn rebuild_queue(&mut self) {
        self.queue.clear();
        self.total_power = 0;
        for validator in self.iterate() {
            let Some(prev) = self.get_at(self.last_height.saturating_sub(1), &validator.address)
            else {
                continue;
            };
            self.queue.push(prev.address, prev.power);
            self.total_power += prev.power;
        }
    }

    fn cache_active_validators(&mut self, votes: &[VoteInfo]) {
        self.last_active.clear();
        for vote in votes {
            self.last_active.insert(vote.address, vote.power);
        }
    }

    // --- stake mutation --------------------------------------------------

    /// Create or grow a validator. The stake address only changes when the
    /// caller explicitly allows it, after passing the clean-address gate.
    pub fn handle_stake(
        &self,
        stake: &Stake,
        update_stake_address: bool,
    ) -> Result<(), ValidatorError> {
        let validator = if !self.exists(&stake.validator_address) {
            Validator::new(stake)
        } else {
            let mut existing = self.get(&stake.validator_address)?;
            existing.staked = existing.staked.plus(&stake.amount);
            existing.power = calculate_power(&existing.staked);
            if update_stake_address {
                info!(
                    old = %existing.stake_address,
                    new = %stake.stake_address,
                    "updating stake address"
                );
                existing.stake_address = stake.stake_address;
            }
            existing
        };
        self.set(&validator)
    }

    pub fn handle_unstake(&self, unstake: &Unstake) -> Result<(), ValidatorError> {
        let mut validator = self.get(&unstake.address)?;
        let left = validator.staked.minus(&unstake.amount).ok_or_else(|| {
            ValidatorError::InsufficientStake {
                address: unstake.address,
                have: validator.staked.clone(),
                need: unstake.amount.clone(),
            }
        })?;
        validator.staked = left;
        validator.power = calculate_power(&validator.staked);
        self.set(&validator)
    }

    // --- delayed unstakes ------------------------------------------------

    pub fn set_delay_unstake(&self, unstake: &Unstake) -> Result<(), ValidatorError> {
        let raw =
            bincode::serialize(unstake).map_err(|e| ValidatorError::Codec(e.to_string()))?;
        self.state
            .borrow_mut()
            .set(&Prefix::delayed_unstake(self.last_height, &unstake.address), raw);
        Ok(())
    }

    pub fn get_delay_unstake(
        &self,
        verdict_height: BlockNumber,
        address: &Address,
    ) -> Option<Unstake> {
        let raw = self
            .state
            .borrow()
            .get(&Prefix::delayed_unstake(verdict_height, address))?;
        match bincode::deserialize(&raw) {
            Ok(u) => Some(u),
            Err(e) => {
                error!(%address, "undecodable delayed unstake: {e}");
                None
            }
        }
    }

    // --- end of block ----------------------------------------------------

    /// Drain up to [`MAX_POWER_UPDATES`] queue entries into consensus power
    /// updates, purging validators whose committed power dropped to zero.
    /// Entries left in the queue are dropped; the next `Setup` rebuilds them
    /// from persisted state, so only reporting is rate-limited.
    pub fn get_end_block_update(&mut self, height: BlockNumber) -> Vec<PowerUpdate> {
        let mut updates = Vec::new();
        if height <= 1 && self.byzantine.is_empty() {
            return updates;
        }

        while updates.len() < MAX_POWER_UPDATES {
            let Some(entry) = self.queue.pop() else {
                break;
            };
            let Some(validator) = self.get_at(height.saturating_sub(1), &entry.address) else {
                error!(address = %entry.address, "previous state data not found");
                continue;
            };
            if validator.power <= 0 {
                self.state
                    .borrow_mut()
                    .delete(&Prefix::validator(&validator.address));
            }
            updates.push(PowerUpdate {
                pubkey: validator.pubkey.clone(),
                power: validator.power,
            });
        }
        updates
    }

    // --- events ----------------------------------------------------------

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn get_events(&self) -> &[Event] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
