// Governance - Chain parameters read by the staking and evidence machinery
//
// Options are written at genesis (or by a parameter-update flow outside this
// engine) and read-only during block execution.
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::storage::{Prefix, SharedState, StateKey};
use crate::types::{Address, BlockNumber, Coin};

const EVIDENCE_KEY: &[u8] = b"evidence";
const STAKING_KEY: &[u8] = b"staking";
const PROPOSAL_KEY: &[u8] = b"proposal";
const FEE_KEY: &[u8] = b"fee";

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("governance option not found: {0}")]
    OptionNotFound(String),

    #[error("failed to decode governance option: {0}")]
    Codec(String),
}

/// Parameters of the byzantine accountability machinery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOptions {
    /// Votes a validator must have signed inside the trailing window
    pub min_votes_required: u64,
    /// Width of the trailing vote window, in blocks
    pub block_votes_diff: u64,

    /// Penalty taken from a guilty validator's stake
    pub penalty_base_percentage: u64,
    pub penalty_base_decimals: u64,

    /// Share of the penalty paid to the reporter
    pub penalty_bounty_percentage: u64,
    pub penalty_bounty_decimals: u64,

    /// Participation quorum for closing an allegation
    pub validator_vote_percentage: u64,
    pub validator_vote_decimals: u64,

    /// Guilty / innocent decision threshold
    pub allegation_percentage: u64,
    pub allegation_decimals: u64,
}

impl Default for EvidenceOptions {
    fn default() -> Self {
        EvidenceOptions {
            min_votes_required: 2800,
            block_votes_diff: 4000,
            penalty_base_percentage: 30,
            penalty_base_decimals: 100,
            penalty_bounty_percentage: 50,
            penalty_bounty_decimals: 100,
            validator_vote_percentage: 50,
            validator_vote_decimals: 100,
            allegation_percentage: 50,
            allegation_decimals: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingOptions {
    /// Blocks between an unstake and the funds becoming withdrawable
    pub maturity_time: BlockNumber,
}

impl Default for StakingOptions {
    fn default() -> Self {
        StakingOptions {
            maturity_time: 150_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOptions {
    /// Funding account for allegation bounties
    pub bounty_program_addr: Address,
}

impl Default for ProposalOptions {
    fn default() -> Self {
        ProposalOptions {
            bounty_program_addr: Address::from_bytes([0u8; 20]),
        }
    }
}

/// Minimum-fee policy for transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeOption {
    /// Per-gas minimum price, in the fee currency's base units
    pub min_fee: Coin,
}

pub struct GovernanceStore {
    state: SharedState,
}

impl GovernanceStore {
    pub fn new(state: SharedState) -> Self {
        GovernanceStore { state }
    }

    fn key(id: &[u8]) -> StateKey {
        Prefix::GOVERNANCE.key(id)
    }

    fn get<T: DeserializeOwned>(&self, id: &[u8]) -> Result<T, GovernanceError> {
        let raw = self
            .state
            .borrow()
            .get(&Self::key(id))
            .ok_or_else(|| GovernanceError::OptionNotFound(String::from_utf8_lossy(id).into()))?;
        bincode::deserialize(&raw).map_err(|e| GovernanceError::Codec(e.to_string()))
    }

    fn set<T: Serialize>(&self, id: &[u8], value: &T) -> Result<(), GovernanceError> {
        let raw = bincode::serialize(value).map_err(|e| GovernanceError::Codec(e.to_string()))?;
        self.state.borrow_mut().set(&Self::key(id), raw);
        Ok(())
    }

    /// Write every option that is not already present
    pub fn init_defaults(&self, fee: FeeOption) -> Result<(), GovernanceError> {
        if self.get_evidence_options().is_err() {
            self.set_evidence_options(&EvidenceOptions::default())?;
        }
        if self.get_staking_options().is_err() {
            self.set_staking_options(&StakingOptions::default())?;
        }
        if self.get_proposal_options().is_err() {
            self.set_proposal_options(&ProposalOptions::default())?;
        }
        if self.get_fee_option().is_err() {
            self.set_fee_option(&fee)?;
        }
        Ok(())
    }

    pub fn get_evidence_options(&self) -> Result<EvidenceOptions, GovernanceError> {
        self.get(EVIDENCE_KEY)
    }

    pub fn set_evidence_options(&self, opts: &EvidenceOptions) -> Result<(), GovernanceError> {
        self.set(EVIDENCE_KEY, opts)
    }

    pub fn get_staking_options(&self) -> Result<StakingOptions, GovernanceError> {
        self.get(STAKING_KEY)
    }

    pub fn set_staking_options(&self, opts: &StakingOptions) -> Result<(), GovernanceError> {
        self.set(STAKING_KEY, opts)
    }

    pub fn get_proposal_options(&self) -> Result<ProposalOptions, GovernanceError> {
        self.get(PROPOSAL_KEY)
    }

    pub fn set_proposal_options(&self, opts: &ProposalOptions) -> Result<(), GovernanceError> {
        self.set(PROPOSAL_KEY, opts)
    }

    pub fn get_fee_option(&self) -> Result<FeeOption, GovernanceError> {
        self.get(FEE_KEY)
    }

    pub fn set_fee_option(&self, opt: &FeeOption) -> Result<(), GovernanceError> {
        self.set(FEE_KEY, opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, ChainState, Database};
    use crate::types::currency::{CurrencySet, STAKING_CURRENCY};
    use crate::types::Amount;
    use tempfile::TempDir;

    fn fee_option() -> FeeOption {
        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        FeeOption {
            min_fee: olt.coin_from_amount(Amount::pow10(9)),
        }
    }

    #[test]
    fn defaults_then_override() {
        let dir = TempDir::new().unwrap();
        let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
        let store = GovernanceStore::new(state);

        store.init_defaults(fee_option()).unwrap();
        assert_eq!(
            store.get_evidence_options().unwrap(),
            EvidenceOptions::default()
        );
        assert_eq!(store.get_staking_options().unwrap().maturity_time, 150_000);

        let mut opts = EvidenceOptions::default();
        opts.block_votes_diff = 4;
        store.set_evidence_options(&opts).unwrap();
        assert_eq!(store.get_evidence_options().unwrap().block_votes_diff, 4);

        // init again must not clobber the override
        store.init_defaults(fee_option()).unwrap();
        assert_eq!(store.get_evidence_options().unwrap().block_votes_diff, 4);
    }
}
