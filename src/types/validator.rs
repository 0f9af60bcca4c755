// Validator - Identity and economic state of one consensus participant
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::currency::STAKING_DECIMALS;
use super::keys::PublicKey;
use super::primitives::{Address, Power};

/// Persisted validator record.
///
/// `power` is always derived from `staked` (see [`calculate_power`]); it is
/// never set independently except for the byzantine-slash path, which zeroes
/// it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Consensus identity; immutable once created
    pub address: Address,
    /// Account that owns the staked capital; mutable only while "clean"
    pub stake_address: Address,
    /// Consensus signing key
    pub pubkey: PublicKey,
    /// Cross-chain witness key
    pub ecdsa_pubkey: PublicKey,
    /// Derived voting weight
    pub power: Power,
    pub name: String,
    /// Capital backing `power`, in staking-currency base units
    pub staked: Amount,
}

impl Validator {
    pub fn new(stake: &Stake) -> Self {
        Validator {
            address: stake.validator_address,
            stake_address: stake.stake_address,
            pubkey: stake.pubkey.clone(),
            ecdsa_pubkey: stake.ecdsa_pubkey.clone(),
            power: calculate_power(&stake.amount),
            name: stake.name.clone(),
            staked: stake.amount.clone(),
        }
    }
}

/// Voting power is the staked amount in whole tokens, truncated.
pub fn calculate_power(staked: &Amount) -> Power {
    staked.div_pow10(STAKING_DECIMALS).to_power()
}

/// Transient stake mutation request; not persisted as an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub validator_address: Address,
    pub stake_address: Address,
    pub pubkey: PublicKey,
    pub ecdsa_pubkey: PublicKey,
    pub name: String,
    /// Base units of the staking currency
    pub amount: Amount,
}

/// Transient unstake mutation request; also the persisted payload of a
/// delayed (penalty-derived) unstake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unstake {
    pub address: Address,
    pub amount: Amount,
}

/// One genesis validator entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    pub stake_address: Address,
    pub pubkey: PublicKey,
    pub ecdsa_pubkey: PublicKey,
    pub name: String,
    /// Genesis power, taken verbatim (the usual derivation is bypassed)
    pub power: Power,
}

/// A voting-power change reported to the consensus engine at end of block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpdate {
    pub pubkey: PublicKey,
    pub power: Power,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_is_whole_tokens() {
        // 2.7 OLT in base units floors to power 2
        let staked = Amount::from_u64(27).mul_pow10(17);
        assert_eq!(calculate_power(&staked), 2);
        assert_eq!(calculate_power(&Amount::zero()), 0);
    }
}
