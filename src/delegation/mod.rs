// Delegation - Staked / bounded capital bookkeeping with maturity scheduling
//
// Four sub-ledgers, all under the `del` prefix:
//   t/<validator>            total staked behind a validator
//   p/<validator>/<delegator>  the (validator, delegator) pair amount
//   e/<delegator>            delegator's effective (actively staked) amount
//   b/<delegator>            delegator's bounded (withdrawable) amount
//   m/<height be>            entries maturing at <height>
//
// Every mutation keeps `t/<v> == sum of p/<v>/<d>`: stake, unstake and
// penalize each touch both ledgers or fail atomically before writing.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{Prefix, SharedState, StateKey};
use crate::types::{Address, Amount, BlockNumber};

#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("{ledger} underflow for {address}: have {have}, need {need}")]
    Underflow {
        ledger: &'static str,
        address: Address,
        have: Amount,
        need: Amount,
    },

    #[error("failed to decode delegation record: {0}")]
    Codec(String),
}

/// One scheduled release, stored inside a mature block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatureEntry {
    pub address: Address,
    pub amount: Amount,
}

pub struct DelegationStore {
    state: SharedState,
}

impl DelegationStore {
    pub fn new(state: SharedState) -> Self {
        DelegationStore { state }
    }

    fn total_key(validator: &Address) -> StateKey {
        let mut id = Vec::with_capacity(2 + Address::LEN);
        id.extend_from_slice(b"t/");
        id.extend_from_slice(validator.as_ref());
        Prefix::DELEGATION.key(&id)
    }

    fn pair_key(validator: &Address, delegator: &Address) -> StateKey {
        let mut id = Vec::with_capacity(3 + 2 * Address::LEN);
        id.extend_from_slice(b"p/");
        id.extend_from_slice(validator.as_ref());
        id.push(b'/');
        id.extend_from_slice(delegator.as_ref());
        Prefix::DELEGATION.key(&id)
    }

    fn effective_key(delegator: &Address) -> StateKey {
        let mut id = Vec::with_capacity(2 + Address::LEN);
        id.extend_from_slice(b"e/");
        id.extend_from_slice(delegator.as_ref());
        Prefix::DELEGATION.key(&id)
    }

    fn bounded_key(delegator: &Address) -> StateKey {
        let mut id = Vec::with_capacity(2 + Address::LEN);
        id.extend_from_slice(b"b/");
        id.extend_from_slice(delegator.as_ref());
        Prefix::DELEGATION.key(&id)
    }

    fn mature_key(height: BlockNumber) -> StateKey {
        let mut id = Vec::with_capacity(2 + 8);
        id.extend_from_slice(b"m/");
        id.extend_from_slice(&height.to_be_bytes());
        Prefix::DELEGATION.key(&id)
    }

    fn get_amount(&self, key: &StateKey) -> Result<Amount, DelegationError> {
        match self.state.borrow().get(key) {
            Some(raw) => {
                bincode::deserialize(&raw).map_err(|e| DelegationError::Codec(e.to_string()))
            }
            None => Ok(Amount::zero()),
        }
    }

    fn put_amount(&self, key: &StateKey, amount: &Amount) -> Result<(), DelegationError> {
        let raw = bincode::serialize(amount).map_err(|e| DelegationError::Codec(e.to_string()))?;
        self.state.borrow_mut().set(key, raw);
        Ok(())
    }

    fn mature_block(&self, height: BlockNumber) -> Result<Vec<MatureEntry>, DelegationError> {
        match self.state.borrow().get(&Self::mature_key(height)) {
            Some(raw) => {
                bincode::deserialize(&raw).map_err(|e| DelegationError::Codec(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    // --- getters ---------------------------------------------------------

    pub fn validator_total(&self, validator: &Address) -> Result<Amount, DelegationError> {
        self.get_amount(&Self::total_key(validator))
    }

    pub fn pair_amount(
        &self,
        validator: &Address,
        delegator: &Address,
    ) -> Result<Amount, DelegationError> {
        self.get_amount(&Self::pair_key(validator, delegator))
    }

    pub fn effective_amount(&self, delegator: &Address) -> Result<Amount, DelegationError> {
        self.get_amount(&Self::effective_key(delegator))
    }

    pub fn bounded_amount(&self, delegator: &Address) -> Result<Amount, DelegationError> {
        self.get_amount(&Self::bounded_key(delegator))
    }

    /// Sum of pending mature entries for `delegator` with release heights in
    /// `[from, from + count)`
    pub fn matured_pending(
        &self,
        delegator: &Address,
        from: BlockNumber,
        count: BlockNumber,
    ) -> Result<Amount, DelegationError> {
        let mut sum = Amount::zero();
        for height in from..from.saturating_add(count) {
            for entry in self.mature_block(height)? {
                if entry.address == *delegator {
                    sum = sum.plus(&entry.amount);
                }
            }
        }
        Ok(sum)
    }

    // --- mutations -------------------------------------------------------

    pub fn stake(
        &self,
        validator: &Address,
        delegator: &Address,
        amount: &Amount,
    ) -> Result<(), DelegationError> {
        let total = self.validator_total(validator)?.plus(amount);
        let pair = self.pair_amount(validator, delegator)?.plus(amount);
        let effective = self.effective_amount(delegator)?.plus(amount);

        self.put_amount(&Self::total_key(validator), &total)?;
        self.put_amount(&Self::pair_key(validator, delegator), &pair)?;
        self.put_amount(&Self::effective_key(delegator), &effective)
    }

    /// Move `amount` out of the live ledgers and schedule its release to the
    /// delegator's bounded ledger at `mature_height`
    pub fn unstake(
        &self,
        validator: &Address,
        delegator: &Address,
        amount: &Amount,
        mature_height: BlockNumber,
    ) -> Result<(), DelegationError> {
        self.debit_live(validator, delegator, amount)?;

        let mut block = self.mature_block(mature_height)?;
        block.push(MatureEntry {
            address: *delegator,
            amount: amount.clone(),
        });
        let raw = bincode::serialize(&block).map_err(|e| DelegationError::Codec(e.to_string()))?;
        self.state
            .borrow_mut()
            .set(&Self::mature_key(mature_height), raw);
        Ok(())
    }

    /// Verdict debit: removes stake permanently, without a maturity entry
    pub fn penalize(
        &self,
        validator: &Address,
        delegator: &Address,
        amount: &Amount,
    ) -> Result<(), DelegationError> {
        self.debit_live(validator, delegator, amount)
    }

    pub fn withdraw(
        &self,
        delegator: &Address,
        amount: &Amount,
    ) -> Result<(), DelegationError> {
        let bounded = self.bounded_amount(delegator)?;
        let left = bounded
            .minus(amount)
            .ok_or(DelegationError::Underflow {
                ledger: "bounded",
                address: *delegator,
                have: bounded,
                need: amount.clone(),
            })?;
        self.put_amount(&Self::bounded_key(delegator), &left)
    }

    /// End-of-block release: every entry maturing at `height` moves to its
    /// delegator's bounded ledger and the block is deleted
    pub fn release_matured(&self, height: BlockNumber) -> Result<(), DelegationError> {
        let block = self.mature_block(height)?;
        if block.is_empty() {
            return Ok(());
        }
        debug!(height, entries = block.len(), "releasing matured unstakes");
        for entry in &block {
            let bounded = self.bounded_amount(&entry.address)?.plus(&entry.amount);
            self.put_amount(&Self::bounded_key(&entry.address), &bounded)?;
        }
        self.state.borrow_mut().delete(&Self::mature_key(height));
        Ok(())
    }

    fn debit_live(
        &self,
        validator: &Address,
        delegator: &Address,
        amount: &Amount,
    ) -> Result<(), DelegationError> {
        let total = self.validator_total(validator)?;
        let pair = self.pair_amount(validator, delegator)?;
        let effective = self.effective_amount(delegator)?;

        let total_left = total.minus(amount).ok_or(DelegationError::Underflow {
            ledger: "validator total",
            address: *validator,
            have: total,
            need: amount.clone(),
        })?;
        let pair_left = pair.minus(amount).ok_or(DelegationError::Underflow {
            ledger: "pair",
            address: *delegator,
            have: pair,
            need: amount.clone(),
        })?;
        let effective_left = effective.minus(amount).ok_or(DelegationError::Underflow {
            ledger: "effective",
            address: *delegator,
            have: effective,
            need: amount.clone(),
        })?;

        self.put_amount(&Self::total_key(validator), &total_left)?;
        self.put_amount(&Self::pair_key(validator, delegator), &pair_left)?;
        self.put_amount(&Self::effective_key(delegator), &effective_left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, ChainState, Database};
    use tempfile::TempDir;

    fn setup() -> (TempDir, DelegationStore) {
        let dir = TempDir::new().unwrap();
        let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
        (dir, DelegationStore::new(state))
    }

    fn amt(v: u64) -> Amount {
        Amount::from_u64(v)
    }

    #[test]
    fn stake_unstake_release_withdraw_cycle() {
        let (_dir, store) = setup();
        let v = Address::from_bytes([1u8; 20]);
        let d = Address::from_bytes([2u8; 20]);

        store.stake(&v, &d, &amt(10)).unwrap();
        assert_eq!(store.validator_total(&v).unwrap(), amt(10));
        assert_eq!(store.pair_amount(&v, &d).unwrap(), amt(10));
        assert_eq!(store.effective_amount(&d).unwrap(), amt(10));

        store.unstake(&v, &d, &amt(4), 100).unwrap();
        assert_eq!(store.validator_total(&v).unwrap(), amt(6));
        assert_eq!(store.effective_amount(&d).unwrap(), amt(6));
        assert_eq!(store.bounded_amount(&d).unwrap(), amt(0));
        assert_eq!(store.matured_pending(&d, 95, 10).unwrap(), amt(4));

        // before maturity nothing is withdrawable
        store.release_matured(99).unwrap();
        assert_eq!(store.bounded_amount(&d).unwrap(), amt(0));

        store.release_matured(100).unwrap();
        assert_eq!(store.bounded_amount(&d).unwrap(), amt(4));
        assert_eq!(store.matured_pending(&d, 95, 10).unwrap(), amt(0));

        store.withdraw(&d, &amt(3)).unwrap();
        assert_eq!(store.bounded_amount(&d).unwrap(), amt(1));
        assert!(matches!(
            store.withdraw(&d, &amt(2)),
            Err(DelegationError::Underflow { .. })
        ));
    }

    #[test]
    fn penalize_removes_without_maturity() {
        let (_dir, store) = setup();
        let v = Address::from_bytes([1u8; 20]);
        let d = Address::from_bytes([2u8; 20]);

        store.stake(&v, &d, &amt(10)).unwrap();
        store.penalize(&v, &d, &amt(3)).unwrap();
        assert_eq!(store.validator_total(&v).unwrap(), amt(7));
        assert_eq!(store.effective_amount(&d).unwrap(), amt(7));
        // nothing ever matures out of a penalty
        for h in 0..200 {
            store.release_matured(h).unwrap();
        }
        assert_eq!(store.bounded_amount(&d).unwrap(), amt(0));
    }

    #[test]
    fn underflow_aborts_whole_operation() {
        let (_dir, store) = setup();
        let v = Address::from_bytes([1u8; 20]);
        let d = Address::from_bytes([2u8; 20]);
        let other = Address::from_bytes([3u8; 20]);

        store.stake(&v, &d, &amt(5)).unwrap();
        // other delegator has no pair amount; the validator total would
        // cover it but the pair ledger must not go negative
        assert!(matches!(
            store.penalize(&v, &other, &amt(1)),
            Err(DelegationError::Underflow { .. })
        ));
        assert_eq!(store.validator_total(&v).unwrap(), amt(5));
        assert_eq!(store.pair_amount(&v, &d).unwrap(), amt(5));
    }

    #[test]
    fn totals_track_pair_sums() {
        let (_dir, store) = setup();
        let v = Address::from_bytes([1u8; 20]);
        let d1 = Address::from_bytes([2u8; 20]);
        let d2 = Address::from_bytes([3u8; 20]);

        store.stake(&v, &d1, &amt(7)).unwrap();
        store.stake(&v, &d2, &amt(5)).unwrap();
        store.unstake(&v, &d1, &amt(2), 50).unwrap();

        let pair_sum = store
            .pair_amount(&v, &d1)
            .unwrap()
            .plus(&store.pair_amount(&v, &d2).unwrap());
        assert_eq!(store.validator_total(&v).unwrap(), pair_sum);
    }
}
