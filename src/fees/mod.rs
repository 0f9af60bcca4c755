// Fees - Minimum-fee validation and the block fee pool
use crate::balance::{BalanceError, BalanceStore};
use crate::governance::FeeOption;
use crate::storage::{Prefix, SharedState, StateKey};
use crate::types::{Address, Amount, Fee, Gas};

const POOL_KEY: &[u8] = b"pool";

#[derive(Debug, thiserror::Error)]
pub enum FeeError {
    #[error("fee declared in {got}, pool accepts {want}")]
    WrongCurrency { want: String, got: String },

    #[error("declared fee {got} below the minimum {min}")]
    FeeTooSmall { min: Amount, got: Amount },

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error("failed to decode fee pool record: {0}")]
    Codec(String),
}

pub struct FeePool {
    state: SharedState,
}

impl FeePool {
    pub fn new(state: SharedState) -> Self {
        FeePool { state }
    }

    fn pool_key() -> StateKey {
        Prefix::FEES.key(POOL_KEY)
    }

    /// Accumulated fees, all blocks
    pub fn pool_amount(&self) -> Result<Amount, FeeError> {
        match self.state.borrow().get(&Self::pool_key()) {
            Some(raw) => bincode::deserialize(&raw).map_err(|e| FeeError::Codec(e.to_string())),
            None => Ok(Amount::zero()),
        }
    }

    /// Declared fee must be in the pool currency and price the minimum or more
    pub fn validate_fee(&self, option: &FeeOption, fee: &Fee) -> Result<(), FeeError> {
        let want = &option.min_fee.currency.name;
        if &fee.price.currency.name != want {
            return Err(FeeError::WrongCurrency {
                want: want.clone(),
                got: fee.price.currency.name.clone(),
            });
        }
        if fee.price.amount < option.min_fee.amount {
            return Err(FeeError::FeeTooSmall {
                min: option.min_fee.amount.clone(),
                got: fee.price.amount.clone(),
            });
        }
        Ok(())
    }

    /// Debit `price * weight` from the payer into the pool. Returns the gas
    /// consumed, which for this engine is the tx-kind weight itself.
    pub fn charge(
        &self,
        balances: &BalanceStore,
        payer: &Address,
        fee: &Fee,
        weight: Gas,
    ) -> Result<Gas, FeeError> {
        let total = fee.price.amount.times(weight);
        let coin = fee.price.currency.coin_from_amount(total.clone());
        balances.minus_from_address(payer, &coin)?;

        let pool = self.pool_amount()?.plus(&total);
        let raw = bincode::serialize(&pool).map_err(|e| FeeError::Codec(e.to_string()))?;
        self.state.borrow_mut().set(&Self::pool_key(), raw);
        Ok(weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, ChainState, Database};
    use crate::types::currency::{CurrencySet, STAKING_CURRENCY, VOTING_CURRENCY};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SharedState, FeeOption) {
        let dir = TempDir::new().unwrap();
        let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        let option = FeeOption {
            min_fee: olt.coin_from_amount(Amount::pow10(9)),
        };
        (dir, state, option)
    }

    #[test]
    fn validate_rejects_small_or_foreign_fee() {
        let (_dir, state, option) = setup();
        let pool = FeePool::new(state);
        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        let vt = set.get(VOTING_CURRENCY).unwrap();

        let ok = Fee {
            price: olt.coin_from_amount(Amount::pow10(9)),
            gas: 1,
        };
        assert!(pool.validate_fee(&option, &ok).is_ok());

        let small = Fee {
            price: olt.coin_from_amount(Amount::from_u64(1)),
            gas: 1,
        };
        assert!(matches!(
            pool.validate_fee(&option, &small),
            Err(FeeError::FeeTooSmall { .. })
        ));

        let foreign = Fee {
            price: vt.coin_from_int(1),
            gas: 1,
        };
        assert!(matches!(
            pool.validate_fee(&option, &foreign),
            Err(FeeError::WrongCurrency { .. })
        ));
    }

    #[test]
    fn charge_moves_weighted_fee_into_pool() {
        let (_dir, state, _) = setup();
        let pool = FeePool::new(state.clone());
        let balances = BalanceStore::new(state);

        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        let payer = Address::from_bytes([3u8; 20]);
        balances.add_to_address(&payer, &olt.coin_from_int(1)).unwrap();

        let fee = Fee {
            price: olt.coin_from_amount(Amount::pow10(9)),
            gas: 2,
        };
        let gas = pool.charge(&balances, &payer, &fee, 2).unwrap();
        assert_eq!(gas, 2);
        assert_eq!(pool.pool_amount().unwrap(), Amount::pow10(9).times(2));

        let left = balances.get_balance(&payer, STAKING_CURRENCY).unwrap();
        assert_eq!(
            left,
            olt.coin_from_int(1)
                .amount
                .minus(&Amount::pow10(9).times(2))
                .unwrap()
        );
    }
}
