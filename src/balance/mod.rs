// Balance - Spendable funds per (address, currency)
use crate::storage::{Prefix, SharedState, StateKey};
use crate::types::{Address, Amount, Coin};

#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("insufficient {currency} funds for {address}: have {have}, need {need}")]
    InsufficientFund {
        address: Address,
        currency: String,
        have: Amount,
        need: Amount,
    },

    #[error("failed to decode balance record: {0}")]
    Codec(String),
}

pub struct BalanceStore {
    state: SharedState,
}

impl BalanceStore {
    pub fn new(state: SharedState) -> Self {
        BalanceStore { state }
    }

    fn key(address: &Address, currency: &str) -> StateKey {
        let mut id = Vec::with_capacity(Address::LEN + 1 + currency.len());
        id.extend_from_slice(address.as_ref());
        id.push(b'/');
        id.extend_from_slice(currency.as_bytes());
        Prefix::BALANCE.key(&id)
    }

    /// Spendable amount, zero when the account has never been funded
    pub fn get_balance(&self, address: &Address, currency: &str) -> Result<Amount, BalanceError> {
        match self.state.borrow().get(&Self::key(address, currency)) {
            Some(raw) => bincode::deserialize(&raw).map_err(|e| BalanceError::Codec(e.to_string())),
            None => Ok(Amount::zero()),
        }
    }

    pub fn check_balance(&self, address: &Address, coin: &Coin) -> Result<bool, BalanceError> {
        let have = self.get_balance(address, &coin.currency.name)?;
        Ok(have >= coin.amount)
    }

    pub fn add_to_address(&self, address: &Address, coin: &Coin) -> Result<(), BalanceError> {
        let have = self.get_balance(address, &coin.currency.name)?;
        self.put(address, &coin.currency.name, &have.plus(&coin.amount))
    }

    pub fn minus_from_address(&self, address: &Address, coin: &Coin) -> Result<(), BalanceError> {
        let have = self.get_balance(address, &coin.currency.name)?;
        let left = have.minus(&coin.amount).ok_or(BalanceError::InsufficientFund {
            address: *address,
            currency: coin.currency.name.clone(),
            have,
            need: coin.amount.clone(),
        })?;
        self.put(address, &coin.currency.name, &left)
    }

    fn put(&self, address: &Address, currency: &str, amount: &Amount) -> Result<(), BalanceError> {
        let raw = bincode::serialize(amount).map_err(|e| BalanceError::Codec(e.to_string()))?;
        self.state
            .borrow_mut()
            .set(&Self::key(address, currency), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, ChainState, Database};
    use crate::types::currency::{CurrencySet, STAKING_CURRENCY, VOTING_CURRENCY};
    use tempfile::TempDir;

    #[test]
    fn debit_and_credit() {
        let dir = TempDir::new().unwrap();
        let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
        let store = BalanceStore::new(state);

        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        let addr = Address::from_bytes([1u8; 20]);

        store.add_to_address(&addr, &olt.coin_from_int(10)).unwrap();
        assert!(store.check_balance(&addr, &olt.coin_from_int(10)).unwrap());
        assert!(!store.check_balance(&addr, &olt.coin_from_int(11)).unwrap());

        store
            .minus_from_address(&addr, &olt.coin_from_int(4))
            .unwrap();
        assert_eq!(
            store.get_balance(&addr, STAKING_CURRENCY).unwrap(),
            olt.coin_from_int(6).amount
        );

        let err = store
            .minus_from_address(&addr, &olt.coin_from_int(7))
            .unwrap_err();
        assert!(matches!(err, BalanceError::InsufficientFund { .. }));
        // failed debit leaves the balance untouched
        assert_eq!(
            store.get_balance(&addr, STAKING_CURRENCY).unwrap(),
            olt.coin_from_int(6).amount
        );
    }

    #[test]
    fn currencies_are_independent() {
        let dir = TempDir::new().unwrap();
        let state = shared(ChainState::new(Database::open(dir.path()).unwrap()).unwrap());
        let store = BalanceStore::new(state);

        let set = CurrencySet::standard();
        let vt = set.get(VOTING_CURRENCY).unwrap();
        let addr = Address::from_bytes([2u8; 20]);

        store.add_to_address(&addr, &vt.coin_from_int(5)).unwrap();
        assert_eq!(store.get_balance(&addr, STAKING_CURRENCY).unwrap(), Amount::zero());
        assert_eq!(
            store.get_balance(&addr, VOTING_CURRENCY).unwrap(),
            Amount::from_u64(5)
        );
    }
}
