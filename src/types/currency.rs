// Currency - Registered chain currencies and typed coin amounts
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::amount::Amount;

/// Staking currency of the chain
pub const STAKING_CURRENCY: &str = "OLT";

/// Decimal places of the staking currency; one token is `10^18` base units
pub const STAKING_DECIMALS: u32 = 18;

/// Legacy voting token used by the administrative validator bootstrap path
pub const VOTING_CURRENCY: &str = "VT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub name: String,
    /// Number of decimal places: one whole token is `10^decimals` base units
    pub decimals: u32,
}

impl Currency {
    pub fn new(name: &str, decimals: u32) -> Self {
        Currency {
            name: name.to_string(),
            decimals,
        }
    }

    /// One whole token in base units
    pub fn base_unit(&self) -> Amount {
        Amount::pow10(self.decimals)
    }

    /// Scale a whole-token count to a base-unit coin
    pub fn coin_from_int(&self, tokens: u64) -> Coin {
        Coin {
            currency: self.clone(),
            amount: Amount::from_u64(tokens).mul_pow10(self.decimals),
        }
    }

    pub fn coin_from_amount(&self, amount: Amount) -> Coin {
        Coin {
            currency: self.clone(),
            amount,
        }
    }
}

/// A base-unit amount tagged with its currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub currency: Currency,
    pub amount: Amount,
}

impl Coin {
    pub fn is_currency(&self, name: &str) -> bool {
        self.currency.name == name
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.name)
    }
}

/// The currencies registered at genesis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencySet {
    currencies: BTreeMap<String, Currency>,
}

impl CurrencySet {
    pub fn new() -> Self {
        CurrencySet {
            currencies: BTreeMap::new(),
        }
    }

    /// The default registration for this chain: OLT (staking) and VT (legacy
    /// validator bootstrap)
    pub fn standard() -> Self {
        let mut set = CurrencySet::new();
        set.register(Currency::new(STAKING_CURRENCY, STAKING_DECIMALS));
        set.register(Currency::new(VOTING_CURRENCY, 0));
        set
    }

    pub fn register(&mut self, currency: Currency) {
        self.currencies.insert(currency.name.clone(), currency);
    }

    pub fn get(&self, name: &str) -> Option<&Currency> {
        self.currencies.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_from_int_scales_by_decimals() {
        let set = CurrencySet::standard();
        let olt = set.get(STAKING_CURRENCY).unwrap();
        let coin = olt.coin_from_int(3);
        assert_eq!(coin.amount, Amount::from_u64(3).mul_pow10(18));

        let vt = set.get(VOTING_CURRENCY).unwrap();
        assert_eq!(vt.coin_from_int(3).amount, Amount::from_u64(3));
    }
}
