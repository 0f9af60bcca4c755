// Types - Fundamental data types shared across the engine

pub mod amount;
pub mod currency;
pub mod keys;
pub mod primitives;
pub mod transaction;
pub mod validator;

pub use amount::Amount;
pub use currency::{Coin, Currency, CurrencySet};
pub use keys::{Algorithm, KeyError, PublicKey, Signature, SignerSignature};
pub use primitives::{Address, BlockNumber, Gas, Hash, Power, Timestamp, Version};
pub use transaction::{Event, EventAttribute, Fee, RawTx, SignedTx, TxResponse, TxType};
pub use validator::{GenesisValidator, PowerUpdate, Stake, Unstake, Validator};
