// Transaction - Wire types for the staking transaction state machine
use serde::{Deserialize, Serialize};
use std::fmt;

use super::currency::Coin;
use super::keys::SignerSignature;
use super::primitives::Gas;

/// Transaction kind tag used for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    Stake,
    Unstake,
    Withdraw,
    ApplyValidator,
    Purge,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TxType::Stake => "STAKE",
            TxType::Unstake => "UNSTAKE",
            TxType::Withdraw => "WITHDRAW",
            TxType::ApplyValidator => "APPLYVALIDATOR",
            TxType::Purge => "PURGE",
        };
        write!(f, "{s}")
    }
}

/// Declared fee: a price coin and a gas allowance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub price: Coin,
    pub gas: Gas,
}

/// An unsigned transaction: kind tag, JSON-encoded payload, declared fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTx {
    pub tx_type: TxType,
    pub data: Vec<u8>,
    pub fee: Fee,
}

impl RawTx {
    /// Canonical bytes signed by every declared signer
    pub fn raw_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("raw tx is always serializable")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub raw: RawTx,
    pub signatures: Vec<SignerSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: Vec<u8>,
}

/// Structured event surfaced to the consensus driver in the block result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Event {
            kind: kind.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }
}

/// Outcome of a successful handler stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxResponse {
    pub log: String,
    pub info: String,
    pub gas_wanted: Gas,
    pub gas_used: Gas,
    pub events: Vec<Event>,
}

impl TxResponse {
    pub fn with_events(events: Vec<Event>) -> Self {
        TxResponse {
            events,
            ..Default::default()
        }
    }
}
