// Keys - Typed state keys with explicit namespaces
//
// Every store writes under its own prefix of the shared versioned state; the
// typed constructors here are the only way to build keys, so namespaces
// cannot collide by accident.
use crate::types::{Address, BlockNumber};

/// A namespace within the shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix(&'static str);

impl Prefix {
    pub const VALIDATOR: Prefix = Prefix("val");
    /// Purge bookkeeping, including penalty-derived delayed unstakes
    pub const VALIDATOR_PURGE: Prefix = Prefix("vpg");
    pub const DELEGATION: Prefix = Prefix("del");
    pub const EVIDENCE: Prefix = Prefix("evd");
    pub const BALANCE: Prefix = Prefix("bal");
    pub const FEES: Prefix = Prefix("fee");
    pub const GOVERNANCE: Prefix = Prefix("gov");

    pub fn as_bytes(&self) -> &'static [u8] {
        self.0.as_bytes()
    }

    /// Key `prefix/identifier`
    pub fn key(&self, id: &[u8]) -> StateKey {
        let mut bytes = Vec::with_capacity(self.0.len() + 1 + id.len());
        bytes.extend_from_slice(self.0.as_bytes());
        bytes.push(b'/');
        bytes.extend_from_slice(id);
        StateKey(bytes)
    }

    /// Half-open range `[start, end)` covering every key `prefix/sub...`
    pub fn range(&self, sub: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let start = self.key(sub).0;
        let end = range_end(&start);
        (start, end)
    }
}

/// A fully qualified state key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey(Vec<u8>);

impl StateKey {
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        StateKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Prefix {
    /// Validator record key: `val/<address>`
    pub fn validator(addr: &Address) -> StateKey {
        Prefix::VALIDATOR.key(addr.as_ref())
    }

    /// Delayed unstake key: `vpg/unstake/<height be>/<address>`
    pub fn delayed_unstake(height: BlockNumber, addr: &Address) -> StateKey {
        let mut id = Vec::with_capacity(8 + 9 + Address::LEN);
        id.extend_from_slice(b"unstake/");
        id.extend_from_slice(&height.to_be_bytes());
        id.push(b'/');
        id.extend_from_slice(addr.as_ref());
        Prefix::VALIDATOR_PURGE.key(&id)
    }
}

/// Smallest byte string strictly greater than every string starting with
/// `start`; used as the exclusive upper bound of a prefix scan
pub fn range_end(start: &[u8]) -> Vec<u8> {
    let mut end = start.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return end;
        }
        end.pop();
    }
    // all-0xff prefix: unbounded above, approximate with a long sentinel
    vec![0xff; start.len() + 1]
}
