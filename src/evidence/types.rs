// Records persisted by the evidence store
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::types::{Address, BlockNumber, Power, Timestamp};

/// One entry of the consensus engine's last-commit vote list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub address: Address,
    pub power: Power,
    pub signed_last_block: bool,
}

/// Addresses that signed the commit recorded at `height`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBlock {
    pub height: BlockNumber,
    pub addresses: Vec<Address>,
}

/// Rolling per-address count of signed votes over the trailing window.
///
/// An address absent from the map signed nothing inside the window; an entry
/// is removed once its count drains to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeVote {
    pub addresses: BTreeMap<Address, u64>,
}

/// Liveness of a validator as tracked by the surrounding driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStatus {
    pub is_active: bool,
    /// Height at which the validator entered the active set
    pub height: BlockNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspicionReason {
    MissedRequiredVotes,
    ByzantineFault,
}

impl fmt::Display for SuspicionReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SuspicionReason::MissedRequiredVotes => write!(f, "missed_required_votes"),
            SuspicionReason::ByzantineFault => write!(f, "byzantine_fault"),
        }
    }
}

/// Record of a validator once flagged suspicious; survives until an explicit
/// release, so the same detection cycle never re-flags it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastValidatorHistory {
    pub address: Address,
    pub reason: SuspicionReason,
    pub height: BlockNumber,
    pub created_at: Timestamp,
    pub release_height: Option<BlockNumber>,
    pub released_at: Option<Timestamp>,
}

impl LastValidatorHistory {
    pub fn new(
        address: Address,
        reason: SuspicionReason,
        height: BlockNumber,
        created_at: Timestamp,
    ) -> Self {
        LastValidatorHistory {
            address,
            reason,
            height,
            created_at,
            release_height: None,
            released_at: None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.release_height.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllegationStatus {
    Voting,
    Innocent,
    Guilty,
}

impl fmt::Display for AllegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllegationStatus::Voting => write!(f, "Voting"),
            AllegationStatus::Innocent => write!(f, "Innocent"),
            AllegationStatus::Guilty => write!(f, "Guilty"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllegationVote {
    pub address: Address,
    pub choice: VoteChoice,
}

/// A formal accusation, open until one side crosses its threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllegationRequest {
    pub id: String,
    pub reporter: Address,
    pub malicious: Address,
    pub block_height: BlockNumber,
    pub proof_msg: String,
    pub status: AllegationStatus,
    pub votes: Vec<AllegationVote>,
}

impl AllegationRequest {
    pub fn new(
        id: String,
        reporter: Address,
        malicious: Address,
        block_height: BlockNumber,
        proof_msg: String,
    ) -> Self {
        AllegationRequest {
            id,
            reporter,
            malicious,
            block_height,
            proof_msg,
            status: AllegationStatus::Voting,
            votes: Vec::new(),
        }
    }

    pub fn tally(&self) -> (u64, u64) {
        let yes = self
            .votes
            .iter()
            .filter(|v| v.choice == VoteChoice::Yes)
            .count() as u64;
        let no = self.votes.len() as u64 - yes;
        (yes, no)
    }
}

/// Index of open request ids, kept alongside the requests themselves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllegationTracker {
    pub requests: BTreeSet<String>,
}
