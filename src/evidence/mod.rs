// Evidence - Vote participation tracking and allegation bookkeeping
//
// Keys under the `evd` prefix:
//   vb/<height be>   addresses that signed the commit at <height>
//   cv               rolling signed-vote counts over the trailing window
//   ar/<id>          one allegation request
//   at               index of open request ids
//   sv/<address>     suspicious-validator history
//   st/<address>     liveness status
pub mod types;

use tracing::{debug, warn};

pub use types::{
    AllegationRequest, AllegationStatus, AllegationTracker, AllegationVote, CumulativeVote,
    LastValidatorHistory, SuspicionReason, ValidatorStatus, VoteBlock, VoteChoice, VoteInfo,
};

use crate::storage::{Prefix, SharedState, StateKey};
use crate::types::{Address, BlockNumber, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("allegation request {0} not found")]
    RequestNotFound(String),

    #[error("request id {0} already handled")]
    RequestIdBusy(String),

    #[error("open allegation against {0} already exists")]
    DuplicateAllegation(Address),

    #[error("{0} already voted on this request")]
    AlreadyVoted(Address),

    #[error("cannot vote on a closed request")]
    RequestClosed,

    #[error("suspicious validator {0} not found")]
    SuspiciousNotFound(Address),

    #[error("failed to decode evidence record: {0}")]
    Codec(String),
}

pub struct EvidenceStore {
    state: SharedState,
}

impl EvidenceStore {
    pub fn new(state: SharedState) -> Self {
        EvidenceStore { state }
    }

    fn vote_block_key(height: BlockNumber) -> StateKey {
        let mut id = Vec::with_capacity(3 + 8);
        id.extend_from_slice(b"vb/");
        id.extend_from_slice(&height.to_be_bytes());
        Prefix::EVIDENCE.key(&id)
    }

    fn cumulative_key() -> StateKey {
        Prefix::EVIDENCE.key(b"cv")
    }

    fn request_key(id: &str) -> StateKey {
        let mut raw = Vec::with_capacity(3 + id.len());
        raw.extend_from_slice(b"ar/");
        raw.extend_from_slice(id.as_bytes());
        Prefix::EVIDENCE.key(&raw)
    }

    fn tracker_key() -> StateKey {
        Prefix::EVIDENCE.key(b"at")
    }

    fn suspicious_key(address: &Address) -> StateKey {
        let mut id = Vec::with_capacity(3 + Address::LEN);
        id.extend_from_slice(b"sv/");
        id.extend_from_slice(address.as_ref());
        Prefix::EVIDENCE.key(&id)
    }

    fn status_key(address: &Address) -> StateKey {
        let mut id = Vec::with_capacity(3 + Address::LEN);
        id.extend_from_slice(b"st/");
        id.extend_from_slice(address.as_ref());
        Prefix::EVIDENCE.key(&id)
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: &[u8]) -> Result<T, EvidenceError> {
        bincode::deserialize(raw).map_err(|e| EvidenceError::Codec(e.to_string()))
    }

    fn put<T: serde::Serialize>(&self, key: &StateKey, value: &T) -> Result<(), EvidenceError> {
        let raw = bincode::serialize(value).map_err(|e| EvidenceError::Codec(e.to_string()))?;
        self.state.borrow_mut().set(key, raw);
        Ok(())
    }

    // --- vote participation ----------------------------------------------

    /// Record which validators signed the commit at `height`
    pub fn set_vote_block(
        &self,
        height: BlockNumber,
        votes: &[VoteInfo],
    ) -> Result<(), EvidenceError> {
        let block = VoteBlock {
            height,
            addresses: votes
                .iter()
                .filter(|v| v.signed_last_block)
                .map(|v| v.address)
                .collect(),
        };
        self.put(&Self::vote_block_key(height), &block)
    }

    pub fn get_vote_block(&self, height: BlockNumber) -> Result<Option<VoteBlock>, EvidenceError> {
        match self.state.borrow().get(&Self::vote_block_key(height)) {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_cumulative_vote(&self) -> Result<CumulativeVote, EvidenceError> {
        match self.state.borrow().get(&Self::cumulative_key()) {
            Some(raw) => Self::decode(&raw),
            None => Ok(CumulativeVote::default()),
        }
    }

    /// Roll the window forward to `height`: credit every signer of the block
    /// at `height`, retire the block that fell out at `height - diff`
    pub fn set_cumulative_vote(
        &self,
        mut cv: CumulativeVote,
        height: BlockNumber,
        diff: BlockNumber,
    ) -> Result<(), EvidenceError> {
        if let Some(block) = self.get_vote_block(height)? {
            for addr in &block.addresses {
                *cv.addresses.entry(*addr).or_insert(0) += 1;
            }
        }
        if height > diff {
            if let Some(retired) = self.get_vote_block(height - diff)? {
                for addr in &retired.addresses {
                    if let Some(count) = cv.addresses.get_mut(addr) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            cv.addresses.remove(addr);
                        }
                    }
                }
            }
        }
        self.put(&Self::cumulative_key(), &cv)
    }

    // --- allegation requests ---------------------------------------------

    pub fn get_allegation_request(&self, id: &str) -> Result<AllegationRequest, EvidenceError> {
        match self.state.borrow().get(&Self::request_key(id)) {
            Some(raw) => Self::decode(&raw),
            None => Err(EvidenceError::RequestNotFound(id.to_string())),
        }
    }

    pub fn set_allegation_request(&self, ar: &AllegationRequest) -> Result<(), EvidenceError> {
        self.put(&Self::request_key(&ar.id), ar)
    }

    pub fn delete_allegation_request(&self, id: &str) -> bool {
        self.state.borrow_mut().delete(&Self::request_key(id))
    }

    pub fn get_allegation_tracker(&self) -> Result<AllegationTracker, EvidenceError> {
        match self.state.borrow().get(&Self::tracker_key()) {
            Some(raw) => Self::decode(&raw),
            None => Ok(AllegationTracker::default()),
        }
    }

    pub fn set_allegation_tracker(&self, at: &AllegationTracker) -> Result<(), EvidenceError> {
        self.put(&Self::tracker_key(), at)
    }

    /// All persisted requests, in ascending id order
    pub fn iterate_requests(&self) -> Result<Vec<AllegationRequest>, EvidenceError> {
        let (start, end) = Prefix::EVIDENCE.range(b"ar/");
        let pairs = self.state.borrow().range(&start, &end, false);
        pairs.iter().map(|(_, raw)| Self::decode(raw)).collect()
    }

    fn request_exists_for(&self, malicious: &Address) -> Result<bool, EvidenceError> {
        Ok(self
            .iterate_requests()?
            .iter()
            .any(|ar| ar.malicious == *malicious))
    }

    /// Open a new allegation. Rejects a reused id and a second open
    /// accusation against the same validator.
    pub fn perform_allegation(
        &self,
        reporter: Address,
        malicious: Address,
        id: &str,
        block_height: BlockNumber,
        proof_msg: &str,
    ) -> Result<(), EvidenceError> {
        if self.get_allegation_request(id).is_ok() {
            return Err(EvidenceError::RequestIdBusy(id.to_string()));
        }
        if self.request_exists_for(&malicious)? {
            return Err(EvidenceError::DuplicateAllegation(malicious));
        }

        let ar = AllegationRequest::new(
            id.to_string(),
            reporter,
            malicious,
            block_height,
            proof_msg.to_string(),
        );
        self.set_allegation_request(&ar)?;

        let mut at = self.get_allegation_tracker()?;
        at.requests.insert(id.to_string());
        self.set_allegation_tracker(&at)
    }

    pub fn vote(
        &self,
        request_id: &str,
        voter: Address,
        choice: VoteChoice,
    ) -> Result<(), EvidenceError> {
        let mut ar = self.get_allegation_request(request_id)?;
        if ar.status != AllegationStatus::Voting {
            return Err(EvidenceError::RequestClosed);
        }
        if ar.votes.iter().any(|v| v.address == voter) {
            return Err(EvidenceError::AlreadyVoted(voter));
        }
        ar.votes.push(AllegationVote {
            address: voter,
            choice,
        });
        self.set_allegation_request(&ar)
    }

    /// Drop tracker entries whose request is gone and delete duplicate
    /// accusations, keeping the lowest id per accused address
    pub fn clean_tracker(&self) -> Result<(), EvidenceError> {
        let mut at = self.get_allegation_tracker()?;
        let ids: Vec<String> = at.requests.iter().cloned().collect();
        let mut seen: Vec<Address> = Vec::new();
        for id in ids {
            let ar = match self.get_allegation_request(&id) {
                Ok(ar) => ar,
                Err(_) => {
                    at.requests.remove(&id);
                    continue;
                }
            };
            if seen.contains(&ar.malicious) {
                debug!(%id, "deleting duplicate allegation request");
                self.delete_allegation_request(&id);
                at.requests.remove(&id);
                continue;
            }
            seen.push(ar.malicious);
        }
        self.set_allegation_tracker(&at)
    }

    // --- suspicious validators -------------------------------------------

    pub fn create_suspicious_validator(
        &self,
        address: Address,
        reason: SuspicionReason,
        height: BlockNumber,
        created_at: Timestamp,
    ) -> Result<LastValidatorHistory, EvidenceError> {
        let lvh = LastValidatorHistory::new(address, reason, height, created_at);
        self.update_suspicious_validator(&lvh)?;
        Ok(lvh)
    }

    pub fn update_suspicious_validator(
        &self,
        lvh: &LastValidatorHistory,
    ) -> Result<(), EvidenceError> {
        self.put(&Self::suspicious_key(&lvh.address), lvh)
    }

    pub fn get_suspicious_validator(
        &self,
        address: &Address,
    ) -> Result<LastValidatorHistory, EvidenceError> {
        match self.state.borrow().get(&Self::suspicious_key(address)) {
            Some(raw) => Self::decode(&raw),
            None => Err(EvidenceError::SuspiciousNotFound(*address)),
        }
    }

    /// Every still-frozen flagged validator
    pub fn iterate_suspicious_validators(&self) -> Result<Vec<LastValidatorHistory>, EvidenceError> {
        let (start, end) = Prefix::EVIDENCE.range(b"sv/");
        let pairs = self.state.borrow().range(&start, &end, false);
        let mut out = Vec::new();
        for (_, raw) in pairs {
            let lvh: LastValidatorHistory = match Self::decode(&raw) {
                Ok(lvh) => lvh,
                Err(e) => {
                    warn!("skipping undecodable suspicious-validator record: {e}");
                    continue;
                }
            };
            if lvh.is_frozen() {
                out.push(lvh);
            }
        }
        Ok(out)
    }

    pub fn is_frozen_validator(&self, address: &Address) -> bool {
        self.get_suspicious_validator(address)
            .map(|lvh| lvh.is_frozen())
            .unwrap_or(false)
    }

    // --- liveness status -------------------------------------------------

    pub fn get_validator_status(
        &self,
        address: &Address,
    ) -> Result<Option<ValidatorStatus>, EvidenceError> {
        match self.state.borrow().get(&Self::status_key(address)) {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_validator_status(
        &self,
        address: &Address,
        status: &ValidatorStatus,
    ) -> Result<(), EvidenceError> {
        self.put(&Self::status_key(address), status)
    }
}
