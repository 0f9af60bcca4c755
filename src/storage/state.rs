// State - Versioned chain state over the database
//
// Layout in the backing database:
//   l/<key>                      current value
//   h/<keylen be32><key><ver be64>  value as written at commit <ver>
//                                   (0x01 || value, or 0x00 for a deletion)
//   m/meta                       (version, root) of the last commit
//
// Uncommitted writes live in two in-memory overlays: a per-transaction
// session buffer and a per-block buffer. `get_versioned` reads committed
// history only, so a height-1 snapshot can never observe the current,
// in-progress block's mutations.
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::db::{Database, DatabaseError, WriteOp};
use super::keys::{range_end, StateKey};
use crate::types::{BlockNumber, Hash, Version};

const LIVE_PREFIX: &[u8] = b"l/";
const HISTORY_PREFIX: &[u8] = b"h/";
const META_KEY: &[u8] = b"m/meta";

const VALUE_MARKER: u8 = 0x01;
const TOMBSTONE_MARKER: u8 = 0x00;

pub type SharedState = Rc<RefCell<ChainState>>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("corrupt state metadata")]
    CorruptMeta,

    #[error("a transaction session is already open")]
    SessionAlreadyOpen,

    #[error("no open transaction session")]
    NoOpenSession,

    #[error("cannot commit with an open transaction session")]
    OpenSessionAtCommit,
}

#[derive(Serialize, Deserialize)]
struct Meta {
    version: Version,
    root: Hash,
}

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub struct ChainState {
    db: Database,
    version: Version,
    root: Hash,
    /// Writes from committed transaction sessions, pending block commit
    block: Overlay,
    /// Open transaction session, discarded wholesale on handler failure
    session: Option<Overlay>,
}

impl ChainState {
    pub fn new(db: Database) -> Result<Self, StateError> {
        let (version, root) = match db.get(META_KEY)? {
            Some(raw) => {
                let meta: Meta = bincode::deserialize(&raw).map_err(|_| StateError::CorruptMeta)?;
                (meta.version, meta.root)
            }
            None => (0, Hash::ZERO),
        };
        Ok(ChainState {
            db,
            version,
            root,
            block: BTreeMap::new(),
            session: None,
        })
    }

    /// Last committed version
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn get(&self, key: &StateKey) -> Option<Vec<u8>> {
        let raw = key.as_bytes();
        if let Some(session) = &self.session {
            if let Some(entry) = session.get(raw) {
                return entry.clone();
            }
        }
        if let Some(entry) = self.block.get(raw) {
            return entry.clone();
        }
        self.db.get(&live_key(raw)).ok().flatten()
    }

    pub fn exists(&self, key: &StateKey) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: &StateKey, value: Vec<u8>) {
        let raw = key.as_bytes().to_vec();
        match &mut self.session {
            Some(session) => session.insert(raw, Some(value)),
            None => self.block.insert(raw, Some(value)),
        };
    }

    pub fn delete(&mut self, key: &StateKey) -> bool {
        let existed = self.exists(key);
        let raw = key.as_bytes().to_vec();
        match &mut self.session {
            Some(session) => session.insert(raw, None),
            None => self.block.insert(raw, None),
        };
        existed
    }

    /// Value of `key` as of committed height `height`, or `None` if the key
    /// did not exist then. Reads committed history only.
    pub fn get_versioned(&self, height: BlockNumber, key: &StateKey) -> Option<Vec<u8>> {
        if height == 0 || height > self.version {
            return None;
        }
        let prefix = history_prefix(key.as_bytes());
        let mut seek = prefix.clone();
        seek.extend_from_slice(&height.to_be_bytes());

        let (found_key, found_value) = self.db.seek_at_or_before(&seek)?;
        if !found_key.starts_with(&prefix) {
            return None;
        }
        match found_value.split_first() {
            Some((&VALUE_MARKER, rest)) => Some(rest.to_vec()),
            _ => None,
        }
    }

    /// Merged view of `[start, end)`: committed entries overlaid with the
    /// block and session buffers. Keys are returned without the internal
    /// live prefix, ascending unless `descending`.
    pub fn range(&self, start: &[u8], end: &[u8], descending: bool) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        for (key, value) in self.db.scan_range(&live_key(start), &live_key(end)) {
            merged.insert(key[LIVE_PREFIX.len()..].to_vec(), Some(value));
        }
        for (key, value) in self.block.range(start.to_vec()..end.to_vec()) {
            merged.insert(key.clone(), value.clone());
        }
        if let Some(session) = &self.session {
            for (key, value) in session.range(start.to_vec()..end.to_vec()) {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut out: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        if descending {
            out.reverse();
        }
        out
    }

    /// All live entries under a namespace prefix
    pub fn range_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.range(prefix, &range_end(prefix), false)
    }

    // --- transaction sessions -------------------------------------------

    pub fn begin_session(&mut self) -> Result<(), StateError> {
        if self.session.is_some() {
            return Err(StateError::SessionAlreadyOpen);
        }
        self.session = Some(BTreeMap::new());
        Ok(())
    }

    pub fn commit_session(&mut self) -> Result<(), StateError> {
        let session = self.session.take().ok_or(StateError::NoOpenSession)?;
        for (key, value) in session {
            self.block.insert(key, value);
        }
        Ok(())
    }

    pub fn discard_session(&mut self) -> Result<(), StateError> {
        self.session.take().ok_or(StateError::NoOpenSession)?;
        Ok(())
    }

    // --- block commit ----------------------------------------------------

    /// Atomically persist the block buffer, producing the new state root and
    /// version. Must be called exactly once per block, after all mutation.
    pub fn commit(&mut self) -> Result<(Hash, Version), StateError> {
        if self.session.is_some() {
            return Err(StateError::OpenSessionAtCommit);
        }

        let next_version = self.version + 1;
        let changes = std::mem::take(&mut self.block);

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.root.as_bytes());
        hasher.update(&next_version.to_be_bytes());

        let mut ops = Vec::with_capacity(changes.len() * 2 + 1);
        for (key, value) in &changes {
            hasher.update(&(key.len() as u64).to_be_bytes());
            hasher.update(key);

            let mut hist = Vec::with_capacity(1 + value.as_ref().map_or(0, |v| v.len()));
            match value {
                Some(v) => {
                    hasher.update(&[VALUE_MARKER]);
                    hasher.update(v);
                    hist.push(VALUE_MARKER);
                    hist.extend_from_slice(v);
                    ops.push(WriteOp::Put {
                        key: live_key(key),
                        value: v.clone(),
                    });
                }
                None => {
                    hasher.update(&[TOMBSTONE_MARKER]);
                    hist.push(TOMBSTONE_MARKER);
                    ops.push(WriteOp::Delete {
                        key: live_key(key),
                    });
                }
            }

            let mut hkey = history_prefix(key);
            hkey.extend_from_slice(&next_version.to_be_bytes());
            ops.push(WriteOp::Put {
                key: hkey,
                value: hist,
            });
        }

        let root = Hash::from_bytes(*hasher.finalize().as_bytes());
        let meta = Meta {
            version: next_version,
            root,
        };
        ops.push(WriteOp::Put {
            key: META_KEY.to_vec(),
            value: bincode::serialize(&meta).expect("meta is serializable"),
        });

        self.db.batch_write(ops)?;
        self.version = next_version;
        self.root = root;
        Ok((root, next_version))
    }

    /// Read-only view pinned to a committed height
    pub fn snapshot_at(&self, height: BlockNumber) -> Snapshot<'_> {
        Snapshot {
            state: self,
            height,
        }
    }
}

/// A view of the state as of a committed height. The only sanctioned way to
/// perform height-1 reads; cannot observe uncommitted mutations.
pub struct Snapshot<'a> {
    state: &'a ChainState,
    height: BlockNumber,
}

impl Snapshot<'_> {
    pub fn height(&self) -> BlockNumber {
        self.height
    }

    pub fn get(&self, key: &StateKey) -> Option<Vec<u8>> {
        self.state.get_versioned(self.height, key)
    }
}

fn live_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LIVE_PREFIX.len() + key.len());
    out.extend_from_slice(LIVE_PREFIX);
    out.extend_from_slice(key);
    out
}

fn history_prefix(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HISTORY_PREFIX.len() + 4 + key.len() + 8);
    out.extend_from_slice(HISTORY_PREFIX);
    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
    out.extend_from_slice(key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_state(dir: &TempDir) -> ChainState {
        ChainState::new(Database::open(dir.path()).unwrap()).unwrap()
    }

    fn key(s: &str) -> StateKey {
        StateKey::from_raw(s.as_bytes().to_vec())
    }

    #[test]
    fn set_get_commit() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.set(&key("val/a"), b"1".to_vec());
        assert_eq!(state.get(&key("val/a")), Some(b"1".to_vec()));

        let (root, version) = state.commit().unwrap();
        assert_eq!(version, 1);
        assert_ne!(root, Hash::ZERO);
        assert_eq!(state.get(&key("val/a")), Some(b"1".to_vec()));
    }

    #[test]
    fn versioned_reads_see_committed_history_only() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.set(&key("val/a"), b"v1".to_vec());
        state.commit().unwrap(); // version 1

        state.set(&key("val/a"), b"v2".to_vec());
        state.commit().unwrap(); // version 2

        // uncommitted write at "version 3"
        state.set(&key("val/a"), b"v3".to_vec());

        assert_eq!(state.get_versioned(1, &key("val/a")), Some(b"v1".to_vec()));
        assert_eq!(state.get_versioned(2, &key("val/a")), Some(b"v2".to_vec()));
        // height beyond committed version yields nothing
        assert_eq!(state.get_versioned(3, &key("val/a")), None);
        // live read still sees the uncommitted value
        assert_eq!(state.get(&key("val/a")), Some(b"v3".to_vec()));
    }

    #[test]
    fn versioned_read_after_delete_is_none() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.set(&key("val/a"), b"v1".to_vec());
        state.commit().unwrap(); // 1
        state.delete(&key("val/a"));
        state.commit().unwrap(); // 2

        assert_eq!(state.get_versioned(1, &key("val/a")), Some(b"v1".to_vec()));
        assert_eq!(state.get_versioned(2, &key("val/a")), None);
    }

    #[test]
    fn session_discard_rolls_back() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.set(&key("bal/a"), b"10".to_vec());
        state.begin_session().unwrap();
        state.set(&key("bal/a"), b"3".to_vec());
        state.set(&key("bal/b"), b"7".to_vec());
        assert_eq!(state.get(&key("bal/a")), Some(b"3".to_vec()));

        state.discard_session().unwrap();
        assert_eq!(state.get(&key("bal/a")), Some(b"10".to_vec()));
        assert_eq!(state.get(&key("bal/b")), None);
    }

    #[test]
    fn session_commit_applies() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.begin_session().unwrap();
        state.set(&key("bal/a"), b"3".to_vec());
        state.commit_session().unwrap();
        assert_eq!(state.get(&key("bal/a")), Some(b"3".to_vec()));
        assert!(state.commit().is_ok());
    }

    #[test]
    fn range_merges_overlays() {
        let dir = TempDir::new().unwrap();
        let mut state = open_state(&dir);

        state.set(&key("val/a"), b"1".to_vec());
        state.set(&key("val/c"), b"3".to_vec());
        state.commit().unwrap();

        state.set(&key("val/b"), b"2".to_vec());
        state.delete(&key("val/c"));

        let got = state.range_prefix(b"val/");
        let keys: Vec<_> = got.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"val/a".to_vec(), b"val/b".to_vec()]);
    }

    #[test]
    fn commit_hash_is_deterministic() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        let mut s1 = open_state(&dir1);
        let mut s2 = open_state(&dir2);

        for s in [&mut s1, &mut s2] {
            s.set(&key("val/a"), b"1".to_vec());
            s.set(&key("del/x"), b"2".to_vec());
        }
        let (r1, _) = s1.commit().unwrap();
        let (r2, _) = s2.commit().unwrap();
        assert_eq!(r1, r2);
    }
}
