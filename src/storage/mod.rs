// Storage - Versioned, byte-keyed persistent state

pub mod db;
pub mod keys;
pub mod state;

pub use db::{Database, DatabaseError, WriteOp};
pub use keys::{Prefix, StateKey};
pub use state::{ChainState, SharedState, Snapshot, StateError};

use std::cell::RefCell;
use std::rc::Rc;

/// Wrap a freshly opened state for sharing between stores. Execution is
/// serialized by the consensus driver; the engine is single-threaded by
/// contract.
pub fn shared(state: ChainState) -> SharedState {
    Rc::new(RefCell::new(state))
}
