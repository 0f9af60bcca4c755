// ValidatorQueue - Deterministic max-heap of validators by voting power
//
// Rebuilt from persisted state every block and owned by one ValidatorStore;
// never shared. Ordering is power descending with insertion order breaking
// ties (first inserted wins), so every replica pops the same sequence.
use std::collections::HashMap;

use crate::types::{Address, Power};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub address: Address,
    pub power: Power,
    pub insertion_index: u64,
}

impl QueueEntry {
    fn outranks(&self, other: &QueueEntry) -> bool {
        self.power > other.power
            || (self.power == other.power && self.insertion_index < other.insertion_index)
    }
}

/// Binary max-heap over an indexable arena, with a position map so an
/// entry's priority can change in place after a same-block stake mutation
#[derive(Debug, Default)]
pub struct ValidatorQueue {
    arena: Vec<QueueEntry>,
    positions: HashMap<Address, usize>,
    next_insertion: u64,
}

impl ValidatorQueue {
    pub fn new() -> Self {
        ValidatorQueue::default()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.positions.clear();
        self.next_insertion = 0;
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.positions.contains_key(address)
    }

    /// Insert a new entry; updates in place if the address is already queued
    pub fn push(&mut self, address: Address, power: Power) {
        if self.contains(&address) {
            self.update(&address, power);
            return;
        }
        let entry = QueueEntry {
            address,
            power,
            insertion_index: self.next_insertion,
        };
        self.next_insertion += 1;
        self.arena.push(entry);
        let idx = self.arena.len() - 1;
        self.positions.insert(address, idx);
        self.sift_up(idx);
    }

    /// Highest-power entry, or `None` when drained
    pub fn pop(&mut self) -> Option<QueueEntry> {
        if self.arena.is_empty() {
            return None;
        }
        let last = self.arena.len() - 1;
        self.arena.swap(0, last);
        let top = self.arena.pop().expect("non-empty");
        self.positions.remove(&top.address);
        if !self.arena.is_empty() {
            self.positions.insert(self.arena[0].address, 0);
            self.sift_down(0);
        }
        Some(top)
    }

    /// Change a queued entry's power, keeping its insertion index
    pub fn update(&mut self, address: &Address, power: Power) -> bool {
        let Some(&idx) = self.positions.get(address) else {
            return false;
        };
        let old = self.arena[idx].power;
        self.arena[idx].power = power;
        if power > old {
            self.sift_up(idx);
        } else if power < old {
            self.sift_down(idx);
        }
        true
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.arena[idx].outranks(&self.arena[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut best = idx;
            if left < self.arena.len() && self.arena[left].outranks(&self.arena[best]) {
                best = left;
            }
            if right < self.arena.len() && self.arena[right].outranks(&self.arena[best]) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.swap(idx, best);
            idx = best;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.arena.swap(a, b);
        self.positions.insert(self.arena[a].address, a);
        self.positions.insert(self.arena[b].address, b);
    }
}
