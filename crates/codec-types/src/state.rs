//! Execution-state snapshot.
//!
//! An [`EvmState`] is the materialized machine state at one execution point.
//! It is supplied fresh for each decode and never mutated by the decoder.
//!
//! Any component may be partially captured: a `None` buffer, or a storage
//! slot or contract code absent from its map, is requested from the caller
//! during decoding rather than treated as zero.

use crate::conversion::word_from_u256;
use alloy_primitives::{Address, B256, U256};
use std::collections::{BTreeMap, HashMap};

/// A 32-byte machine word.
pub type Word = B256;

/// Values backing the `msg`, `block` and `tx` magic variables.
///
/// Unknown fields are left as `None` and omitted from decoded magic values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialState {
    pub msg_sender: Option<Address>,
    pub msg_value: Option<U256>,
    pub tx_origin: Option<Address>,
    pub tx_gasprice: Option<U256>,
    pub block_coinbase: Option<Address>,
    pub block_difficulty: Option<U256>,
    pub block_gaslimit: Option<U256>,
    pub block_number: Option<U256>,
    pub block_timestamp: Option<U256>,
    pub block_chainid: Option<U256>,
    pub block_basefee: Option<U256>,
}

/// Read-only machine state at one execution point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvmState {
    /// Stack words, bottom first.
    pub stack: Option<Vec<Word>>,
    pub memory: Option<Vec<u8>>,
    /// Sparse slot → word storage of the contract being inspected.
    pub storage: BTreeMap<U256, Word>,
    pub calldata: Option<Vec<u8>>,
    pub eventdata: Option<Vec<u8>>,
    pub eventtopics: Vec<Word>,
    /// Deployed code by address.
    pub code: HashMap<Address, Vec<u8>>,
    pub specials: SpecialState,
}

impl EvmState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(mut self, stack: Vec<Word>) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn with_memory(mut self, memory: Vec<u8>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_storage(mut self, slot: U256, word: Word) -> Self {
        self.storage.insert(slot, word);
        self
    }

    /// Store an integer in a slot (right-aligned).
    pub fn with_storage_value(self, slot: U256, value: U256) -> Self {
        self.with_storage(slot, word_from_u256(value))
    }

    pub fn with_calldata(mut self, calldata: Vec<u8>) -> Self {
        self.calldata = Some(calldata);
        self
    }

    pub fn with_eventdata(mut self, eventdata: Vec<u8>) -> Self {
        self.eventdata = Some(eventdata);
        self
    }

    pub fn with_eventtopics(mut self, topics: Vec<Word>) -> Self {
        self.eventtopics = topics;
        self
    }

    pub fn with_code(mut self, address: Address, code: Vec<u8>) -> Self {
        self.code.insert(address, code);
        self
    }

    pub fn with_specials(mut self, specials: SpecialState) -> Self {
        self.specials = specials;
        self
    }

    pub fn storage_word(&self, slot: &U256) -> Option<&Word> {
        self.storage.get(slot)
    }
}
