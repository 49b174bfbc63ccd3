//! Known mapping keys.
//!
//! Mapping keys cannot be recovered from storage contents, so the only entries
//! a decoder can report are those whose keys were observed during execution
//! (a `SHA3` over `key ++ slot`, a literal key in source, ...). The caller
//! appends them here; the decoder only reads.
//!
//! The tracker is append-only: keys are never removed, duplicates are ignored
//! and insertion order is preserved per mapping.

use alloy_primitives::U256;
use evm_codec_types::conversion::{word_from_u256, WORD_SIZE};
use serde::Serialize;
use std::collections::HashMap;

/// Encoded keys observed for each mapping, by the mapping's slot address.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingKeyTracker {
    keys: HashMap<U256, Vec<Vec<u8>>>,
    total: usize,
}

impl MappingKeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an encoded key for the mapping at `slot`.
    ///
    /// Value-type keys are one ABI word; `string`/`bytes` keys are their raw
    /// bytes. Returns false when the key was already known.
    pub fn track(&mut self, slot: U256, key: Vec<u8>) -> bool {
        let known = self.keys.entry(slot).or_default();
        if known.iter().any(|k| *k == key) {
            return false;
        }
        tracing::trace!(
            slot = %slot,
            key = %hex::encode(&key),
            "mapping_keys: tracked key"
        );
        known.push(key);
        self.total += 1;
        true
    }

    /// Record a value-type key given as an integer word.
    pub fn track_word(&mut self, slot: U256, key: U256) -> bool {
        self.track(slot, word_from_u256(key).to_vec())
    }

    /// Record the preimage of a mapping-slot hash (`key ++ slot`), as seen
    /// on a `SHA3` instruction. Preimages shorter than one word are ignored.
    pub fn track_preimage(&mut self, preimage: &[u8]) -> bool {
        if preimage.len() < WORD_SIZE {
            return false;
        }
        let split = preimage.len() - WORD_SIZE;
        let slot = U256::from_be_slice(&preimage[split..]);
        self.track(slot, preimage[..split].to_vec())
    }

    /// Keys known for the mapping at `slot`, in tracking order.
    pub fn keys_for(&self, slot: &U256) -> &[Vec<u8>] {
        self.keys.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
