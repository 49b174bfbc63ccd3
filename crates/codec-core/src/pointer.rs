//! Location descriptors and slot/offset arithmetic.
//!
//! A [`Pointer`] says *where* a value lives. Pointers are plain values: child
//! pointers are computed from parent pointers by arithmetic and never modify
//! the snapshot they point into.
//!
//! Storage slots are expressions ([`Slot`]) rather than bare numbers so that the
//! derivation of a slot (array data region, mapping entry) stays visible for
//! display and for matching against tracked mapping keys.

use crate::allocate::storage::StorageLength;
use alloy_primitives::U256;
use evm_codec_types::conversion::{keccak_u256, word_from_u256, WORD_SIZE};
use evm_codec_types::MagicVariable;
use serde::{Deserialize, Serialize};

// =============================================================================
// Slot Expressions
// =============================================================================

/// A storage slot, expressed as its derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Slot {
    Literal {
        slot: U256,
    },
    /// `base + offset`, wrapping at 2^256.
    Offset {
        base: Box<Slot>,
        offset: U256,
    },
    /// `keccak(base)`: the data region of a dynamic array or long `bytes`.
    Hashed {
        base: Box<Slot>,
    },
    /// `keccak(key ++ base)`: the value slot of a mapping entry. `key` is the
    /// encoded key (one ABI word for value types, raw bytes for `bytes`/`string`).
    Keyed {
        base: Box<Slot>,
        #[serde(with = "evm_codec_types::conversion::serde_hex")]
        key: Vec<u8>,
    },
}

impl Slot {
    pub fn literal(slot: U256) -> Self {
        Slot::Literal { slot }
    }

    /// Resolve the expression to a slot number.
    pub fn address(&self) -> U256 {
        match self {
            Slot::Literal { slot } => *slot,
            Slot::Offset { base, offset } => base.address().wrapping_add(*offset),
            Slot::Hashed { base } => keccak_u256(word_from_u256(base.address()).as_slice()),
            Slot::Keyed { base, key } => {
                let mut preimage = Vec::with_capacity(key.len() + WORD_SIZE);
                preimage.extend_from_slice(key);
                preimage.extend_from_slice(word_from_u256(base.address()).as_slice());
                keccak_u256(&preimage)
            }
        }
    }

    /// This slot advanced by `offset`. A zero offset returns the slot unchanged.
    pub fn offset(&self, offset: U256) -> Slot {
        if offset.is_zero() {
            return self.clone();
        }
        match self {
            Slot::Offset {
                base,
                offset: existing,
            } => Slot::Offset {
                base: base.clone(),
                offset: existing.wrapping_add(offset),
            },
            other => Slot::Offset {
                base: Box::new(other.clone()),
                offset,
            },
        }
    }

    pub fn hashed(&self) -> Slot {
        Slot::Hashed {
            base: Box::new(self.clone()),
        }
    }

    pub fn keyed(&self, key: Vec<u8>) -> Slot {
        Slot::Keyed {
            base: Box::new(self.clone()),
            key,
        }
    }
}

// =============================================================================
// Pointers
// =============================================================================

/// A position in an ABI-encoded region (call data or event data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiPointer {
    /// Byte position of the head entry.
    pub start: usize,
    /// Length of the head entry (32 for anything dynamic).
    pub length: usize,
    /// Start of the enclosing tuple; dynamic offsets are relative to it.
    pub base: usize,
}

impl AbiPointer {
    pub fn new(start: usize, length: usize, base: usize) -> Self {
        Self {
            start,
            length,
            base,
        }
    }
}

/// A literal constant from a definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConstantExpression {
    /// An integer literal, already scaled for fixed-point types.
    Number { value: U256, negative: bool },
    Hex {
        #[serde(with = "evm_codec_types::conversion::serde_hex")]
        bytes: Vec<u8>,
    },
    Str { value: String },
    Bool { value: bool },
}

/// Where to read a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "location", rename_all = "camelCase")]
pub enum Pointer {
    /// A stack word, counted from the bottom. Two-word values (external
    /// functions, calldata slices) also use `index + 1`.
    Stack { index: usize },
    /// A word supplied directly (mapping keys, computed values).
    StackLiteral {
        #[serde(with = "evm_codec_types::conversion::serde_hex")]
        literal: Vec<u8>,
    },
    /// `length` bytes at `offset` bytes from the low-order end of `slot`.
    Storage {
        slot: Slot,
        offset: u8,
        length: usize,
    },
    Memory { start: usize, length: usize },
    Calldata(AbiPointer),
    Eventdata(AbiPointer),
    Eventtopic { index: usize },
    /// Immutable values embedded in the current contract's deployed code.
    Code { start: usize, length: usize },
    Definition(ConstantExpression),
    Special(MagicVariable),
}

/// The location class of a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Location {
    Stack,
    StackLiteral,
    Storage,
    Memory,
    Calldata,
    Eventdata,
    Eventtopic,
    Code,
    Definition,
    Special,
}

impl Pointer {
    pub fn location(&self) -> Location {
        match self {
            Pointer::Stack { .. } => Location::Stack,
            Pointer::StackLiteral { .. } => Location::StackLiteral,
            Pointer::Storage { .. } => Location::Storage,
            Pointer::Memory { .. } => Location::Memory,
            Pointer::Calldata(_) => Location::Calldata,
            Pointer::Eventdata(_) => Location::Eventdata,
            Pointer::Eventtopic { .. } => Location::Eventtopic,
            Pointer::Code { .. } => Location::Code,
            Pointer::Definition(_) => Location::Definition,
            Pointer::Special(_) => Location::Special,
        }
    }

    /// A whole-slot storage pointer at a literal slot.
    pub fn storage_slot(slot: U256) -> Self {
        Pointer::Storage {
            slot: Slot::literal(slot),
            offset: 0,
            length: WORD_SIZE,
        }
    }

    /// A 32-byte memory word.
    pub fn memory_word(start: usize) -> Self {
        Pointer::Memory {
            start,
            length: WORD_SIZE,
        }
    }

    /// Storage pointer for a value of the given footprint at `slot`/`offset`.
    pub fn storage(slot: Slot, offset: u8, length: StorageLength) -> Self {
        Pointer::Storage {
            slot,
            offset,
            length: length.byte_length(),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Position of element `index` of a storage array whose elements start at
/// `start` (the array's own slot for static arrays, `keccak(slot)` for
/// dynamic ones).
///
/// Elements smaller than a word pack `⌊32/size⌋` per slot from the low-order
/// end; larger elements occupy whole slots each.
pub fn storage_array_element(start: &Slot, index: U256, element: StorageLength) -> (Slot, u8) {
    match element {
        StorageLength::Bytes(size) if size > 0 && (size as usize) < WORD_SIZE => {
            let per_slot = U256::from((WORD_SIZE / size as usize) as u64);
            let slot_offset = index / per_slot;
            let position = (index % per_slot).as_limbs()[0] as u8;
            (start.offset(slot_offset), position * size)
        }
        StorageLength::Bytes(_) => (start.offset(index), 0),
        StorageLength::Slots(slots) => (start.offset(index.wrapping_mul(slots)), 0),
    }
}

/// Value slot of a mapping entry with the given encoded key.
pub fn storage_mapping_value(mapping: &Slot, encoded_key: &[u8]) -> Slot {
    mapping.keyed(encoded_key.to_vec())
}

/// Head pointer of member/element `offset` bytes into a tuple starting at `base`.
pub fn abi_member(base: usize, offset: usize, length: usize) -> Option<AbiPointer> {
    Some(AbiPointer::new(base.checked_add(offset)?, length, base))
}
