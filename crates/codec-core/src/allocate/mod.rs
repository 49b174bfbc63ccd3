//! Layout tables, built once per set of user-defined types.
//!
//! - [`storage`]: solc storage packing, plus state-variable placement
//! - [`abi`]: head/tail layout for call data and event data, signatures
//! - [`memory`]: one word per struct member

pub mod abi;
pub mod memory;
pub mod storage;

use evm_codec_types::{TypeId, UserDefinedTypes};
use serde::Serialize;
use std::fmt;

pub use abi::{
    AbiAllocation, AbiAllocations, AbiMemberAllocation, AbiParameter, ArgumentAllocation,
    EventAbi, EventAllocation, FunctionAbi, FunctionAllocation,
};
pub use memory::{MemoryAllocation, MemoryAllocations, MemoryMemberAllocation};
pub use storage::{
    allocate_state_variables, Mutability, StateVariable, StateVariableAllocation,
    StorageAllocation, StorageAllocations, StorageLength, StorageMemberAllocation,
    StoragePosition,
};

/// Why a type could not be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// A struct, enum or value type id with no definition.
    UnknownType { id: TypeId },
    /// A struct that contains itself without indirection.
    RecursiveStruct { id: TypeId },
    /// A type with no storage representation (tuples, magic values).
    NotStorable { ty: String },
    /// A type with no ABI encoding (mappings, internal functions).
    NotAbiEncodable { ty: String },
    Overflow { what: String },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::UnknownType { id } => write!(f, "unknown user-defined type {}", id),
            AllocationError::RecursiveStruct { id } => {
                write!(f, "struct {} contains itself", id)
            }
            AllocationError::NotStorable { ty } => write!(f, "{} cannot be stored", ty),
            AllocationError::NotAbiEncodable { ty } => write!(f, "{} is not ABI-encodable", ty),
            AllocationError::Overflow { what } => write!(f, "{} is too large to lay out", what),
        }
    }
}

impl std::error::Error for AllocationError {}

/// All layout tables for one set of user-defined types.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Allocations {
    pub storage: StorageAllocations,
    pub abi: AbiAllocations,
    pub memory: MemoryAllocations,
}

impl Allocations {
    pub fn build(udts: &UserDefinedTypes) -> Self {
        Self {
            storage: StorageAllocations::build(udts),
            abi: AbiAllocations::build(udts),
            memory: MemoryAllocations::build(udts),
        }
    }
}
