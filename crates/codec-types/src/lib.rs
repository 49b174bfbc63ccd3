//! Shared types for the evm-codec workspace.
//!
//! This crate holds the data model the decoder works over, so that metadata
//! loaders, the engine and consumers (debuggers, transaction inspectors) can
//! agree on it without depending on the engine itself.
//!
//! - [`types`]: Solidity type descriptors and the user-defined type table
//! - [`values`]: decoded values, results and decoding errors
//! - [`state`]: the read-only execution-state snapshot
//! - [`conversion`]: word, two's-complement, checksum and hashing helpers

pub mod conversion;
pub mod state;
pub mod types;
pub mod values;

// Re-export commonly used types at crate root
pub use state::{EvmState, SpecialState, Word};
pub use types::{
    DataLocation, FunctionVisibility, MagicVariable, NamedType, Type, TypeId, UserDefinedType,
    UserDefinedTypes,
};
pub use values::{
    ContractValue, DecodedResult, DecodingError, FixedPoint, InternalFunctionFault,
    InternalFunctionValue, MappingEntry, NamedResult, StringValue, Value,
};
