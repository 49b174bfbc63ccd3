//! EVM Codec Core
//!
//! Allocation, pointer and value-decoding engine for EVM execution state.
//!
//! Given a Solidity type, a pointer saying where its bytes live, and a
//! snapshot of machine state, this crate produces a typed value. State the
//! snapshot lacks is requested from the caller one range at a time.
//!
//! # Core Modules
//!
//! - [`allocate`]: storage, ABI and memory layouts for structs, state
//!   variables, function arguments and event parameters
//! - [`pointer`]: location descriptors and slot/offset arithmetic
//! - [`decode`]: the resumable decoder
//! - [`mapping_keys`]: mapping keys observed during execution
//! - [`info`]: borrowed decode inputs and contract contexts
//! - [`options`]: padding policy, contract identification, limits
//!
//! # Example
//!
//! ```ignore
//! use evm_codec_core::{decode, Allocations, DecoderInfo, Pointer, Response, Step};
//!
//! let allocations = Allocations::build(&udts);
//! let info = DecoderInfo::new(&state, &udts, &allocations);
//! let mut process = decode(&ty, &Pointer::storage_slot(slot), info);
//! let result = loop {
//!     match process.step()? {
//!         Step::Done(result) => break result,
//!         Step::Request(request) => process.resume(Response::Bytes(fetch(&request)?))?,
//!     }
//! };
//! ```

#![allow(clippy::result_large_err)]

pub mod allocate;
pub mod decode;
pub mod errors;
pub mod info;
pub mod mapping_keys;
pub mod options;
pub mod pointer;
pub mod request;

pub use allocate::{AllocationError, Allocations};
pub use decode::{decode, decode_snapshot, DecodeProcess, Step};
pub use errors::DecodeFault;
pub use info::{ContractContext, DecoderInfo, InternalFunctionEntry};
pub use mapping_keys::MappingKeyTracker;
pub use options::{DecoderOptions, PaddingMode};
pub use pointer::{AbiPointer, ConstantExpression, Location, Pointer, Slot};
pub use request::{Request, RequestKind, Response};
