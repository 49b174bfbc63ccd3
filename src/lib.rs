//! EVM Codec
//!
//! Decode EVM execution state into typed Solidity values:
//!
//! - **State variables**: storage, constants and immutables of a contract
//! - **Call data**: function arguments, matched by selector
//! - **Events**: indexed topics and event data, matched by topic 0
//! - **Arbitrary values**: any type at any pointer (stack, memory, storage, ...)
//!
//! State missing from a snapshot is fetched on demand through a
//! [`StateSource`]. See [`Codec`] for the entry point and
//! [`evm_codec_core`] for the underlying engine.

#![allow(clippy::result_large_err)]

pub mod codec;
pub mod driver;
pub mod metadata;

pub use codec::{Codec, DecodedCall, DecodedEvent, DecodedVariable, Frame};
pub use driver::{drive, MockSource, SnapshotOnly, StateSource};
pub use metadata::{ContractMetadata, Metadata};
