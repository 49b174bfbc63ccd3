#![allow(unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: a token contract's metadata, storage and call data
//! - `assertions`: assertion helpers with better failure messages

pub mod assertions;
pub mod fixtures;

pub use assertions::{assert_error_contains, assert_ok};
pub use fixtures::{
    alice, bob, token_address, token_codec, token_metadata, token_source, token_state,
    transfer_calldata, transfer_state,
};
