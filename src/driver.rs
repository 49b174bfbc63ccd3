//! State Source Abstraction
//!
//! A decode stops whenever it needs state the snapshot lacks. The driver
//! answers those requests through a [`StateSource`]:
//! - A live node or tracer, for state captured lazily
//! - Cached state for offline inspection
//! - [`MockSource`] for testing
//!
//! [`drive`] is the trampoline: step, fetch, resume, until done.

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use evm_codec_core::{DecodeProcess, Request, Response, Step};
use evm_codec_types::conversion::word_from_u256;
use evm_codec_types::DecodedResult;
use std::collections::HashMap;

/// Something that can answer decoder requests.
pub trait StateSource {
    /// Fetch the bytes `request` names. Storage and stack answers are one
    /// word; memory and call data answers cover the requested range.
    fn fetch(&mut self, request: &Request) -> Result<Vec<u8>>;
}

/// A source that fails every request. Decoding is limited to the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOnly;

impl StateSource for SnapshotOnly {
    fn fetch(&mut self, request: &Request) -> Result<Vec<u8>> {
        Err(anyhow!("{} is not in the snapshot and fetching is disabled", request))
    }
}

/// A source with pre-configured responses, for tests and offline replays.
///
/// Unset storage slots read as zero, as they do on chain; every other
/// unknown request fails.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    storage: HashMap<U256, U256>,
    code: HashMap<Address, Vec<u8>>,
    stack: Vec<Vec<u8>>,
    memory: Vec<u8>,
    calldata: Vec<u8>,
    /// If set, all fetches fail with this error.
    force_error: Option<String>,
    fetched: Vec<Request>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(mut self, slot: U256, value: U256) -> Self {
        self.storage.insert(slot, value);
        self
    }

    pub fn with_code(mut self, address: Address, code: Vec<u8>) -> Self {
        self.code.insert(address, code);
        self
    }

    pub fn with_stack(mut self, stack: Vec<Vec<u8>>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_memory(mut self, memory: Vec<u8>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_calldata(mut self, calldata: Vec<u8>) -> Self {
        self.calldata = calldata;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.force_error = Some(error.into());
        self
    }

    /// Every request answered or refused so far, in order.
    pub fn fetched(&self) -> &[Request] {
        &self.fetched
    }
}

fn range(buffer: &[u8], start: usize, length: usize) -> Vec<u8> {
    let mut out = vec![0u8; length];
    if start < buffer.len() {
        let available = (buffer.len() - start).min(length);
        out[..available].copy_from_slice(&buffer[start..start + available]);
    }
    out
}

impl StateSource for MockSource {
    fn fetch(&mut self, request: &Request) -> Result<Vec<u8>> {
        self.fetched.push(request.clone());
        if let Some(error) = &self.force_error {
            return Err(anyhow!("{}", error));
        }
        match request {
            Request::Storage { slot } => {
                let value = self.storage.get(slot).copied().unwrap_or_default();
                Ok(word_from_u256(value).to_vec())
            }
            Request::Stack { index } => self
                .stack
                .get(*index)
                .cloned()
                .ok_or_else(|| anyhow!("stack index {} not available", index)),
            Request::Memory { start, length } => Ok(range(&self.memory, *start, *length)),
            Request::Calldata { start, length } => Ok(range(&self.calldata, *start, *length)),
            Request::Code { address } => self
                .code
                .get(address)
                .cloned()
                .ok_or_else(|| anyhow!("no code for {}", address)),
        }
    }
}

/// Run `process` to completion, answering its requests from `source`.
///
/// A failed fetch is passed to the process as a failed response and
/// surfaces as its read failure.
pub fn drive(process: &mut DecodeProcess<'_>, source: &mut dyn StateSource) -> Result<DecodedResult> {
    loop {
        match process.step()? {
            Step::Done(result) => {
                tracing::debug!(
                    requests = process.requests_issued(),
                    "driver: decode complete"
                );
                return Ok(result);
            }
            Step::Request(request) => {
                let response = match source.fetch(&request) {
                    Ok(bytes) => {
                        tracing::trace!(request = %request, bytes = bytes.len(), "driver: fetched");
                        Response::Bytes(bytes)
                    }
                    Err(e) => {
                        tracing::warn!(request = %request, error = %e, "driver: fetch failed");
                        Response::Failed(format!("{:#}", e))
                    }
                };
                process
                    .resume(response)
                    .with_context(|| format!("Failed to fetch {}", request))?;
            }
        }
    }
}
