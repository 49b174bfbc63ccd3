//! Reads against the snapshot plus the responses gathered so far.
//!
//! A read that neither can answer interrupts the decode with the request for
//! exactly the missing range. Containers [`gather`] their children, so one
//! pass reports every missing range at the same nesting depth.

use crate::errors::DecodeFault;
use crate::request::Request;
use alloy_primitives::{Address, U256};
use evm_codec_types::conversion::left_pad;
use evm_codec_types::{EvmState, Word};
use std::collections::HashMap;

/// Why a decode stopped before producing a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// Reads that could not be served, in discovery order.
    Missing(Vec<Request>),
    Fault(DecodeFault),
}

impl Interrupt {
    pub(crate) fn missing(request: Request) -> Self {
        Interrupt::Missing(vec![request])
    }
}

impl From<DecodeFault> for Interrupt {
    fn from(fault: DecodeFault) -> Self {
        Interrupt::Fault(fault)
    }
}

pub(crate) type Flow<T> = Result<T, Interrupt>;

/// Evaluate every item, carrying on past missing state. Missing reads of all
/// items are merged into one interrupt; a fault stops at once.
pub(crate) fn gather<T>(items: impl IntoIterator<Item = Flow<T>>) -> Flow<Vec<T>> {
    let items = items.into_iter();
    let mut done = Vec::with_capacity(items.size_hint().0);
    let mut missing = Vec::new();
    for item in items {
        match item {
            Ok(value) => done.push(value),
            Err(Interrupt::Missing(requests)) => missing.extend(requests),
            Err(fault) => return Err(fault),
        }
    }
    if missing.is_empty() {
        Ok(done)
    } else {
        Err(Interrupt::Missing(missing))
    }
}

/// Responses received during one decode.
#[derive(Debug, Clone, Default)]
pub(crate) struct Fetched {
    stack: HashMap<usize, Word>,
    storage: HashMap<U256, Word>,
    memory: Vec<(usize, Vec<u8>)>,
    calldata: Vec<(usize, Vec<u8>)>,
    code: HashMap<Address, Vec<u8>>,
}

impl Fetched {
    /// Record the answer to `request`, normalised to the requested shape:
    /// words are left-padded (keeping the low-order 32 bytes), ranges are
    /// zero-filled or truncated to the requested length.
    pub(crate) fn record(&mut self, request: &Request, bytes: Vec<u8>) {
        match request {
            Request::Stack { index } => {
                self.stack.insert(*index, left_pad(&bytes));
            }
            Request::Storage { slot } => {
                self.storage.insert(*slot, left_pad(&bytes));
            }
            Request::Memory { start, length } => {
                self.memory.push((*start, fit(bytes, *length)));
            }
            Request::Calldata { start, length } => {
                self.calldata.push((*start, fit(bytes, *length)));
            }
            Request::Code { address } => {
                self.code.insert(*address, bytes);
            }
        }
    }
}

fn fit(mut bytes: Vec<u8>, length: usize) -> Vec<u8> {
    bytes.resize(length, 0);
    bytes
}

/// Copy `[start, start + length)` out of `buffer`, zero-filling past its end.
fn slice_zero_filled(buffer: &[u8], start: usize, length: usize) -> Vec<u8> {
    let mut out = vec![0u8; length];
    if start < buffer.len() {
        let available = (buffer.len() - start).min(length);
        out[..available].copy_from_slice(&buffer[start..start + available]);
    }
    out
}

fn covered(ranges: &[(usize, Vec<u8>)], start: usize, length: usize) -> Option<Vec<u8>> {
    ranges.iter().find_map(|(from, bytes)| {
        let end = start.checked_add(length)?;
        let available = from.checked_add(bytes.len())?;
        (*from <= start && end <= available).then(|| bytes[start - from..end - from].to_vec())
    })
}

#[derive(Clone, Copy)]
pub(crate) struct Reader<'a> {
    state: &'a EvmState,
    fetched: &'a Fetched,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(state: &'a EvmState, fetched: &'a Fetched) -> Self {
        Self { state, fetched }
    }

    pub(crate) fn stack_word(&self, index: usize) -> Flow<Word> {
        match &self.state.stack {
            Some(stack) => stack.get(index).copied().ok_or_else(|| {
                DecodeFault::StackIndexOutOfRange {
                    index,
                    depth: stack.len(),
                }
                .into()
            }),
            None => self
                .fetched
                .stack
                .get(&index)
                .copied()
                .ok_or_else(|| Interrupt::missing(Request::Stack { index })),
        }
    }

    pub(crate) fn storage_word(&self, slot: U256) -> Flow<Word> {
        if let Some(word) = self.state.storage_word(&slot) {
            return Ok(*word);
        }
        self.fetched
            .storage
            .get(&slot)
            .copied()
            .ok_or_else(|| Interrupt::missing(Request::Storage { slot }))
    }

    pub(crate) fn memory(&self, start: usize, length: usize) -> Flow<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        match &self.state.memory {
            Some(memory) => Ok(slice_zero_filled(memory, start, length)),
            None => covered(&self.fetched.memory, start, length)
                .ok_or_else(|| Interrupt::missing(Request::Memory { start, length })),
        }
    }

    pub(crate) fn calldata(&self, start: usize, length: usize) -> Flow<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        match &self.state.calldata {
            Some(calldata) => Ok(slice_zero_filled(calldata, start, length)),
            None => covered(&self.fetched.calldata, start, length)
                .ok_or_else(|| Interrupt::missing(Request::Calldata { start, length })),
        }
    }

    /// Event data has no request kind; it must be in the snapshot.
    pub(crate) fn eventdata(&self, start: usize, length: usize) -> Flow<Vec<u8>> {
        match &self.state.eventdata {
            Some(data) => Ok(slice_zero_filled(data, start, length)),
            None => Err(DecodeFault::ReadFailure {
                request: None,
                reason: "event data was not captured".to_string(),
            }
            .into()),
        }
    }

    pub(crate) fn topic(&self, index: usize) -> Flow<Word> {
        self.state.eventtopics.get(index).copied().ok_or_else(|| {
            DecodeFault::ReadFailure {
                request: None,
                reason: format!(
                    "event topic {} was not captured ({} topics)",
                    index,
                    self.state.eventtopics.len()
                ),
            }
            .into()
        })
    }

    pub(crate) fn code(&self, address: Address) -> Flow<&'a [u8]> {
        if let Some(code) = self.state.code.get(&address) {
            return Ok(code);
        }
        self.fetched
            .code
            .get(&address)
            .map(Vec::as_slice)
            .ok_or_else(|| Interrupt::missing(Request::Code { address }))
    }

    /// `length` bytes of the code at `address`, zero-filled past its end.
    pub(crate) fn code_range(&self, address: Address, start: usize, length: usize) -> Flow<Vec<u8>> {
        let code = self.code(address)?;
        Ok(slice_zero_filled(code, start, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_storage_becomes_request_until_recorded() {
        let state = EvmState::new();
        let mut fetched = Fetched::default();
        let slot = U256::from(4u64);

        let err = Reader::new(&state, &fetched).storage_word(slot).unwrap_err();
        assert_eq!(err, Interrupt::missing(Request::Storage { slot }));

        fetched.record(&Request::Storage { slot }, vec![0x2a]);
        let word = Reader::new(&state, &fetched).storage_word(slot).unwrap();
        assert_eq!(word.0[31], 0x2a);
    }

    #[test]
    fn test_captured_memory_is_zero_filled() {
        let state = EvmState::new().with_memory(vec![1, 2, 3]);
        let fetched = Fetched::default();
        let reader = Reader::new(&state, &fetched);
        assert_eq!(reader.memory(1, 4).unwrap(), vec![2, 3, 0, 0]);
        assert_eq!(reader.memory(10, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_fetched_ranges_answer_subranges() {
        let state = EvmState::new();
        let mut fetched = Fetched::default();
        fetched.record(
            &Request::Calldata {
                start: 4,
                length: 64,
            },
            (0u8..64).collect(),
        );
        let reader = Reader::new(&state, &fetched);
        assert_eq!(reader.calldata(36, 2).unwrap(), vec![32, 33]);
        assert_eq!(
            reader.calldata(60, 32).unwrap_err(),
            Interrupt::missing(Request::Calldata {
                start: 60,
                length: 32
            })
        );
    }

    #[test]
    fn test_captured_stack_out_of_range_is_a_fault() {
        let state = EvmState::new().with_stack(vec![Word::ZERO]);
        let fetched = Fetched::default();
        let err = Reader::new(&state, &fetched).stack_word(3).unwrap_err();
        assert_eq!(
            err,
            Interrupt::Fault(DecodeFault::StackIndexOutOfRange { index: 3, depth: 1 })
        );
    }

    #[test]
    fn test_uncaptured_event_data_fails() {
        let state = EvmState::new();
        let fetched = Fetched::default();
        assert!(matches!(
            Reader::new(&state, &fetched).eventdata(0, 32),
            Err(Interrupt::Fault(DecodeFault::ReadFailure { .. }))
        ));
    }

    #[test]
    fn test_gather_merges_missing_reads() {
        let state = EvmState::new().with_storage_value(U256::from(1u64), U256::from(7u64));
        let fetched = Fetched::default();
        let reader = Reader::new(&state, &fetched);

        let err = gather((0u64..3).map(|i| reader.storage_word(U256::from(i)))).unwrap_err();
        assert_eq!(
            err,
            Interrupt::Missing(vec![
                Request::Storage { slot: U256::ZERO },
                Request::Storage {
                    slot: U256::from(2u64)
                },
            ])
        );

        let words = gather([reader.storage_word(U256::from(1u64))]).unwrap();
        assert_eq!(words[0].0[31], 7);
    }

    #[test]
    fn test_gather_stops_on_fault() {
        let state = EvmState::new().with_stack(vec![Word::ZERO]);
        let fetched = Fetched::default();
        let reader = Reader::new(&state, &fetched);
        let err = gather([reader.storage_word(U256::ZERO), reader.stack_word(5)]).unwrap_err();
        assert!(matches!(
            err,
            Interrupt::Fault(DecodeFault::StackIndexOutOfRange { .. })
        ));
    }
}
