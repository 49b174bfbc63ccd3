//! The value decoder.
//!
//! A decode is an explicit resumable process. [`DecodeProcess::step`] either
//! finishes with a [`DecodedResult`] or stops with a [`Request`] for state the
//! snapshot lacks; the caller answers with [`DecodeProcess::resume`] and steps
//! again.
//!
//! A step replays the whole decode against the snapshot plus every response
//! received so far, so a suspended process holds nothing but data and may be
//! dropped at any point. Replays are deterministic, and answered ranges are
//! served from the recorded responses, so no range is requested twice.
//!
//! Containers keep decoding past a missing child, so one replay collects
//! every missing read at that depth. Those requests are queued and issued
//! one at a time; the next replay happens only once the queue is drained.
//! The number of replays is therefore bounded by the nesting depth of the
//! value, not by its element count.
//!
//! Dispatch, per (type, pointer):
//!
//! 1. type-of-type and user-defined value types are unwrapped;
//! 2. constants and magic variables come from definitions and the snapshot's
//!    special values;
//! 3. reference types branch on location (stack-held pointers are
//!    dereferenced first);
//! 4. external functions on the stack use the two-word stack layout;
//! 5. everything else is an elementary value read at the pointer.

mod abi;
mod elementary;
mod memory;
mod read;
mod special;
mod stack;
mod storage;


use crate::errors::DecodeFault;
use crate::info::DecoderInfo;
use crate::pointer::{Location, Pointer};
use crate::request::{Request, Response};
use alloy_primitives::U256;
use evm_codec_types::conversion::u256_to_usize;
use evm_codec_types::{DecodedResult, DecodingError, FunctionVisibility, Type, Value};
use read::{Fetched, Flow, Interrupt, Reader};
use std::collections::{HashSet, VecDeque};

/// Largest address or offset a pointer word may hold.
const MAX_POSITION: u64 = u32::MAX as u64;

/// Outcome of one [`DecodeProcess::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The decode needs these bytes before it can continue.
    Request(Request),
    Done(DecodedResult),
}

/// A resumable decode of one value.
#[derive(Debug, Clone)]
pub struct DecodeProcess<'a> {
    ty: Type,
    pointer: Pointer,
    info: DecoderInfo<'a>,
    fetched: Fetched,
    pending: Option<Request>,
    /// Requests found by the last replay, not yet issued.
    queued: VecDeque<Request>,
    requests_issued: usize,
    replays: usize,
}

impl<'a> DecodeProcess<'a> {
    pub fn new(ty: Type, pointer: Pointer, info: DecoderInfo<'a>) -> Self {
        Self {
            ty,
            pointer,
            info,
            fetched: Fetched::default(),
            pending: None,
            queued: VecDeque::new(),
            requests_issued: 0,
            replays: 0,
        }
    }

    /// Run until the decode completes or needs data. While a request is
    /// outstanding, stepping again returns the same request.
    pub fn step(&mut self) -> Result<Step, DecodeFault> {
        if let Some(request) = &self.pending {
            return Ok(Step::Request(request.clone()));
        }
        if let Some(request) = self.queued.pop_front() {
            return Ok(self.issue(request));
        }
        self.replays += 1;
        let cx = Context {
            info: self.info,
            reader: Reader::new(self.info.state, &self.fetched),
        };
        match decode_value(&self.ty, &self.pointer, &cx) {
            Ok(result) => {
                tracing::trace!(
                    ty = %self.ty,
                    requests = self.requests_issued,
                    error = result.is_error(),
                    "decode: done"
                );
                Ok(Step::Done(result))
            }
            Err(Interrupt::Missing(requests)) => {
                let mut seen = HashSet::with_capacity(requests.len());
                self.queued = requests
                    .into_iter()
                    .filter(|request| seen.insert(request.clone()))
                    .collect();
                let Some(first) = self.queued.pop_front() else {
                    return Err(DecodeFault::unsupported("suspended without a request"));
                };
                tracing::debug!(
                    ty = %self.ty,
                    request = %first,
                    queued = self.queued.len(),
                    "decode: suspended"
                );
                Ok(self.issue(first))
            }
            Err(Interrupt::Fault(fault)) => {
                tracing::warn!(ty = %self.ty, error = %fault, "decode: fault");
                Err(fault)
            }
        }
    }

    /// Answer the outstanding request.
    pub fn resume(&mut self, response: Response) -> Result<(), DecodeFault> {
        let request = self.pending.take().ok_or(DecodeFault::NoPendingRequest)?;
        match response {
            Response::Bytes(bytes) => {
                tracing::trace!(request = %request, bytes = bytes.len(), "decode: resumed");
                self.fetched.record(&request, bytes);
                Ok(())
            }
            Response::Failed(reason) => Err(DecodeFault::ReadFailure {
                request: Some(request),
                reason,
            }),
        }
    }

    fn issue(&mut self, request: Request) -> Step {
        self.requests_issued += 1;
        self.pending = Some(request.clone());
        Step::Request(request)
    }

    pub fn pending(&self) -> Option<&Request> {
        self.pending.as_ref()
    }

    /// Number of requests issued so far.
    pub fn requests_issued(&self) -> usize {
        self.requests_issued
    }

    /// Number of times the decode has been run from the root.
    pub fn replays(&self) -> usize {
        self.replays
    }
}

/// Start decoding a value of `ty` at `pointer`.
pub fn decode<'a>(ty: &Type, pointer: &Pointer, info: DecoderInfo<'a>) -> DecodeProcess<'a> {
    DecodeProcess::new(ty.clone(), pointer.clone(), info)
}

/// Decode from the snapshot alone; any missing state is a read failure.
pub fn decode_snapshot(
    ty: &Type,
    pointer: &Pointer,
    info: DecoderInfo<'_>,
) -> Result<DecodedResult, DecodeFault> {
    match decode(ty, pointer, info).step()? {
        Step::Done(result) => Ok(result),
        Step::Request(request) => Err(DecodeFault::ReadFailure {
            reason: format!("{} is not in the snapshot", request),
            request: Some(request),
        }),
    }
}

// =============================================================================
// Dispatch
// =============================================================================

#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    pub(crate) info: DecoderInfo<'a>,
    pub(crate) reader: Reader<'a>,
}

pub(crate) fn decode_value(ty: &Type, pointer: &Pointer, cx: &Context<'_>) -> Flow<DecodedResult> {
    match ty {
        Type::TypeOf { ty: inner } => {
            return Ok(DecodedResult::value(ty.clone(), Value::Type((**inner).clone())))
        }
        Type::UserDefinedValueType { id, .. } => {
            let Some(underlying) = cx.info.user_defined_types.underlying(id) else {
                return unresolved(ty, id);
            };
            let inner = decode_value(underlying, pointer, cx)?;
            return Ok(match inner {
                DecodedResult::Error { error, .. } => DecodedResult::error(ty.clone(), error),
                value => DecodedResult::value(
                    ty.clone(),
                    Value::UserDefinedValueType(Box::new(value)),
                ),
            });
        }
        _ => {}
    }

    match pointer {
        Pointer::Definition(expression) => return special::decode_constant(ty, expression, cx),
        Pointer::Special(variable) => return special::decode_magic(ty, *variable, cx),
        _ => {}
    }
    if let Type::Magic { variable } = ty {
        return special::decode_magic(ty, *variable, cx);
    }

    if ty.is_reference() {
        return match pointer {
            Pointer::Stack { .. } | Pointer::StackLiteral { .. } => {
                stack::decode_reference(ty, pointer, cx)
            }
            Pointer::Storage { slot, .. } => storage::decode(ty, slot, cx),
            Pointer::Memory { start, .. } => memory::decode(ty, *start, cx),
            Pointer::Calldata(abi) => abi::decode(ty, abi, abi::Region::Calldata, cx),
            Pointer::Eventdata(abi) => abi::decode(ty, abi, abi::Region::Eventdata, cx),
            Pointer::Eventtopic { index } => {
                let word = cx.reader.topic(*index)?;
                Ok(DecodedResult::error(
                    ty.clone(),
                    DecodingError::IndexedReferenceType { raw: word.to_vec() },
                ))
            }
            Pointer::Code { .. } | Pointer::Definition(_) | Pointer::Special(_) => Err(
                DecodeFault::unsupported(format!("{} at {:?}", ty, pointer.location())).into(),
            ),
        };
    }

    if let (
        Type::Function {
            visibility: FunctionVisibility::External,
            ..
        },
        Pointer::Stack { index },
    ) = (ty, pointer)
    {
        return stack::decode_external_function(ty, *index, cx);
    }

    elementary::decode(ty, pointer, cx)
}

// =============================================================================
// Shared Helpers
// =============================================================================

fn unresolved(ty: &Type, id: &str) -> Flow<DecodedResult> {
    Ok(DecodedResult::error(
        ty.clone(),
        DecodingError::UnresolvedUserDefinedType { id: id.to_string() },
    ))
}

/// A struct with no layout for this location: unresolved if its id is
/// unknown, otherwise a type that cannot live there.
fn missing_layout(
    ty: &Type,
    id: &str,
    location: Location,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    if cx.info.user_defined_types.get(id).is_none() {
        return unresolved(ty, id);
    }
    Err(DecodeFault::unsupported(format!("{} has no {:?} layout", ty, location)).into())
}

/// Element count of a collection, bounded by the configured limit.
fn collection_length(length: U256, cx: &Context<'_>) -> Result<usize, DecodingError> {
    u256_to_usize(length)
        .filter(|&n| (n as u64) <= cx.info.options.max_collection_length)
        .ok_or(DecodingError::OverlongCollection { length })
}

/// A byte position held in a pointer word.
fn position(word: U256) -> Result<usize, DecodingError> {
    if word > U256::from(MAX_POSITION) {
        return Err(DecodingError::PointerTooLarge { pointer: word });
    }
    u256_to_usize(word).ok_or(DecodingError::PointerTooLarge { pointer: word })
}

/// `base + offset`, as a position.
fn advance(base: usize, offset: usize) -> Result<usize, DecodingError> {
    base.checked_add(offset)
        .filter(|&p| p as u64 <= MAX_POSITION)
        .ok_or(DecodingError::PointerTooLarge {
            pointer: U256::from(base as u64).saturating_add(U256::from(offset as u64)),
        })
}
