//! Reference types in ABI-encoded regions (call data, event data).
//!
//! A pointer names a head entry. Dynamic values keep an offset word there,
//! relative to the enclosing tuple's start; static values are inline.

use super::read::{gather, Flow};
use super::{advance, collection_length, decode_value, missing_layout, position, Context};
use crate::allocate::{AbiAllocation, AllocationError};
use crate::errors::DecodeFault;
use crate::pointer::{AbiPointer, Location, Pointer};
use alloy_primitives::U256;
use evm_codec_types::conversion::WORD_SIZE;
use evm_codec_types::{
    DataLocation, DecodedResult, DecodingError, NamedResult, StringValue, Type, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Region {
    Calldata,
    Eventdata,
}

impl Region {
    fn read(self, start: usize, length: usize, cx: &Context<'_>) -> Flow<Vec<u8>> {
        match self {
            Region::Calldata => cx.reader.calldata(start, length),
            Region::Eventdata => cx.reader.eventdata(start, length),
        }
    }

    fn word(self, at: usize, cx: &Context<'_>) -> Flow<U256> {
        Ok(U256::from_be_slice(&self.read(at, WORD_SIZE, cx)?))
    }

    fn pointer(self, abi: AbiPointer) -> Pointer {
        match self {
            Region::Calldata => Pointer::Calldata(abi),
            Region::Eventdata => Pointer::Eventdata(abi),
        }
    }

    fn location(self) -> Location {
        match self {
            Region::Calldata => Location::Calldata,
            Region::Eventdata => Location::Eventdata,
        }
    }

    fn locate(self, ty: &Type) -> Type {
        match self {
            Region::Calldata => ty.specify_location(DataLocation::Calldata),
            Region::Eventdata => ty.clone(),
        }
    }
}

/// Decode the value whose head entry `pointer` names.
pub(super) fn decode(
    ty: &Type,
    pointer: &AbiPointer,
    region: Region,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let start = if ty.is_dynamic(cx.info.user_defined_types) {
        let offset = region.word(pointer.start, cx)?;
        match position(offset).and_then(|offset| advance(pointer.base, offset)) {
            Ok(start) => start,
            Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
        }
    } else {
        pointer.start
    };
    decode_body(ty, region, start, None, cx)
}

/// Decode the data of `ty` starting at `start`.
///
/// `known_length` is set when the length of a `bytes`, `string` or dynamic
/// array came from elsewhere (a calldata slice on the stack); the data then
/// starts at `start` with no length word.
pub(super) fn decode_body(
    ty: &Type,
    region: Region,
    start: usize,
    known_length: Option<U256>,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let fail = |e: DecodingError| -> Flow<DecodedResult> { Ok(DecodedResult::error(ty.clone(), e)) };
    let udts = cx.info.user_defined_types;

    match ty {
        Type::Bytes { length: None, .. } | Type::String { .. } => {
            let (length, data_start) = match length_and_data(start, known_length, region, cx)? {
                Ok(found) => found,
                Err(e) => return fail(e),
            };
            let length = match collection_length(length, cx) {
                Ok(length) => length,
                Err(e) => return fail(e),
            };
            let data = region.read(data_start, length, cx)?;
            let value = match ty {
                Type::String { .. } => Value::String(StringValue::from_bytes(data)),
                _ => Value::Bytes(data),
            };
            Ok(DecodedResult::value(ty.clone(), value))
        }
        Type::Array { base, length, .. } => {
            let (count, elements) = match length {
                Some(n) => (U256::from(*n), start),
                None => match length_and_data(start, known_length, region, cx)? {
                    Ok(found) => found,
                    Err(e) => return fail(e),
                },
            };
            let count = match collection_length(count, cx) {
                Ok(count) => count,
                Err(e) => return fail(e),
            };
            let element_size = match cx.info.allocations.abi.size_of(base, udts) {
                Ok(size) => size,
                Err(AllocationError::UnknownType { id }) => {
                    return fail(DecodingError::UnresolvedUserDefinedType { id })
                }
                Err(e) => return Err(DecodeFault::unsupported(e.to_string()).into()),
            };
            let base = region.locate(base);
            let items = gather((0..count).map(|i| {
                match advance(elements, i.saturating_mul(element_size)) {
                    Ok(head) => {
                        let pointer = AbiPointer::new(head, element_size, elements);
                        decode_value(&base, &region.pointer(pointer), cx)
                    }
                    Err(e) => Ok(DecodedResult::error(base.clone(), e)),
                }
            }))?;
            Ok(DecodedResult::value(ty.clone(), Value::Array(items)))
        }
        Type::Struct { id, .. } => {
            let Some(allocation) = cx.info.allocations.abi.get(id) else {
                return missing_layout(ty, id, region.location(), cx);
            };
            let members = decode_members(allocation, region, start, cx)?;
            Ok(DecodedResult::value(ty.clone(), Value::Struct(members)))
        }
        Type::Tuple { members } => {
            let allocation = match cx.info.allocations.abi.allocate_tuple(members, udts) {
                Ok(allocation) => allocation,
                Err(AllocationError::UnknownType { id }) => {
                    return fail(DecodingError::UnresolvedUserDefinedType { id })
                }
                Err(e) => return Err(DecodeFault::unsupported(e.to_string()).into()),
            };
            let members = decode_members(&allocation, region, start, cx)?;
            Ok(DecodedResult::value(ty.clone(), Value::Tuple(members)))
        }
        other => Err(DecodeFault::unsupported(format!("{} in {:?}", other, region)).into()),
    }
}

/// Length and data start of a dynamic collection at `start`.
fn length_and_data(
    start: usize,
    known_length: Option<U256>,
    region: Region,
    cx: &Context<'_>,
) -> Flow<Result<(U256, usize), DecodingError>> {
    Ok(match known_length {
        Some(length) => Ok((length, start)),
        None => {
            let length = region.word(start, cx)?;
            advance(start, WORD_SIZE).map(|data| (length, data))
        }
    })
}

fn decode_members(
    allocation: &AbiAllocation,
    region: Region,
    start: usize,
    cx: &Context<'_>,
) -> Flow<Vec<NamedResult>> {
    gather(allocation.members.iter().map(|member| -> Flow<NamedResult> {
        let ty = region.locate(&member.ty);
        let value = match advance(start, member.offset) {
            Ok(head) => {
                let pointer = AbiPointer::new(head, member.length, start);
                decode_value(&ty, &region.pointer(pointer), cx)?
            }
            Err(e) => DecodedResult::error(ty, e),
        };
        Ok(NamedResult::new(member.name.clone(), value))
    }))
}
