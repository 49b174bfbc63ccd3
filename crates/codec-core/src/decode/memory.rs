//! Reference types in memory. Every element and member takes one word;
//! reference elements hold the absolute address of their data.

use super::read::{gather, Flow};
use super::{advance, collection_length, decode_value, missing_layout, position, Context};
use crate::errors::DecodeFault;
use crate::pointer::{Location, Pointer};
use alloy_primitives::U256;
use evm_codec_types::conversion::WORD_SIZE;
use evm_codec_types::{
    DataLocation, DecodedResult, DecodingError, NamedResult, StringValue, Type, Value,
};

/// Decode the object starting at `start`.
pub(super) fn decode(ty: &Type, start: usize, cx: &Context<'_>) -> Flow<DecodedResult> {
    let fail = |e: DecodingError| -> Flow<DecodedResult> { Ok(DecodedResult::error(ty.clone(), e)) };
    match ty {
        Type::Bytes { length: None, .. } | Type::String { .. } => {
            let length = read_word(start, cx)?;
            let length = match collection_length(length, cx) {
                Ok(length) => length,
                Err(e) => return fail(e),
            };
            let data_start = match advance(start, WORD_SIZE) {
                Ok(p) => p,
                Err(e) => return fail(e),
            };
            let data = cx.reader.memory(data_start, length)?;
            let value = match ty {
                Type::String { .. } => Value::String(StringValue::from_bytes(data)),
                _ => Value::Bytes(data),
            };
            Ok(DecodedResult::value(ty.clone(), value))
        }
        Type::Array { base, length, .. } => {
            let (count, first) = match length {
                Some(n) => (U256::from(*n), start),
                None => match advance(start, WORD_SIZE) {
                    Ok(first) => (read_word(start, cx)?, first),
                    Err(e) => return fail(e),
                },
            };
            let count = match collection_length(count, cx) {
                Ok(count) => count,
                Err(e) => return fail(e),
            };
            let items = gather((0..count).map(|i| {
                match advance(first, i.saturating_mul(WORD_SIZE)) {
                    Ok(at) => decode_member(base, at, cx),
                    Err(e) => Ok(DecodedResult::error(
                        base.specify_location(DataLocation::Memory),
                        e,
                    )),
                }
            }))?;
            Ok(DecodedResult::value(ty.clone(), Value::Array(items)))
        }
        Type::Struct { id, .. } => {
            let Some(allocation) = cx.info.allocations.memory.get(id) else {
                return missing_layout(ty, id, Location::Memory, cx);
            };
            let members = gather(allocation.members.iter().map(|member| -> Flow<NamedResult> {
                let value = match advance(start, member.offset) {
                    Ok(at) => decode_member(&member.ty, at, cx)?,
                    Err(e) => DecodedResult::error(member.ty.clone(), e),
                };
                Ok(NamedResult::new(member.name.clone(), value))
            }))?;
            Ok(DecodedResult::value(ty.clone(), Value::Struct(members)))
        }
        other => Err(DecodeFault::unsupported(format!("{} in memory", other)).into()),
    }
}

fn read_word(at: usize, cx: &Context<'_>) -> Flow<U256> {
    Ok(U256::from_be_slice(&cx.reader.memory(at, WORD_SIZE)?))
}

/// Decode the element or member whose word is at `at`.
fn decode_member(ty: &Type, at: usize, cx: &Context<'_>) -> Flow<DecodedResult> {
    let ty = ty.specify_location(DataLocation::Memory);
    if !ty.is_reference() {
        return decode_value(&ty, &Pointer::memory_word(at), cx);
    }
    match position(read_word(at, cx)?) {
        Ok(address) => decode_value(&ty, &Pointer::memory_word(address), cx),
        Err(e) => Ok(DecodedResult::error(ty, e)),
    }
}
