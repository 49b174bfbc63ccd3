//! Reference types in storage.

use super::read::{gather, Flow};
use super::{collection_length, decode_value, missing_layout, Context};
use crate::allocate::{AllocationError, StorageLength};
use crate::errors::DecodeFault;
use crate::pointer::{storage_array_element, storage_mapping_value, Location, Pointer, Slot};
use alloy_primitives::U256;
use evm_codec_types::conversion::WORD_SIZE;
use evm_codec_types::{
    DataLocation, DecodedResult, DecodingError, MappingEntry, NamedResult, StringValue, Type,
    Value,
};

pub(super) fn decode(ty: &Type, slot: &Slot, cx: &Context<'_>) -> Flow<DecodedResult> {
    match ty {
        Type::Bytes { length: None, .. } | Type::String { .. } => decode_bytes(ty, slot, cx),
        Type::Array { base, length, .. } => decode_array(ty, base, *length, slot, cx),
        Type::Mapping { key, value } => decode_mapping(ty, key, value, slot, cx),
        Type::Struct { id, .. } => decode_struct(ty, id, slot, cx),
        other => Err(DecodeFault::unsupported(format!("{} in storage", other)).into()),
    }
}

/// Footprint of an element or mapping value type.
fn footprint(ty: &Type, cx: &Context<'_>) -> Flow<Result<StorageLength, DecodingError>> {
    match cx
        .info
        .allocations
        .storage
        .size_of(ty, cx.info.user_defined_types)
    {
        Ok(size) => Ok(Ok(size)),
        Err(AllocationError::UnknownType { id }) => {
            Ok(Err(DecodingError::UnresolvedUserDefinedType { id }))
        }
        Err(e) => Err(DecodeFault::unsupported(e.to_string()).into()),
    }
}

/// `bytes`/`string`: values under 32 bytes share the slot with `2·len` in
/// the low byte; longer ones store `2·len + 1` and their data from
/// `keccak(slot)`.
fn decode_bytes(ty: &Type, slot: &Slot, cx: &Context<'_>) -> Flow<DecodedResult> {
    let word = cx.reader.storage_word(slot.address())?;
    let marker = word[WORD_SIZE - 1];

    let data = if marker & 1 == 0 {
        let length = (marker / 2) as usize;
        if length >= WORD_SIZE {
            return Ok(DecodedResult::error(
                ty.clone(),
                DecodingError::BadPadding { raw: word.to_vec() },
            ));
        }
        word[..length].to_vec()
    } else {
        let length = (U256::from_be_bytes(word.0) - U256::from(1u64)) / U256::from(2u64);
        if length < U256::from(WORD_SIZE as u64) {
            return Ok(DecodedResult::error(
                ty.clone(),
                DecodingError::BadPadding { raw: word.to_vec() },
            ));
        }
        let length = match collection_length(length, cx) {
            Ok(length) => length,
            Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
        };
        let start = slot.hashed();
        let words = length.div_ceil(WORD_SIZE);
        let chunks = gather((0..words).map(|i| {
            cx.reader
                .storage_word(start.offset(U256::from(i as u64)).address())
        }))?;
        let mut data: Vec<u8> = chunks.iter().flat_map(|w| w.0).collect();
        data.truncate(length);
        data
    };

    let value = match ty {
        Type::String { .. } => Value::String(StringValue::from_bytes(data)),
        _ => Value::Bytes(data),
    };
    Ok(DecodedResult::value(ty.clone(), value))
}

fn decode_array(
    ty: &Type,
    base: &Type,
    length: Option<u64>,
    slot: &Slot,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let (length, start) = match length {
        Some(n) => (U256::from(n), slot.clone()),
        None => {
            let word = cx.reader.storage_word(slot.address())?;
            (U256::from_be_bytes(word.0), slot.hashed())
        }
    };
    let count = match collection_length(length, cx) {
        Ok(count) => count,
        Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
    };
    let element = match footprint(base, cx)? {
        Ok(element) => element,
        Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
    };

    let base = base.specify_location(DataLocation::Storage);
    let items = gather((0..count).map(|i| {
        let (slot, offset) = storage_array_element(&start, U256::from(i as u64), element);
        decode_value(&base, &Pointer::storage(slot, offset, element), cx)
    }))?;
    Ok(DecodedResult::value(ty.clone(), Value::Array(items)))
}

/// Only keys recorded in the tracker can be listed.
fn decode_mapping(
    ty: &Type,
    key_type: &Type,
    value_type: &Type,
    slot: &Slot,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let address = slot.address();
    let keys = cx
        .info
        .mapping_keys
        .map(|tracker| tracker.keys_for(&address))
        .unwrap_or(&[]);
    let value_size = match footprint(value_type, cx)? {
        Ok(size) => size,
        Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
    };

    let value_type = value_type.specify_location(DataLocation::Storage);
    let entries = gather(keys.iter().map(|key| -> Flow<MappingEntry> {
        let key_result = decode_key(key_type, key, cx)?;
        let value_slot = storage_mapping_value(slot, key);
        let value = decode_value(&value_type, &Pointer::storage(value_slot, 0, value_size), cx)?;
        Ok(MappingEntry {
            key: key_result,
            value,
        })
    }))?;
    Ok(DecodedResult::value(ty.clone(), Value::Mapping(entries)))
}

/// `string`/`bytes` keys are tracked as raw bytes, value types as one word.
fn decode_key(key_type: &Type, key: &[u8], cx: &Context<'_>) -> Flow<DecodedResult> {
    match key_type {
        Type::String { .. } => Ok(DecodedResult::value(
            key_type.clone(),
            Value::String(StringValue::from_bytes(key.to_vec())),
        )),
        Type::Bytes { length: None, .. } => Ok(DecodedResult::value(
            key_type.clone(),
            Value::Bytes(key.to_vec()),
        )),
        _ => decode_value(
            key_type,
            &Pointer::StackLiteral {
                literal: key.to_vec(),
            },
            cx,
        ),
    }
}

fn decode_struct(ty: &Type, id: &str, slot: &Slot, cx: &Context<'_>) -> Flow<DecodedResult> {
    let Some(allocation) = cx.info.allocations.storage.get(id) else {
        return missing_layout(ty, id, Location::Storage, cx);
    };
    let members = gather(allocation.members.iter().map(|member| -> Flow<NamedResult> {
        let pointer = Pointer::storage(
            slot.offset(member.position.slot),
            member.position.offset,
            member.position.length,
        );
        let member_type = member.ty.specify_location(DataLocation::Storage);
        let value = decode_value(&member_type, &pointer, cx)?;
        Ok(NamedResult::new(member.name.clone(), value))
    }))?;
    Ok(DecodedResult::value(ty.clone(), Value::Struct(members)))
}
