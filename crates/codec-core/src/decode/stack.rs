//! Values held on the stack that need more than one word, or that point
//! elsewhere.
//!
//! Stack layouts:
//!
//! - memory reference: one word, the absolute memory address
//! - storage reference: one word, the slot
//! - calldata `bytes`/`string`/`T[]`: the data offset at `index`, the length
//!   at `index + 1`
//! - other calldata references: one word, the offset
//! - external function: the address at `index`, the selector at `index + 1`

use super::abi::{self, Region};
use super::elementary::contract_value;
use super::read::Flow;
use super::{decode_value, position, Context};
use crate::errors::DecodeFault;
use crate::pointer::{Location, Pointer};
use alloy_primitives::U256;
use evm_codec_types::conversion::{is_zero, left_pad, WORD_SIZE};
use evm_codec_types::{DataLocation, DecodedResult, DecodingError, Type, Value};

/// Dereference a stack-held pointer to a reference value.
pub(super) fn decode_reference(
    ty: &Type,
    pointer: &Pointer,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let word = match pointer {
        Pointer::Stack { index } => cx.reader.stack_word(*index)?,
        Pointer::StackLiteral { literal } => left_pad(literal),
        other => {
            return Err(
                DecodeFault::unsupported(format!("{:?} as a stack pointer", other.location()))
                    .into(),
            )
        }
    };
    let value = U256::from_be_bytes(word.0);

    match ty.location() {
        Some(DataLocation::Storage) => decode_value(ty, &Pointer::storage_slot(value), cx),
        Some(DataLocation::Memory) => match position(value) {
            Ok(address) => decode_value(ty, &Pointer::memory_word(address), cx),
            Err(e) => Ok(DecodedResult::error(ty.clone(), e)),
        },
        Some(DataLocation::Calldata) => {
            let start = match position(value) {
                Ok(start) => start,
                Err(e) => return Ok(DecodedResult::error(ty.clone(), e)),
            };
            if !has_stack_length(ty) {
                return abi::decode_body(ty, Region::Calldata, start, None, cx);
            }
            let Pointer::Stack { index } = pointer else {
                return Err(DecodeFault::unsupported(format!(
                    "calldata {} from a single literal word",
                    ty
                ))
                .into());
            };
            let length = U256::from_be_bytes(cx.reader.stack_word(index + 1)?.0);
            abi::decode_body(ty, Region::Calldata, start, Some(length), cx)
        }
        None => Err(
            DecodeFault::unsupported(format!("{} on the stack without a location", ty)).into(),
        ),
    }
}

/// Calldata slices that keep their length in a second stack word.
fn has_stack_length(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Bytes { length: None, .. } | Type::String { .. } | Type::Array { length: None, .. }
    )
}

/// An external function pointer split over two stack words.
pub(super) fn decode_external_function(
    ty: &Type,
    index: usize,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let address_word = cx.reader.stack_word(index)?;
    let selector_word = cx.reader.stack_word(index + 1)?;

    let (address_padding, address) = address_word.split_at(WORD_SIZE - 20);
    let (selector_padding, selector) = selector_word.split_at(WORD_SIZE - 4);
    if cx.info.options.padding_mode.validates(Location::Stack)
        && !(is_zero(address_padding) && is_zero(selector_padding))
    {
        return Ok(DecodedResult::error(
            ty.clone(),
            DecodingError::StackFunctionPaddingError {
                raw_address: address_word.to_vec(),
                raw_selector: selector_word.to_vec(),
            },
        ));
    }

    let contract = contract_value(address, cx)?;
    Ok(DecodedResult::value(
        ty.clone(),
        Value::FunctionExternal {
            contract,
            selector: selector.to_vec(),
        },
    ))
}
