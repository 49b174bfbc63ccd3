//! Value types: read the pointer's bytes, check padding, convert.

use super::read::Flow;
use super::Context;
use crate::allocate::storage::enum_byte_width;
use crate::errors::DecodeFault;
use crate::pointer::Pointer;
use alloy_primitives::{Address, U256};
use evm_codec_types::conversion::{
    checksum_address, is_sign_extension, is_zero, left_pad, to_signed, u256_from_bytes, u256_to_usize, WORD_SIZE,
};
use evm_codec_types::{
    ContractValue, DecodedResult, DecodingError, FixedPoint, FunctionVisibility,
    InternalFunctionFault, InternalFunctionValue, Type, Value,
};

/// Decode a value type at any byte-addressed location.
pub(super) fn decode(ty: &Type, pointer: &Pointer, cx: &Context<'_>) -> Flow<DecodedResult> {
    let raw = read_raw(pointer, cx)?;
    let validate = cx.info.options.padding_mode.validates(pointer.location());
    interpret(ty, &raw, validate, cx)
}

/// The bytes a pointer covers, before any padding is removed.
pub(super) fn read_raw(pointer: &Pointer, cx: &Context<'_>) -> Flow<Vec<u8>> {
    match pointer {
        Pointer::Stack { index } => Ok(cx.reader.stack_word(*index)?.to_vec()),
        Pointer::StackLiteral { literal } => Ok(left_pad(literal).to_vec()),
        Pointer::Storage {
            slot,
            offset,
            length,
        } => {
            let offset = *offset as usize;
            if offset + length > WORD_SIZE {
                return Err(DecodeFault::unsupported(format!(
                    "storage read of {} bytes at offset {} crosses a slot",
                    length, offset
                ))
                .into());
            }
            let word = cx.reader.storage_word(slot.address())?;
            let end = WORD_SIZE - offset;
            Ok(word[end - length..end].to_vec())
        }
        Pointer::Memory { start, length } => cx.reader.memory(*start, *length),
        Pointer::Calldata(abi) => cx.reader.calldata(abi.start, abi.length),
        Pointer::Eventdata(abi) => cx.reader.eventdata(abi.start, abi.length),
        Pointer::Eventtopic { index } => Ok(cx.reader.topic(*index)?.to_vec()),
        Pointer::Code { start, length } => {
            let address = cx.info.current_address.ok_or_else(|| DecodeFault::ReadFailure {
                request: None,
                reason: "no current contract address for a code read".to_string(),
            })?;
            cx.reader.code_range(address, *start, *length)
        }
        Pointer::Definition(_) | Pointer::Special(_) => Err(DecodeFault::unsupported(format!(
            "raw read from {:?}",
            pointer.location()
        ))
        .into()),
    }
}

/// Right-aligned split: `(padding, value)`.
fn split_right(raw: &[u8], width: usize) -> (&[u8], &[u8]) {
    if raw.len() >= width {
        raw.split_at(raw.len() - width)
    } else {
        (&[], raw)
    }
}

/// Left-aligned split: `(value, padding)`.
fn split_left(raw: &[u8], width: usize) -> (&[u8], &[u8]) {
    raw.split_at(width.min(raw.len()))
}

fn byte_width(bits: u16) -> usize {
    (bits as usize).div_ceil(8).clamp(1, WORD_SIZE)
}

/// Convert raw bytes to a value of `ty`.
///
/// With `validate` set, bytes outside the type's width must be zero (or a
/// sign extension, for signed types); otherwise they are dropped.
pub(super) fn interpret(
    ty: &Type,
    raw: &[u8],
    validate: bool,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let bad_padding = || -> Flow<DecodedResult> {
        Ok(DecodedResult::error(
            ty.clone(),
            DecodingError::BadPadding { raw: raw.to_vec() },
        ))
    };
    let value = |value: Value| -> Flow<DecodedResult> { Ok(DecodedResult::value(ty.clone(), value)) };

    match ty {
        Type::Uint { bits } | Type::Ufixed { bits, .. } => {
            let (padding, bytes) = split_right(raw, byte_width(*bits));
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let numeric = u256_from_bytes(bytes);
            match ty {
                Type::Ufixed { places, .. } => value(Value::Ufixed(FixedPoint {
                    negative: false,
                    magnitude: numeric,
                    places: *places,
                })),
                _ => value(Value::Uint(numeric)),
            }
        }
        Type::Int { bits } | Type::Fixed { bits, .. } => {
            let (padding, bytes) = split_right(raw, byte_width(*bits));
            let msb = bytes.first().copied().unwrap_or(0);
            if validate && !is_sign_extension(padding, msb) {
                return bad_padding();
            }
            let signed = to_signed(bytes);
            match ty {
                Type::Fixed { places, .. } => value(Value::Fixed(FixedPoint {
                    negative: signed.is_negative(),
                    magnitude: signed.unsigned_abs(),
                    places: *places,
                })),
                _ => value(Value::Int(signed)),
            }
        }
        Type::Bool => {
            let (padding, bytes) = split_right(raw, 1);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            match bytes.first().copied().unwrap_or(0) {
                0 => value(Value::Bool(false)),
                1 => value(Value::Bool(true)),
                other => Ok(DecodedResult::error(
                    ty.clone(),
                    DecodingError::BoolOutOfRange {
                        raw: U256::from(other),
                    },
                )),
            }
        }
        Type::Address { .. } | Type::Contract { .. } => {
            let (padding, bytes) = split_right(raw, 20);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let bytes = left_pad(bytes);
            let address = &bytes[WORD_SIZE - 20..];
            match ty {
                Type::Contract { .. } => value(Value::Contract(contract_value(address, cx)?)),
                _ => value(Value::Address(checksum_address(address))),
            }
        }
        Type::Bytes {
            length: Some(n), ..
        } => {
            let (bytes, padding) = split_left(raw, *n as usize);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let mut bytes = bytes.to_vec();
            bytes.resize(*n as usize, 0);
            value(Value::Bytes(bytes))
        }
        Type::Enum { id, .. } => {
            let Some(options) = cx.info.user_defined_types.enum_options(id) else {
                return Ok(DecodedResult::error(
                    ty.clone(),
                    DecodingError::UnresolvedUserDefinedType { id: id.clone() },
                ));
            };
            let (padding, bytes) = split_right(raw, enum_byte_width(options.len()) as usize);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let numeric = u256_from_bytes(bytes);
            match u256_to_usize(numeric).and_then(|i| options.get(i)) {
                Some(name) => value(Value::Enum {
                    name: name.clone(),
                    numeric,
                }),
                None => Ok(DecodedResult::error(
                    ty.clone(),
                    DecodingError::EnumOrdinalOutOfRange { raw: numeric },
                )),
            }
        }
        Type::Function {
            visibility: FunctionVisibility::External,
            ..
        } => {
            let (bytes, padding) = split_left(raw, 24);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let mut bytes = bytes.to_vec();
            bytes.resize(24, 0);
            let contract = contract_value(&bytes[..20], cx)?;
            value(Value::FunctionExternal {
                contract,
                selector: bytes[20..].to_vec(),
            })
        }
        Type::Function {
            visibility: FunctionVisibility::Internal,
            ..
        } => {
            let (padding, bytes) = split_right(raw, 8);
            if validate && !is_zero(padding) {
                return bad_padding();
            }
            let bytes = left_pad(bytes);
            let constructor_pc = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
            let deployed_pc = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
            Ok(internal_function(ty, deployed_pc, constructor_pc, cx))
        }
        other => Err(DecodeFault::unsupported(format!("{} as a value type", other)).into()),
    }
}

/// An address of a contract; identified by class when enabled and its code
/// matches a known context.
pub(super) fn contract_value(address: &[u8], cx: &Context<'_>) -> Flow<ContractValue> {
    let checksummed = checksum_address(address);
    if !cx.info.options.identify_contracts {
        return Ok(ContractValue::Unknown {
            address: checksummed,
        });
    }
    let code = cx.reader.code(Address::from_slice(address))?;
    Ok(match cx.info.identify_code(code) {
        Some(context) => ContractValue::Known {
            address: checksummed,
            class: context.name.clone(),
        },
        None => ContractValue::Unknown {
            address: checksummed,
        },
    })
}

fn internal_function(
    ty: &Type,
    deployed_pc: u32,
    constructor_pc: u32,
    cx: &Context<'_>,
) -> DecodedResult {
    if deployed_pc == 0 && constructor_pc == 0 {
        return DecodedResult::value(
            ty.clone(),
            Value::FunctionInternal(InternalFunctionValue::Uninitialized),
        );
    }
    let invalid = |reason| {
        DecodedResult::error(
            ty.clone(),
            DecodingError::InvalidInternalFunctionPointer {
                deployed_pc,
                constructor_pc,
                reason,
            },
        )
    };
    let Some(context) = cx.info.current_context else {
        return invalid(InternalFunctionFault::MissingContext);
    };
    let pc = if cx.info.in_constructor {
        if constructor_pc == 0 {
            return invalid(InternalFunctionFault::DeployedFunctionInConstructor);
        }
        constructor_pc
    } else {
        deployed_pc
    };
    match context.internal_function(pc) {
        Some(entry) if entry.designated_invalid => DecodedResult::value(
            ty.clone(),
            Value::FunctionInternal(InternalFunctionValue::Exception {
                deployed_pc,
                constructor_pc,
            }),
        ),
        Some(entry) => DecodedResult::value(
            ty.clone(),
            Value::FunctionInternal(InternalFunctionValue::Function {
                name: entry.name.clone(),
                defining_contract: entry.defining_contract.clone(),
                deployed_pc,
                constructor_pc,
            }),
        ),
        None => invalid(InternalFunctionFault::NoSuchFunction),
    }
}
