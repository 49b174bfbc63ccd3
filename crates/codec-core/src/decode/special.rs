//! Constants and the magic variables `msg`, `tx` and `block`.

use super::elementary::interpret;
use super::read::Flow;
use super::Context;
use crate::errors::DecodeFault;
use crate::pointer::ConstantExpression;
use alloy_primitives::{Address, U256};
use evm_codec_types::conversion::{
    checksum_address, left_pad, negate, right_pad, word_from_u256, WORD_SIZE,
};
use evm_codec_types::{
    DecodedResult, MagicVariable, NamedResult, StringValue, Type, Value,
};

/// Decode a literal from a constant's definition. Literals are never
/// padding-checked.
pub(super) fn decode_constant(
    ty: &Type,
    expression: &ConstantExpression,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let raw = match expression {
        ConstantExpression::Number { value, negative } => {
            let word = if *negative { negate(*value) } else { *value };
            let word = word_from_u256(word);
            match ty {
                Type::Bytes {
                    length: Some(n), ..
                } => right_pad(&word[WORD_SIZE - (*n as usize).min(WORD_SIZE)..]),
                _ => word,
            }
        }
        ConstantExpression::Hex { bytes } => match ty {
            Type::Bytes { length: None, .. } => {
                return Ok(DecodedResult::value(ty.clone(), Value::Bytes(bytes.clone())))
            }
            Type::String { .. } => {
                return Ok(DecodedResult::value(
                    ty.clone(),
                    Value::String(StringValue::from_bytes(bytes.clone())),
                ))
            }
            Type::Bytes { .. } => right_pad(bytes),
            _ => left_pad(bytes),
        },
        ConstantExpression::Str { value } => match ty {
            Type::String { .. } => {
                return Ok(DecodedResult::value(
                    ty.clone(),
                    Value::String(StringValue::Valid {
                        value: value.clone(),
                    }),
                ))
            }
            Type::Bytes { length: None, .. } => {
                return Ok(DecodedResult::value(
                    ty.clone(),
                    Value::Bytes(value.as_bytes().to_vec()),
                ))
            }
            Type::Bytes { .. } => right_pad(value.as_bytes()),
            other => {
                return Err(
                    DecodeFault::unsupported(format!("string literal as {}", other)).into(),
                )
            }
        },
        ConstantExpression::Bool { value } => left_pad(&[*value as u8]),
    };
    interpret(ty, raw.as_slice(), false, cx)
}

/// Decode a magic variable from the snapshot's special values. Fields the
/// snapshot lacks are left out.
pub(super) fn decode_magic(
    ty: &Type,
    variable: MagicVariable,
    cx: &Context<'_>,
) -> Flow<DecodedResult> {
    let specials = &cx.info.state.specials;
    let mut members = Vec::new();

    match variable {
        MagicVariable::Msg => {
            push_address(&mut members, "sender", specials.msg_sender);
            push_uint(&mut members, "value", specials.msg_value);
            if let Some(calldata) = &cx.info.state.calldata {
                let mut sig = calldata.iter().take(4).copied().collect::<Vec<u8>>();
                sig.resize(4, 0);
                members.push(member(
                    "data",
                    Type::bytes_dynamic(),
                    Value::Bytes(calldata.clone()),
                ));
                members.push(member("sig", Type::bytes_static(4), Value::Bytes(sig)));
            }
        }
        MagicVariable::Tx => {
            push_address(&mut members, "origin", specials.tx_origin);
            push_uint(&mut members, "gasprice", specials.tx_gasprice);
        }
        MagicVariable::Block => {
            push_address(&mut members, "coinbase", specials.block_coinbase);
            push_uint(&mut members, "difficulty", specials.block_difficulty);
            push_uint(&mut members, "gaslimit", specials.block_gaslimit);
            push_uint(&mut members, "number", specials.block_number);
            push_uint(&mut members, "timestamp", specials.block_timestamp);
            push_uint(&mut members, "chainid", specials.block_chainid);
            push_uint(&mut members, "basefee", specials.block_basefee);
        }
    }

    tracing::trace!(variable = ?variable, fields = members.len(), "decode: magic variable");
    Ok(DecodedResult::value(ty.clone(), Value::Magic(members)))
}

fn member(name: &str, ty: Type, value: Value) -> NamedResult {
    NamedResult::new(Some(name.to_string()), DecodedResult::value(ty, value))
}

fn push_address(members: &mut Vec<NamedResult>, name: &str, address: Option<Address>) {
    if let Some(address) = address {
        members.push(member(
            name,
            Type::Address { payable: true },
            Value::Address(checksum_address(address.as_slice())),
        ));
    }
}

fn push_uint(members: &mut Vec<NamedResult>, name: &str, value: Option<U256>) {
    if let Some(value) = value {
        members.push(member(name, Type::uint(256), Value::Uint(value)));
    }
}
