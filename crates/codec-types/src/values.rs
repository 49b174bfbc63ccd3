//! Decoded values and decoding errors.
//!
//! Every decode produces a [`DecodedResult`]: either a value or an error, each
//! tagged with the [`Type`] it was decoded as. Errors describe malformed or
//! unexpected on-chain data and are ordinary results; a struct with one bad
//! member still decodes the rest.
//!
//! Serialised shape:
//!
//! ```text
//! { "type": {...}, "kind": "value", "value": {...} }
//! { "type": {...}, "kind": "error", "error": { "kind": "badPadding", ... } }
//! ```

use crate::conversion::{format_fixed, serde_hex, to_hex};
use crate::types::{Type, TypeId};
use alloy_primitives::{I256, U256};
use serde::{Serialize, Serializer};
use std::fmt;

fn serialize_display<T: fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

// =============================================================================
// Result
// =============================================================================

/// The outcome of decoding one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecodedResult {
    Value {
        #[serde(rename = "type")]
        ty: Type,
        value: Value,
    },
    Error {
        #[serde(rename = "type")]
        ty: Type,
        error: DecodingError,
    },
}

impl DecodedResult {
    pub fn value(ty: Type, value: Value) -> Self {
        DecodedResult::Value { ty, value }
    }

    pub fn error(ty: Type, error: DecodingError) -> Self {
        DecodedResult::Error { ty, error }
    }

    pub fn ty(&self) -> &Type {
        match self {
            DecodedResult::Value { ty, .. } | DecodedResult::Error { ty, .. } => ty,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DecodedResult::Error { .. })
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DecodedResult::Value { value, .. } => Some(value),
            DecodedResult::Error { .. } => None,
        }
    }

    pub fn as_error(&self) -> Option<&DecodingError> {
        match self {
            DecodedResult::Error { error, .. } => Some(error),
            DecodedResult::Value { .. } => None,
        }
    }

    /// Look up a struct/tuple/magic member by name.
    pub fn member(&self, name: &str) -> Option<&DecodedResult> {
        match self.as_value()? {
            Value::Struct(members) | Value::Tuple(members) | Value::Magic(members) => members
                .iter()
                .find(|m| m.name.as_deref() == Some(name))
                .map(|m| &m.value),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedResult::Value { value, .. } => write!(f, "{}", value),
            DecodedResult::Error { error, .. } => write!(f, "<decoding error: {}>", error),
        }
    }
}

/// A struct, tuple or magic member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedResult {
    pub name: Option<String>,
    pub value: DecodedResult,
}

impl NamedResult {
    pub fn new(name: Option<String>, value: DecodedResult) -> Self {
        Self { name, value }
    }
}

/// One known mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingEntry {
    pub key: DecodedResult,
    pub value: DecodedResult,
}

// =============================================================================
// Value
// =============================================================================

/// A successfully decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class", content = "data", rename_all = "camelCase")]
pub enum Value {
    Uint(U256),
    Int(#[serde(serialize_with = "serialize_display")] I256),
    Bool(bool),
    Fixed(FixedPoint),
    Ufixed(FixedPoint),
    /// EIP-55 checksummed address.
    Address(String),
    Contract(ContractValue),
    Bytes(#[serde(with = "serde_hex")] Vec<u8>),
    String(StringValue),
    Enum {
        name: String,
        numeric: U256,
    },
    UserDefinedValueType(Box<DecodedResult>),
    Array(Vec<DecodedResult>),
    /// Entries for the keys known at decode time; never claimed complete.
    Mapping(Vec<MappingEntry>),
    Struct(Vec<NamedResult>),
    Tuple(Vec<NamedResult>),
    FunctionExternal {
        contract: ContractValue,
        #[serde(with = "serde_hex")]
        selector: Vec<u8>,
    },
    FunctionInternal(InternalFunctionValue),
    Magic(Vec<NamedResult>),
    /// A type used as a value (`type(C)`, a contract name in an expression).
    Type(Type),
}

/// A fixed-point number: `magnitude / 10^places`, with a sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPoint {
    pub negative: bool,
    pub magnitude: U256,
    pub places: u8,
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_fixed(self.negative, self.magnitude, self.places))
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A decoded string. Invalid UTF-8 is kept as raw bytes rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StringValue {
    Valid {
        value: String,
    },
    Malformed {
        #[serde(with = "serde_hex")]
        raw: Vec<u8>,
    },
}

impl StringValue {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(value) => StringValue::Valid { value },
            Err(err) => StringValue::Malformed {
                raw: err.into_bytes(),
            },
        }
    }
}

/// An address of a contract, identified by class when its code is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContractValue {
    Known { address: String, class: String },
    Unknown { address: String },
}

impl ContractValue {
    pub fn address(&self) -> &str {
        match self {
            ContractValue::Known { address, .. } | ContractValue::Unknown { address } => address,
        }
    }
}

/// A decoded internal function pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InternalFunctionValue {
    Function {
        name: String,
        defining_contract: Option<String>,
        deployed_pc: u32,
        constructor_pc: u32,
    },
    /// A pointer to the compiler's designated invalid function.
    Exception { deployed_pc: u32, constructor_pc: u32 },
    /// An all-zero pointer.
    Uninitialized,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Fixed(v) | Value::Ufixed(v) => write!(f, "{}", v),
            Value::Address(a) => write!(f, "{}", a),
            Value::Contract(c) => write_contract(f, c),
            Value::Bytes(b) => write!(f, "{}", to_hex(b)),
            Value::String(StringValue::Valid { value }) => write!(f, "{:?}", value),
            Value::String(StringValue::Malformed { raw }) => {
                write!(f, "<malformed string {}>", to_hex(raw))
            }
            Value::Enum { name, .. } => write!(f, "{}", name),
            Value::UserDefinedValueType(inner) => write!(f, "{}", inner),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Mapping(entries) => {
                write!(f, "{{")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} => {}", entry.key, entry.value)?;
                }
                write!(f, "}}")
            }
            Value::Struct(members) | Value::Tuple(members) | Value::Magic(members) => {
                write!(f, "{{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &member.name {
                        Some(name) => write!(f, "{}: {}", name, member.value)?,
                        None => write!(f, "{}", member.value)?,
                    }
                }
                write!(f, "}}")
            }
            Value::FunctionExternal { contract, selector } => {
                write_contract(f, contract)?;
                write!(f, ".{}", to_hex(selector))
            }
            Value::FunctionInternal(InternalFunctionValue::Function {
                name,
                defining_contract,
                ..
            }) => match defining_contract {
                Some(contract) => write!(f, "{}.{}", contract, name),
                None => write!(f, "{}", name),
            },
            Value::FunctionInternal(InternalFunctionValue::Exception { .. }) => {
                write!(f, "assert(false)")
            }
            Value::FunctionInternal(InternalFunctionValue::Uninitialized) => {
                write!(f, "<uninitialized function>")
            }
            Value::Type(ty) => write!(f, "type({})", ty),
        }
    }
}

fn write_contract(f: &mut fmt::Formatter<'_>, contract: &ContractValue) -> fmt::Result {
    match contract {
        ContractValue::Known { address, class } => write!(f, "{}({})", class, address),
        ContractValue::Unknown { address } => write!(f, "{}", address),
    }
}

// =============================================================================
// Decoding Errors
// =============================================================================

/// Why an internal function pointer could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InternalFunctionFault {
    /// The pc does not start any known internal function.
    NoSuchFunction,
    /// Constructor code referenced a function that only exists in deployed code.
    DeployedFunctionInConstructor,
    /// No contract context was available to resolve the pointer.
    MissingContext,
}

/// A malformed-data condition, returned in place of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecodingError {
    /// Bits outside the type's width were not zero (or not a sign extension).
    BadPadding {
        #[serde(with = "serde_hex")]
        raw: Vec<u8>,
    },
    /// A boolean byte other than 0 or 1.
    BoolOutOfRange { raw: U256 },
    /// An enum ordinal at or beyond the declared number of options.
    EnumOrdinalOutOfRange { raw: U256 },
    /// A struct/enum/value-type id with no definition.
    UnresolvedUserDefinedType { id: TypeId },
    InvalidInternalFunctionPointer {
        deployed_pc: u32,
        constructor_pc: u32,
        reason: InternalFunctionFault,
    },
    /// Non-zero padding around a stack-held external function. Stack padding
    /// is only validated under strict padding, so no other mode produces this.
    StackFunctionPaddingError {
        #[serde(with = "serde_hex")]
        raw_address: Vec<u8>,
        #[serde(with = "serde_hex")]
        raw_selector: Vec<u8>,
    },
    /// A reference type in an event topic; only its hash is recorded.
    IndexedReferenceType {
        #[serde(with = "serde_hex")]
        raw: Vec<u8>,
    },
    /// A collection length beyond the configured decoding limit.
    OverlongCollection { length: U256 },
    /// A pointer or offset too large to address.
    PointerTooLarge { pointer: U256 },
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodingError::BadPadding { raw } => write!(f, "bad padding in {}", to_hex(raw)),
            DecodingError::BoolOutOfRange { raw } => write!(f, "boolean out of range: {}", raw),
            DecodingError::EnumOrdinalOutOfRange { raw } => {
                write!(f, "enum ordinal out of range: {}", raw)
            }
            DecodingError::UnresolvedUserDefinedType { id } => {
                write!(f, "unresolved user-defined type {}", id)
            }
            DecodingError::InvalidInternalFunctionPointer {
                deployed_pc,
                constructor_pc,
                reason,
            } => write!(
                f,
                "invalid internal function pointer (deployed pc {}, constructor pc {}): {:?}",
                deployed_pc, constructor_pc, reason
            ),
            DecodingError::StackFunctionPaddingError {
                raw_address,
                raw_selector,
            } => write!(
                f,
                "bad padding in stack external function (address {}, selector {})",
                to_hex(raw_address),
                to_hex(raw_selector)
            ),
            DecodingError::IndexedReferenceType { raw } => {
                write!(f, "indexed reference type, topic hash {}", to_hex(raw))
            }
            DecodingError::OverlongCollection { length } => {
                write!(f, "collection too long to decode: {}", length)
            }
            DecodingError::PointerTooLarge { pointer } => {
                write!(f, "pointer too large: {}", pointer)
            }
        }
    }
}

impl std::error::Error for DecodingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_value_from_bytes() {
        assert_eq!(
            StringValue::from_bytes(b"hi".to_vec()),
            StringValue::Valid {
                value: "hi".to_string()
            }
        );
        assert_eq!(
            StringValue::from_bytes(vec![0xff, 0xfe]),
            StringValue::Malformed {
                raw: vec![0xff, 0xfe]
            }
        );
    }

    #[test]
    fn test_display_nested_struct_with_error_member() {
        let result = DecodedResult::value(
            Type::struct_type("1", "S"),
            Value::Struct(vec![
                NamedResult::new(
                    Some("a".to_string()),
                    DecodedResult::value(Type::uint(8), Value::Uint(U256::from(7u64))),
                ),
                NamedResult::new(
                    Some("b".to_string()),
                    DecodedResult::error(
                        Type::Bool,
                        DecodingError::BoolOutOfRange {
                            raw: U256::from(2u64),
                        },
                    ),
                ),
            ]),
        );
        assert_eq!(
            result.to_string(),
            "{a: 7, b: <decoding error: boolean out of range: 2>}"
        );
        assert!(result.member("b").map(|b| b.is_error()).unwrap_or(false));
    }

    #[test]
    fn test_error_result_json_shape() {
        let result = DecodedResult::error(
            Type::uint(8),
            DecodingError::BadPadding {
                raw: vec![0x01, 0x02],
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["type"]["typeClass"], "uint");
        assert_eq!(json["error"]["kind"], "badPadding");
        assert_eq!(json["error"]["raw"], "0x0102");
    }

    #[test]
    fn test_value_json_shape() {
        let result = DecodedResult::value(Type::Bool, Value::Bool(true));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "value");
        assert_eq!(json["value"]["class"], "bool");
        assert_eq!(json["value"]["data"], true);
    }
}
