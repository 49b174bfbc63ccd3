//! Solidity type descriptors.
//!
//! A [`Type`] describes *what* a run of bytes means; it never says *where* the
//! bytes are (that is the pointer's job). Reference types optionally carry a
//! [`DataLocation`] so that stack-held pointers can be interpreted.
//!
//! Structs, enums, user-defined value types and contracts are referenced by a
//! stable [`TypeId`] that resolves through [`UserDefinedTypes`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a user-defined type (typically the AST node id).
pub type TypeId = String;

/// Where a reference type's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLocation {
    Memory,
    Storage,
    Calldata,
}

/// The three magic variables exposed by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagicVariable {
    Msg,
    Block,
    Tx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionVisibility {
    External,
    Internal,
}

/// A type with an optional member/parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl NamedType {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    pub fn unnamed(ty: Type) -> Self {
        Self { name: None, ty }
    }
}

// =============================================================================
// Type
// =============================================================================

/// A Solidity type, tagged by type class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typeClass", rename_all = "camelCase")]
pub enum Type {
    Uint {
        bits: u16,
    },
    Int {
        bits: u16,
    },
    Bool,
    Fixed {
        bits: u16,
        places: u8,
    },
    Ufixed {
        bits: u16,
        places: u8,
    },
    /// A general address (not tied to a contract class).
    Address {
        #[serde(default)]
        payable: bool,
    },
    /// An address of a specific contract class.
    Contract {
        #[serde(default)]
        id: Option<TypeId>,
        name: String,
    },
    /// `bytesN` when `length` is set, dynamic `bytes` otherwise.
    Bytes {
        #[serde(default)]
        length: Option<u8>,
        #[serde(default)]
        location: Option<DataLocation>,
    },
    String {
        #[serde(default)]
        location: Option<DataLocation>,
    },
    /// `T[n]` when `length` is set, `T[]` otherwise.
    Array {
        base: Box<Type>,
        #[serde(default)]
        length: Option<u64>,
        #[serde(default)]
        location: Option<DataLocation>,
    },
    Mapping {
        key: Box<Type>,
        value: Box<Type>,
    },
    Struct {
        id: TypeId,
        name: String,
        #[serde(default)]
        location: Option<DataLocation>,
    },
    Enum {
        id: TypeId,
        name: String,
    },
    UserDefinedValueType {
        id: TypeId,
        name: String,
    },
    Tuple {
        members: Vec<NamedType>,
    },
    Function {
        visibility: FunctionVisibility,
        #[serde(default)]
        inputs: Vec<NamedType>,
        #[serde(default)]
        outputs: Vec<NamedType>,
    },
    Magic {
        variable: MagicVariable,
    },
    /// The type of a type, e.g. a contract name used as an expression.
    TypeOf {
        #[serde(rename = "type")]
        ty: Box<Type>,
    },
}

impl Type {
    pub fn uint(bits: u16) -> Self {
        Type::Uint { bits }
    }

    pub fn int(bits: u16) -> Self {
        Type::Int { bits }
    }

    pub fn address() -> Self {
        Type::Address { payable: false }
    }

    pub fn bytes_static(length: u8) -> Self {
        Type::Bytes {
            length: Some(length),
            location: None,
        }
    }

    pub fn bytes_dynamic() -> Self {
        Type::Bytes {
            length: None,
            location: None,
        }
    }

    pub fn string() -> Self {
        Type::String { location: None }
    }

    pub fn dynamic_array(base: Type) -> Self {
        Type::Array {
            base: Box::new(base),
            length: None,
            location: None,
        }
    }

    pub fn static_array(base: Type, length: u64) -> Self {
        Type::Array {
            base: Box::new(base),
            length: Some(length),
            location: None,
        }
    }

    pub fn mapping(key: Type, value: Type) -> Self {
        Type::Mapping {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn struct_type(id: impl Into<TypeId>, name: impl Into<String>) -> Self {
        Type::Struct {
            id: id.into(),
            name: name.into(),
            location: None,
        }
    }

    pub fn external_function() -> Self {
        Type::Function {
            visibility: FunctionVisibility::External,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn internal_function() -> Self {
        Type::Function {
            visibility: FunctionVisibility::Internal,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Whether values of this type are held by reference (have a data location).
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Bytes { length: None, .. }
                | Type::String { .. }
                | Type::Array { .. }
                | Type::Mapping { .. }
                | Type::Struct { .. }
                | Type::Tuple { .. }
        )
    }

    pub fn location(&self) -> Option<DataLocation> {
        match self {
            Type::Bytes { location, .. }
            | Type::String { location }
            | Type::Array { location, .. }
            | Type::Struct { location, .. } => *location,
            Type::Mapping { .. } => Some(DataLocation::Storage),
            _ => None,
        }
    }

    /// Return a copy of this type with its data location (and that of any
    /// array base) set to `location`. Value types are returned unchanged.
    pub fn specify_location(&self, location: DataLocation) -> Type {
        match self {
            Type::Bytes {
                length: None,
                location: _,
            } => Type::Bytes {
                length: None,
                location: Some(location),
            },
            Type::String { .. } => Type::String {
                location: Some(location),
            },
            Type::Array { base, length, .. } => Type::Array {
                base: Box::new(base.specify_location(location)),
                length: *length,
                location: Some(location),
            },
            Type::Struct { id, name, .. } => Type::Struct {
                id: id.clone(),
                name: name.clone(),
                location: Some(location),
            },
            other => other.clone(),
        }
    }

    /// ABI dynamicity: dynamic arrays, `bytes`, `string`, and anything that
    /// contains one of them.
    ///
    /// Unresolvable struct ids are reported as static; decoding them fails
    /// separately with an unresolved-type error.
    pub fn is_dynamic(&self, user_defined_types: &UserDefinedTypes) -> bool {
        match self {
            Type::Bytes { length, .. } => length.is_none(),
            Type::String { .. } | Type::Mapping { .. } => true,
            Type::Array { base, length, .. } => {
                length.is_none() || base.is_dynamic(user_defined_types)
            }
            Type::Struct { id, .. } => user_defined_types
                .struct_members(id)
                .map(|members| {
                    members
                        .iter()
                        .any(|m| m.ty.is_dynamic(user_defined_types))
                })
                .unwrap_or(false),
            Type::Tuple { members } => members
                .iter()
                .any(|m| m.ty.is_dynamic(user_defined_types)),
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Uint { bits } => write!(f, "uint{}", bits),
            Type::Int { bits } => write!(f, "int{}", bits),
            Type::Bool => write!(f, "bool"),
            Type::Fixed { bits, places } => write!(f, "fixed{}x{}", bits, places),
            Type::Ufixed { bits, places } => write!(f, "ufixed{}x{}", bits, places),
            Type::Address { payable: true } => write!(f, "address payable"),
            Type::Address { payable: false } => write!(f, "address"),
            Type::Contract { name, .. } => write!(f, "contract {}", name),
            Type::Bytes {
                length: Some(n), ..
            } => write!(f, "bytes{}", n),
            Type::Bytes { length: None, .. } => write!(f, "bytes"),
            Type::String { .. } => write!(f, "string"),
            Type::Array {
                base,
                length: Some(n),
                ..
            } => write!(f, "{}[{}]", base, n),
            Type::Array {
                base, length: None, ..
            } => write!(f, "{}[]", base),
            Type::Mapping { key, value } => write!(f, "mapping({} => {})", key, value),
            Type::Struct { name, .. } => write!(f, "struct {}", name),
            Type::Enum { name, .. } => write!(f, "enum {}", name),
            Type::UserDefinedValueType { name, .. } => write!(f, "{}", name),
            Type::Tuple { members } => {
                write!(f, "tuple(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", member.ty)?;
                }
                write!(f, ")")
            }
            Type::Function { visibility, .. } => match visibility {
                FunctionVisibility::External => write!(f, "function external"),
                FunctionVisibility::Internal => write!(f, "function internal"),
            },
            Type::Magic { variable } => match variable {
                MagicVariable::Msg => write!(f, "msg"),
                MagicVariable::Block => write!(f, "block"),
                MagicVariable::Tx => write!(f, "tx"),
            },
            Type::TypeOf { ty } => write!(f, "type({})", ty),
        }
    }
}

// =============================================================================
// User-Defined Types
// =============================================================================

/// Definition of a user-defined type, as supplied by the compiler metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typeClass", rename_all = "camelCase")]
pub enum UserDefinedType {
    Struct {
        name: String,
        members: Vec<NamedType>,
    },
    Enum {
        name: String,
        options: Vec<String>,
    },
    UserDefinedValueType {
        name: String,
        underlying: Type,
    },
    Contract {
        name: String,
    },
}

impl UserDefinedType {
    pub fn name(&self) -> &str {
        match self {
            UserDefinedType::Struct { name, .. }
            | UserDefinedType::Enum { name, .. }
            | UserDefinedType::UserDefinedValueType { name, .. }
            | UserDefinedType::Contract { name } => name,
        }
    }
}

/// Table of user-defined types keyed by [`TypeId`].
///
/// Built once from compiler metadata and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserDefinedTypes {
    types: HashMap<TypeId, UserDefinedType>,
}

impl UserDefinedTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<TypeId>, definition: UserDefinedType) {
        self.types.insert(id.into(), definition);
    }

    /// Builder-style insert, handy when assembling tables in tests.
    pub fn with(mut self, id: impl Into<TypeId>, definition: UserDefinedType) -> Self {
        self.insert(id, definition);
        self
    }

    pub fn get(&self, id: &str) -> Option<&UserDefinedType> {
        self.types.get(id)
    }

    pub fn struct_members(&self, id: &str) -> Option<&[NamedType]> {
        match self.types.get(id)? {
            UserDefinedType::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    pub fn enum_options(&self, id: &str) -> Option<&[String]> {
        match self.types.get(id)? {
            UserDefinedType::Enum { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn underlying(&self, id: &str) -> Option<&Type> {
        match self.types.get(id)? {
            UserDefinedType::UserDefinedValueType { underlying, .. } => Some(underlying),
            _ => None,
        }
    }

    /// Ids of every struct in the table, sorted for deterministic iteration.
    pub fn struct_ids(&self) -> Vec<&TypeId> {
        let mut ids: Vec<_> = self
            .types
            .iter()
            .filter(|(_, def)| matches!(def, UserDefinedType::Struct { .. }))
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
