//! ABI (call data / event data) layout.
//!
//! Head/tail encoding: every static member occupies its full static size in
//! the head; every dynamic member occupies one offset word in the head, with
//! its data in the tail. Offsets are relative to the start of the enclosing
//! tuple.

use super::AllocationError;
use crate::pointer::{AbiPointer, Pointer};
use evm_codec_types::conversion::{keccak, WORD_SIZE};
use evm_codec_types::{
    DataLocation, FunctionVisibility, NamedType, Type, TypeId, UserDefinedType, UserDefinedTypes, Word,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Function arguments start after the 4-byte selector.
pub const SELECTOR_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbiMemberAllocation {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
    /// Head position relative to the tuple start.
    pub offset: usize,
    /// Head length: the static size, or one word for dynamic members.
    pub length: usize,
}

/// Layout of a struct or tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbiAllocation {
    /// Total head length.
    pub length: usize,
    pub dynamic: bool,
    pub members: Vec<AbiMemberAllocation>,
}

// =============================================================================
// Allocation Table
// =============================================================================

/// ABI layouts of every encodable struct, keyed by struct id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct AbiAllocations {
    structs: HashMap<TypeId, AbiAllocation>,
}

impl AbiAllocations {
    /// Allocate every struct in `udts`. Structs containing mappings (or
    /// anything else with no ABI encoding) are logged and skipped.
    pub fn build(udts: &UserDefinedTypes) -> Self {
        let mut builder = Builder {
            udts,
            done: HashMap::new(),
            visiting: HashSet::new(),
        };
        for id in udts.struct_ids() {
            if let Err(e) = builder.allocate_struct(id) {
                tracing::debug!(struct_id = %id, error = %e, "allocate: struct has no ABI layout");
            }
        }
        tracing::debug!(structs = builder.done.len(), "allocate: ABI layouts built");
        Self {
            structs: builder.done,
        }
    }

    pub fn get(&self, id: &str) -> Option<&AbiAllocation> {
        self.structs.get(id)
    }

    /// Head size of `ty`.
    pub fn size_of(&self, ty: &Type, udts: &UserDefinedTypes) -> Result<usize, AllocationError> {
        abi_size_with(ty, udts, &mut |id| self.lookup(id))
    }

    /// Lay out an arbitrary tuple (function arguments, event data).
    pub fn allocate_tuple(
        &self,
        members: &[NamedType],
        udts: &UserDefinedTypes,
    ) -> Result<AbiAllocation, AllocationError> {
        tuple_with(members, udts, &mut |id| self.lookup(id))
    }

    fn lookup(&self, id: &TypeId) -> Result<(usize, bool), AllocationError> {
        self.structs
            .get(id)
            .map(|a| (a.length, a.dynamic))
            .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })
    }
}

/// Struct lookup returning `(head length, dynamic)`.
type StructLookup<'f> = dyn FnMut(&TypeId) -> Result<(usize, bool), AllocationError> + 'f;

fn is_dynamic_with(
    ty: &Type,
    udts: &UserDefinedTypes,
    lookup: &mut StructLookup<'_>,
) -> Result<bool, AllocationError> {
    Ok(match ty {
        Type::Bytes { length, .. } => length.is_none(),
        Type::String { .. } => true,
        Type::Array { base, length, .. } => {
            length.is_none() || is_dynamic_with(base, udts, lookup)?
        }
        Type::Struct { id, .. } => lookup(id)?.1,
        Type::Tuple { members } => {
            let mut dynamic = false;
            for member in members {
                dynamic |= is_dynamic_with(&member.ty, udts, lookup)?;
            }
            dynamic
        }
        Type::UserDefinedValueType { id, .. } => {
            let underlying = udts
                .underlying(id)
                .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })?;
            is_dynamic_with(underlying, udts, lookup)?
        }
        _ => false,
    })
}

fn abi_size_with(
    ty: &Type,
    udts: &UserDefinedTypes,
    lookup: &mut StructLookup<'_>,
) -> Result<usize, AllocationError> {
    if let Type::Mapping { .. }
    | Type::Magic { .. }
    | Type::TypeOf { .. }
    | Type::Function {
        visibility: FunctionVisibility::Internal,
        ..
    } = ty
    {
        return Err(AllocationError::NotAbiEncodable {
            ty: ty.to_string(),
        });
    }
    if is_dynamic_with(ty, udts, lookup)? {
        return Ok(WORD_SIZE);
    }
    let overflow = || AllocationError::Overflow {
        what: ty.to_string(),
    };
    Ok(match ty {
        Type::Array {
            base,
            length: Some(length),
            ..
        } => {
            let element = abi_size_with(base, udts, lookup)?;
            usize::try_from(*length)
                .ok()
                .and_then(|n| n.checked_mul(element))
                .ok_or_else(overflow)?
        }
        Type::Struct { id, .. } => lookup(id)?.0,
        Type::Tuple { members } => {
            let mut total: usize = 0;
            for member in members {
                total = total
                    .checked_add(abi_size_with(&member.ty, udts, lookup)?)
                    .ok_or_else(overflow)?;
            }
            total
        }
        _ => WORD_SIZE,
    })
}

fn tuple_with(
    members: &[NamedType],
    udts: &UserDefinedTypes,
    lookup: &mut StructLookup<'_>,
) -> Result<AbiAllocation, AllocationError> {
    let mut offset: usize = 0;
    let mut dynamic = false;
    let mut allocated = Vec::with_capacity(members.len());
    for member in members {
        let length = abi_size_with(&member.ty, udts, lookup)?;
        dynamic |= is_dynamic_with(&member.ty, udts, lookup)?;
        allocated.push(AbiMemberAllocation {
            name: member.name.clone(),
            ty: member.ty.clone(),
            offset,
            length,
        });
        offset = offset
            .checked_add(length)
            .ok_or_else(|| AllocationError::Overflow {
                what: "tuple".to_string(),
            })?;
    }
    Ok(AbiAllocation {
        length: offset,
        dynamic,
        members: allocated,
    })
}

struct Builder<'a> {
    udts: &'a UserDefinedTypes,
    done: HashMap<TypeId, AbiAllocation>,
    visiting: HashSet<TypeId>,
}

impl Builder<'_> {
    fn allocate_struct(&mut self, id: &TypeId) -> Result<(usize, bool), AllocationError> {
        if let Some(done) = self.done.get(id) {
            return Ok((done.length, done.dynamic));
        }
        if !self.visiting.insert(id.clone()) {
            return Err(AllocationError::RecursiveStruct { id: id.clone() });
        }
        let udts = self.udts;
        let result = match udts.struct_members(id) {
            Some(members) => tuple_with(members, udts, &mut |inner| self.allocate_struct(inner)),
            None => Err(AllocationError::UnknownType { id: id.clone() }),
        };
        self.visiting.remove(id);

        let allocation = result?;
        let summary = (allocation.length, allocation.dynamic);
        self.done.insert(id.clone(), allocation);
        Ok(summary)
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// Canonical ABI type string (`uint256`, `(address,bytes)[]`, ...).
pub fn abi_type_string(ty: &Type, udts: &UserDefinedTypes) -> Result<String, AllocationError> {
    Ok(match ty {
        Type::Uint { bits } => format!("uint{}", bits),
        Type::Int { bits } => format!("int{}", bits),
        Type::Bool => "bool".to_string(),
        Type::Fixed { bits, places } => format!("fixed{}x{}", bits, places),
        Type::Ufixed { bits, places } => format!("ufixed{}x{}", bits, places),
        Type::Address { .. } | Type::Contract { .. } => "address".to_string(),
        Type::Bytes {
            length: Some(n), ..
        } => format!("bytes{}", n),
        Type::Bytes { length: None, .. } => "bytes".to_string(),
        Type::String { .. } => "string".to_string(),
        Type::Array {
            base,
            length: Some(n),
            ..
        } => format!("{}[{}]", abi_type_string(base, udts)?, n),
        Type::Array {
            base, length: None, ..
        } => format!("{}[]", abi_type_string(base, udts)?),
        Type::Enum { .. } => "uint8".to_string(),
        Type::UserDefinedValueType { id, .. } => {
            let underlying = udts
                .underlying(id)
                .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })?;
            abi_type_string(underlying, udts)?
        }
        Type::Struct { id, .. } => match udts.get(id) {
            Some(UserDefinedType::Struct { members, .. }) => tuple_type_string(members, udts)?,
            _ => return Err(AllocationError::UnknownType { id: id.clone() }),
        },
        Type::Tuple { members } => tuple_type_string(members, udts)?,
        Type::Function {
            visibility: FunctionVisibility::External,
            ..
        } => "function".to_string(),
        _ => {
            return Err(AllocationError::NotAbiEncodable {
                ty: ty.to_string(),
            })
        }
    })
}

fn tuple_type_string(members: &[NamedType], udts: &UserDefinedTypes) -> Result<String, AllocationError> {
    let parts = members
        .iter()
        .map(|m| abi_type_string(&m.ty, udts))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(",")))
}

/// A function or event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParameter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub indexed: bool,
}

impl AbiParameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            indexed: false,
        }
    }

    pub fn indexed(name: impl Into<String>, ty: Type) -> Self {
        Self {
            indexed: true,
            ..Self::new(name, ty)
        }
    }

    fn named_type(&self) -> NamedType {
        NamedType {
            name: self.name.clone(),
            ty: self.ty.clone(),
        }
    }
}

fn signature(
    name: &str,
    inputs: &[AbiParameter],
    udts: &UserDefinedTypes,
) -> Result<String, AllocationError> {
    let types = inputs
        .iter()
        .map(|p| abi_type_string(&p.ty, udts))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{}({})", name, types.join(",")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAbi {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParameter>,
}

impl FunctionAbi {
    pub fn new(name: impl Into<String>, inputs: Vec<AbiParameter>) -> Self {
        Self {
            name: name.into(),
            inputs,
        }
    }

    pub fn signature(&self, udts: &UserDefinedTypes) -> Result<String, AllocationError> {
        signature(&self.name, &self.inputs, udts)
    }

    /// First four bytes of the keccak hash of the signature.
    pub fn selector(&self, udts: &UserDefinedTypes) -> Result<[u8; 4], AllocationError> {
        let hash = keccak(self.signature(udts)?.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash[..4]);
        Ok(selector)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAbi {
    pub name: String,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub inputs: Vec<AbiParameter>,
}

impl EventAbi {
    pub fn new(name: impl Into<String>, inputs: Vec<AbiParameter>) -> Self {
        Self {
            name: name.into(),
            anonymous: false,
            inputs,
        }
    }

    pub fn signature(&self, udts: &UserDefinedTypes) -> Result<String, AllocationError> {
        signature(&self.name, &self.inputs, udts)
    }

    /// The event's topic 0; `None` for anonymous events.
    pub fn topic0(&self, udts: &UserDefinedTypes) -> Result<Option<Word>, AllocationError> {
        if self.anonymous {
            return Ok(None);
        }
        Ok(Some(keccak(self.signature(udts)?.as_bytes())))
    }
}

// =============================================================================
// Argument Allocations
// =============================================================================

/// Where one argument of a call or event is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentAllocation {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
    pub pointer: Pointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionAllocation {
    pub name: String,
    pub selector: [u8; 4],
    pub arguments: Vec<ArgumentAllocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventAllocation {
    pub name: String,
    pub topic0: Option<Word>,
    pub arguments: Vec<ArgumentAllocation>,
}

impl AbiAllocations {
    /// Pointers to each argument in call data, after the selector.
    pub fn allocate_function(
        &self,
        function: &FunctionAbi,
        udts: &UserDefinedTypes,
    ) -> Result<FunctionAllocation, AllocationError> {
        let members: Vec<NamedType> = function.inputs.iter().map(AbiParameter::named_type).collect();
        let tuple = self.allocate_tuple(&members, udts)?;
        let arguments = tuple
            .members
            .into_iter()
            .map(|m| ArgumentAllocation {
                pointer: Pointer::Calldata(AbiPointer::new(
                    SELECTOR_LENGTH + m.offset,
                    m.length,
                    SELECTOR_LENGTH,
                )),
                name: m.name,
                ty: m.ty.specify_location(DataLocation::Calldata),
            })
            .collect();
        Ok(FunctionAllocation {
            name: function.name.clone(),
            selector: function.selector(udts)?,
            arguments,
        })
    }

    /// Pointers to each event argument: indexed parameters to topics (from
    /// topic 1, or topic 0 when anonymous), the rest into event data.
    pub fn allocate_event(
        &self,
        event: &EventAbi,
        udts: &UserDefinedTypes,
    ) -> Result<EventAllocation, AllocationError> {
        let data_members: Vec<NamedType> = event
            .inputs
            .iter()
            .filter(|p| !p.indexed)
            .map(AbiParameter::named_type)
            .collect();
        let tuple = self.allocate_tuple(&data_members, udts)?;
        let mut data = tuple.members.into_iter();

        let mut topic = if event.anonymous { 0 } else { 1 };
        let mut arguments = Vec::with_capacity(event.inputs.len());
        for input in &event.inputs {
            let pointer = if input.indexed {
                let pointer = Pointer::Eventtopic { index: topic };
                topic += 1;
                pointer
            } else {
                let member = data.next().ok_or_else(|| AllocationError::Overflow {
                    what: format!("event {}", event.name),
                })?;
                Pointer::Eventdata(AbiPointer::new(member.offset, member.length, 0))
            };
            arguments.push(ArgumentAllocation {
                name: input.name.clone(),
                ty: input.ty.clone(),
                pointer,
            });
        }
        Ok(EventAllocation {
            name: event.name.clone(),
            topic0: event.topic0(udts)?,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evm_codec_types::conversion::to_hex;

    fn udts() -> UserDefinedTypes {
        UserDefinedTypes::new()
            .with(
                "point",
                UserDefinedType::Struct {
                    name: "Point".to_string(),
                    members: vec![
                        NamedType::new("x", Type::uint(256)),
                        NamedType::new("y", Type::uint(256)),
                    ],
                },
            )
            .with(
                "named",
                UserDefinedType::Struct {
                    name: "Named".to_string(),
                    members: vec![
                        NamedType::new("id", Type::uint(8)),
                        NamedType::new("label", Type::string()),
                        NamedType::new("at", Type::struct_type("point", "Point")),
                    ],
                },
            )
            .with(
                "withMapping",
                UserDefinedType::Struct {
                    name: "WithMapping".to_string(),
                    members: vec![NamedType::new(
                        "balances",
                        Type::mapping(Type::address(), Type::uint(256)),
                    )],
                },
            )
    }

    #[test]
    fn test_static_and_dynamic_struct_layouts() {
        let udts = udts();
        let table = AbiAllocations::build(&udts);

        let point = table.get("point").unwrap();
        assert_eq!(point.length, 64);
        assert!(!point.dynamic);

        let named = table.get("named").unwrap();
        assert!(named.dynamic);
        let offsets: Vec<_> = named.members.iter().map(|m| (m.offset, m.length)).collect();
        // id, offset word for label, then the inline static Point.
        assert_eq!(offsets, vec![(0, 32), (32, 32), (64, 64)]);
        assert_eq!(named.length, 128);

        assert!(table.get("withMapping").is_none());
    }

    #[test]
    fn test_static_array_of_structs_size() {
        let udts = udts();
        let table = AbiAllocations::build(&udts);
        assert_eq!(
            table
                .size_of(&Type::static_array(Type::struct_type("point", "Point"), 3), &udts)
                .unwrap(),
            192
        );
        assert_eq!(
            table
                .size_of(&Type::static_array(Type::string(), 3), &udts)
                .unwrap(),
            32
        );
        assert_eq!(table.size_of(&Type::Tuple { members: vec![] }, &udts).unwrap(), 0);
    }

    #[test]
    fn test_selector_and_signature() {
        let udts = UserDefinedTypes::new();
        let transfer = FunctionAbi::new(
            "transfer",
            vec![
                AbiParameter::new("to", Type::address()),
                AbiParameter::new("amount", Type::uint(256)),
            ],
        );
        assert_eq!(transfer.signature(&udts).unwrap(), "transfer(address,uint256)");
        assert_eq!(to_hex(&transfer.selector(&udts).unwrap()), "0xa9059cbb");
    }

    #[test]
    fn test_struct_signature_uses_tuple_syntax() {
        let udts = udts();
        let f = FunctionAbi::new(
            "f",
            vec![AbiParameter::new(
                "items",
                Type::dynamic_array(Type::struct_type("named", "Named")),
            )],
        );
        assert_eq!(
            f.signature(&udts).unwrap(),
            "f((uint8,string,(uint256,uint256))[])"
        );
    }

    #[test]
    fn test_function_arguments_start_after_selector() {
        let udts = udts();
        let table = AbiAllocations::build(&udts);
        let f = FunctionAbi::new(
            "f",
            vec![
                AbiParameter::new("a", Type::uint(256)),
                AbiParameter::new("s", Type::string()),
                AbiParameter::new("p", Type::struct_type("point", "Point")),
            ],
        );
        let allocation = table.allocate_function(&f, &udts).unwrap();
        let pointers: Vec<_> = allocation.arguments.iter().map(|a| a.pointer.clone()).collect();
        assert_eq!(
            pointers,
            vec![
                Pointer::Calldata(AbiPointer::new(4, 32, 4)),
                Pointer::Calldata(AbiPointer::new(36, 32, 4)),
                Pointer::Calldata(AbiPointer::new(68, 64, 4)),
            ]
        );
    }

    #[test]
    fn test_event_splits_indexed_parameters() {
        let udts = UserDefinedTypes::new();
        let table = AbiAllocations::default();
        let transfer = EventAbi::new(
            "Transfer",
            vec![
                AbiParameter::indexed("from", Type::address()),
                AbiParameter::indexed("to", Type::address()),
                AbiParameter::new("value", Type::uint(256)),
            ],
        );
        let allocation = table.allocate_event(&transfer, &udts).unwrap();
        assert_eq!(
            allocation.topic0.map(|t| to_hex(t.as_slice())),
            Some("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string())
        );
        assert_eq!(allocation.arguments[0].pointer, Pointer::Eventtopic { index: 1 });
        assert_eq!(allocation.arguments[1].pointer, Pointer::Eventtopic { index: 2 });
        assert_eq!(
            allocation.arguments[2].pointer,
            Pointer::Eventdata(AbiPointer::new(0, 32, 0))
        );

        let anonymous = EventAbi {
            anonymous: true,
            ..transfer
        };
        let allocation = table.allocate_event(&anonymous, &udts).unwrap();
        assert_eq!(allocation.topic0, None);
        assert_eq!(allocation.arguments[0].pointer, Pointer::Eventtopic { index: 0 });
    }
}
