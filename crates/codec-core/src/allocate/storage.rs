//! Storage layout.
//!
//! Follows solc's packing rules. A running `(slot, offset)` cursor walks the
//! members in declaration order:
//!
//! - values narrower than a word pack from the low-order end of a slot, moving
//!   to the next slot when they no longer fit;
//! - anything measured in whole slots (structs, static arrays, and the
//!   one-slot headers of dynamic arrays, `bytes`, `string` and mappings) starts
//!   a fresh slot, and so does whatever follows it.

use super::AllocationError;
use crate::pointer::{ConstantExpression, Pointer, Slot};
use alloy_primitives::U256;
use evm_codec_types::conversion::{u256_to_usize, WORD_SIZE};
use evm_codec_types::{FunctionVisibility, NamedType, Type, TypeId, UserDefinedTypes};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Storage footprint of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "unit", content = "count", rename_all = "camelCase")]
pub enum StorageLength {
    /// Packs into part of a slot (1..=32 bytes).
    Bytes(u8),
    /// Occupies whole slots, starting fresh.
    Slots(U256),
}

impl StorageLength {
    /// Footprint in bytes, saturating at `usize::MAX`.
    pub fn byte_length(&self) -> usize {
        match self {
            StorageLength::Bytes(n) => *n as usize,
            StorageLength::Slots(slots) => {
                let bytes = slots.saturating_mul(U256::from(WORD_SIZE as u64));
                u256_to_usize(bytes).unwrap_or(usize::MAX)
            }
        }
    }
}

/// Position of a member relative to the start of its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoragePosition {
    pub slot: U256,
    /// Bytes from the low-order end of the slot.
    pub offset: u8,
    pub length: StorageLength,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageMemberAllocation {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
    pub position: StoragePosition,
}

/// Layout of a struct (or any member list) in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageAllocation {
    /// Always [`StorageLength::Slots`].
    pub size: StorageLength,
    pub members: Vec<StorageMemberAllocation>,
}

// =============================================================================
// Sizes
// =============================================================================

/// Footprint of `ty`, using `struct_size` to size structs.
fn storage_size_with(
    ty: &Type,
    udts: &UserDefinedTypes,
    struct_size: &mut dyn FnMut(&TypeId) -> Result<StorageLength, AllocationError>,
) -> Result<StorageLength, AllocationError> {
    let bytes = |bits: u16| StorageLength::Bytes(bits.div_ceil(8).clamp(1, 32) as u8);
    Ok(match ty {
        Type::Uint { bits } | Type::Int { bits } => bytes(*bits),
        Type::Fixed { bits, .. } | Type::Ufixed { bits, .. } => bytes(*bits),
        Type::Bool => StorageLength::Bytes(1),
        Type::Address { .. } | Type::Contract { .. } => StorageLength::Bytes(20),
        Type::Bytes {
            length: Some(n), ..
        } => StorageLength::Bytes((*n).clamp(1, 32)),
        Type::Function { visibility, .. } => match visibility {
            FunctionVisibility::External => StorageLength::Bytes(24),
            FunctionVisibility::Internal => StorageLength::Bytes(8),
        },
        Type::Enum { id, .. } => {
            let options = udts
                .enum_options(id)
                .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })?;
            StorageLength::Bytes(enum_byte_width(options.len()))
        }
        Type::UserDefinedValueType { id, .. } => {
            let underlying = udts
                .underlying(id)
                .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })?;
            storage_size_with(underlying, udts, struct_size)?
        }
        Type::Bytes { length: None, .. } | Type::String { .. } | Type::Mapping { .. } => {
            StorageLength::Slots(U256::from(1u64))
        }
        Type::Array {
            length: None, ..
        } => StorageLength::Slots(U256::from(1u64)),
        Type::Array {
            base,
            length: Some(length),
            ..
        } => {
            let length = U256::from(*length);
            let slots = match storage_size_with(base, udts, struct_size)? {
                StorageLength::Bytes(size) => {
                    let per_slot = U256::from((WORD_SIZE / size as usize) as u64);
                    (length + per_slot - U256::from(1u64)) / per_slot
                }
                StorageLength::Slots(slots) => {
                    length
                        .checked_mul(slots)
                        .ok_or_else(|| AllocationError::Overflow {
                            what: ty.to_string(),
                        })?
                }
            };
            StorageLength::Slots(slots)
        }
        Type::Struct { id, .. } => struct_size(id)?,
        Type::Tuple { .. } | Type::Magic { .. } | Type::TypeOf { .. } => {
            return Err(AllocationError::NotStorable {
                ty: ty.to_string(),
            })
        }
    })
}

/// Bytes needed to hold an ordinal below `options`.
pub fn enum_byte_width(options: usize) -> u8 {
    let mut width = 1u8;
    let mut capacity: u128 = 256;
    while (options as u128) > capacity && width < 32 {
        width += 1;
        capacity = capacity.saturating_mul(256);
    }
    width
}

/// Lay out `members` with a fresh cursor.
fn layout_with(
    members: &[NamedType],
    size_of: &mut dyn FnMut(&Type) -> Result<StorageLength, AllocationError>,
) -> Result<StorageAllocation, AllocationError> {
    let mut slot = U256::ZERO;
    let mut offset: usize = 0;
    let mut allocated = Vec::with_capacity(members.len());

    let next_slot = |slot: U256| {
        slot.checked_add(U256::from(1u64))
            .ok_or_else(|| AllocationError::Overflow {
                what: "storage layout".to_string(),
            })
    };

    for member in members {
        let length = size_of(&member.ty)?;
        let position = match length {
            StorageLength::Bytes(size) => {
                let size = size as usize;
                if offset + size > WORD_SIZE {
                    slot = next_slot(slot)?;
                    offset = 0;
                }
                let position = StoragePosition {
                    slot,
                    offset: offset as u8,
                    length,
                };
                offset += size;
                position
            }
            StorageLength::Slots(slots) => {
                if offset > 0 {
                    slot = next_slot(slot)?;
                    offset = 0;
                }
                let position = StoragePosition {
                    slot,
                    offset: 0,
                    length,
                };
                slot = slot
                    .checked_add(slots)
                    .ok_or_else(|| AllocationError::Overflow {
                        what: "storage layout".to_string(),
                    })?;
                position
            }
        };
        allocated.push(StorageMemberAllocation {
            name: member.name.clone(),
            ty: member.ty.clone(),
            position,
        });
    }

    let size = if offset > 0 { next_slot(slot)? } else { slot };
    Ok(StorageAllocation {
        size: StorageLength::Slots(size),
        members: allocated,
    })
}

// =============================================================================
// Allocation Table
// =============================================================================

/// Storage layouts of every struct, keyed by struct id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StorageAllocations {
    structs: HashMap<TypeId, StorageAllocation>,
}

impl StorageAllocations {
    /// Allocate every struct in `udts`. Structs that cannot be laid out
    /// (unknown member types, recursion without indirection) are logged and
    /// left out of the table.
    pub fn build(udts: &UserDefinedTypes) -> Self {
        let mut builder = Builder {
            udts,
            done: HashMap::new(),
            visiting: HashSet::new(),
        };
        for id in udts.struct_ids() {
            if let Err(e) = builder.allocate_struct(id) {
                tracing::warn!(struct_id = %id, error = %e, "allocate: skipping struct in storage");
            }
        }
        tracing::debug!(structs = builder.done.len(), "allocate: storage layouts built");
        Self {
            structs: builder.done,
        }
    }

    pub fn get(&self, id: &str) -> Option<&StorageAllocation> {
        self.structs.get(id)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Footprint of `ty`, with struct sizes taken from this table.
    pub fn size_of(
        &self,
        ty: &Type,
        udts: &UserDefinedTypes,
    ) -> Result<StorageLength, AllocationError> {
        storage_size_with(ty, udts, &mut |id| {
            self.structs
                .get(id)
                .map(|a| a.size)
                .ok_or_else(|| AllocationError::UnknownType { id: id.clone() })
        })
    }

    /// Lay out an arbitrary member list (a contract's state variables).
    pub fn layout(
        &self,
        members: &[NamedType],
        udts: &UserDefinedTypes,
    ) -> Result<StorageAllocation, AllocationError> {
        layout_with(members, &mut |ty| self.size_of(ty, udts))
    }
}

struct Builder<'a> {
    udts: &'a UserDefinedTypes,
    done: HashMap<TypeId, StorageAllocation>,
    visiting: HashSet<TypeId>,
}

impl Builder<'_> {
    fn allocate_struct(&mut self, id: &TypeId) -> Result<StorageLength, AllocationError> {
        if let Some(done) = self.done.get(id) {
            return Ok(done.size);
        }
        if !self.visiting.insert(id.clone()) {
            return Err(AllocationError::RecursiveStruct { id: id.clone() });
        }
        let udts = self.udts;
        let result = match udts.struct_members(id) {
            Some(members) => layout_with(members, &mut |ty| {
                storage_size_with(ty, udts, &mut |inner| self.allocate_struct(inner))
            }),
            None => Err(AllocationError::UnknownType { id: id.clone() }),
        };
        self.visiting.remove(id);

        let allocation = result?;
        let size = allocation.size;
        tracing::trace!(struct_id = %id, size = ?size, "allocate: struct storage layout");
        self.done.insert(id.clone(), allocation);
        Ok(size)
    }
}

// =============================================================================
// State Variables
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    #[default]
    Mutable,
    Constant,
    Immutable,
}

/// A declared state variable, in declaration order (inherited first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub mutability: Mutability,
    /// Literal value of a constant.
    #[serde(default)]
    pub value: Option<ConstantExpression>,
    /// Byte offset of an immutable in the deployed code.
    #[serde(default)]
    pub code_offset: Option<usize>,
    /// Contract that declared the variable, when inherited.
    #[serde(default)]
    pub defining_contract: Option<String>,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            mutability: Mutability::Mutable,
            value: None,
            code_offset: None,
            defining_contract: None,
        }
    }

    pub fn constant(name: impl Into<String>, ty: Type, value: ConstantExpression) -> Self {
        Self {
            mutability: Mutability::Constant,
            value: Some(value),
            ..Self::new(name, ty)
        }
    }

    pub fn immutable(name: impl Into<String>, ty: Type, code_offset: usize) -> Self {
        Self {
            mutability: Mutability::Immutable,
            code_offset: Some(code_offset),
            ..Self::new(name, ty)
        }
    }
}

/// Where a state variable's value is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateVariableAllocation {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub defining_contract: Option<String>,
    /// `None` for a constant without a recorded value or an immutable
    /// without a recorded code offset.
    pub pointer: Option<Pointer>,
}

/// Allocate a contract's state variables. Mutable variables are packed into
/// storage from slot 0; constants point at their definition and immutables
/// into the deployed code.
pub fn allocate_state_variables(
    variables: &[StateVariable],
    udts: &UserDefinedTypes,
    structs: &StorageAllocations,
) -> Result<Vec<StateVariableAllocation>, AllocationError> {
    let stored: Vec<NamedType> = variables
        .iter()
        .filter(|v| v.mutability == Mutability::Mutable)
        .map(|v| NamedType::new(v.name.clone(), v.ty.clone()))
        .collect();
    let layout = structs.layout(&stored, udts)?;
    let mut positions = layout.members.into_iter();

    let mut allocations = Vec::with_capacity(variables.len());
    for variable in variables {
        let pointer = match variable.mutability {
            Mutability::Mutable => positions.next().map(|member| {
                Pointer::storage(
                    Slot::literal(member.position.slot),
                    member.position.offset,
                    member.position.length,
                )
            }),
            Mutability::Constant => variable.value.clone().map(Pointer::Definition),
            Mutability::Immutable => variable.code_offset.map(|start| Pointer::Code {
                start,
                length: WORD_SIZE,
            }),
        };
        if pointer.is_none() {
            tracing::debug!(
                variable = %variable.name,
                mutability = ?variable.mutability,
                "allocate: state variable has no location"
            );
        }
        allocations.push(StateVariableAllocation {
            name: variable.name.clone(),
            ty: variable.ty.clone(),
            defining_contract: variable.defining_contract.clone(),
            pointer,
        });
    }
    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evm_codec_types::UserDefinedType;

    fn udts() -> UserDefinedTypes {
        UserDefinedTypes::new()
            .with(
                "pair",
                UserDefinedType::Struct {
                    name: "Pair".to_string(),
                    members: vec![
                        NamedType::new("a", Type::uint(128)),
                        NamedType::new("b", Type::uint(128)),
                        NamedType::new("c", Type::uint(8)),
                    ],
                },
            )
            .with(
                "node",
                UserDefinedType::Struct {
                    name: "Node".to_string(),
                    members: vec![
                        NamedType::new("value", Type::uint(256)),
                        NamedType::new("children", Type::dynamic_array(Type::struct_type("node", "Node"))),
                        NamedType::new(
                            "byId",
                            Type::mapping(Type::uint(256), Type::struct_type("node", "Node")),
                        ),
                    ],
                },
            )
            .with(
                "loop",
                UserDefinedType::Struct {
                    name: "Loop".to_string(),
                    members: vec![NamedType::new("inner", Type::struct_type("loop", "Loop"))],
                },
            )
            .with(
                "color",
                UserDefinedType::Enum {
                    name: "Color".to_string(),
                    options: vec!["Red".to_string(), "Green".to_string()],
                },
            )
    }

    #[test]
    fn test_uint128_pair_packs_then_uint256_starts_fresh() {
        let table = StorageAllocations::default();
        let layout = table
            .layout(
                &[
                    NamedType::new("a", Type::uint(128)),
                    NamedType::new("b", Type::uint(128)),
                    NamedType::new("c", Type::uint(256)),
                ],
                &UserDefinedTypes::new(),
            )
            .unwrap();

        let positions: Vec<_> = layout
            .members
            .iter()
            .map(|m| (m.position.slot, m.position.offset))
            .collect();
        assert_eq!(
            positions,
            vec![
                (U256::ZERO, 0),
                (U256::ZERO, 16),
                (U256::from(1u64), 0)
            ]
        );
        assert_eq!(layout.size, StorageLength::Slots(U256::from(2u64)));
    }

    #[test]
    fn test_struct_and_following_member_start_fresh_slots() {
        let udts = udts();
        let table = StorageAllocations::build(&udts);
        let pair = table.get("pair").unwrap();
        assert_eq!(pair.size, StorageLength::Slots(U256::from(2u64)));

        let layout = table
            .layout(
                &[
                    NamedType::new("flag", Type::Bool),
                    NamedType::new("pair", Type::struct_type("pair", "Pair")),
                    NamedType::new("small", Type::uint(8)),
                ],
                &udts,
            )
            .unwrap();
        let slots: Vec<_> = layout.members.iter().map(|m| m.position.slot).collect();
        assert_eq!(
            slots,
            vec![U256::ZERO, U256::from(1u64), U256::from(3u64)]
        );
    }

    #[test]
    fn test_recursion_through_indirection_terminates() {
        let udts = udts();
        let table = StorageAllocations::build(&udts);
        let node = table.get("node").unwrap();
        assert_eq!(node.size, StorageLength::Slots(U256::from(3u64)));
        // Direct self-containment cannot be laid out.
        assert!(table.get("loop").is_none());
    }

    #[test]
    fn test_static_array_sizes() {
        let udts = udts();
        let table = StorageAllocations::build(&udts);
        let size = |ty: Type| table.size_of(&ty, &udts).unwrap();

        assert_eq!(
            size(Type::static_array(Type::uint(8), 40)),
            StorageLength::Slots(U256::from(2u64))
        );
        assert_eq!(
            size(Type::static_array(Type::address(), 3)),
            StorageLength::Slots(U256::from(3u64))
        );
        assert_eq!(
            size(Type::static_array(Type::struct_type("pair", "Pair"), 2)),
            StorageLength::Slots(U256::from(4u64))
        );
        assert_eq!(
            size(Type::Enum {
                id: "color".to_string(),
                name: "Color".to_string()
            }),
            StorageLength::Bytes(1)
        );
        assert_eq!(size(Type::external_function()), StorageLength::Bytes(24));
    }

    #[test]
    fn test_enum_byte_width() {
        assert_eq!(enum_byte_width(2), 1);
        assert_eq!(enum_byte_width(256), 1);
        assert_eq!(enum_byte_width(257), 2);
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let table = StorageAllocations::default();
        let err = table
            .size_of(&Type::struct_type("missing", "Missing"), &UserDefinedTypes::new())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::UnknownType {
                id: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_state_variables_skip_constants_and_immutables() {
        let udts = UserDefinedTypes::new();
        let table = StorageAllocations::default();
        let variables = vec![
            StateVariable::new("owner", Type::address()),
            StateVariable::constant(
                "LIMIT",
                Type::uint(256),
                ConstantExpression::Number {
                    value: U256::from(10u64),
                    negative: false,
                },
            ),
            StateVariable::immutable("deployedAt", Type::uint(256), 100),
            StateVariable::new("paused", Type::Bool),
        ];
        let allocations = allocate_state_variables(&variables, &udts, &table).unwrap();
        assert_eq!(allocations.len(), 4);
        assert_eq!(
            allocations[0].pointer,
            Some(Pointer::Storage {
                slot: Slot::literal(U256::ZERO),
                offset: 0,
                length: 20
            })
        );
        assert!(matches!(allocations[1].pointer, Some(Pointer::Definition(_))));
        assert_eq!(
            allocations[2].pointer,
            Some(Pointer::Code {
                start: 100,
                length: 32
            })
        );
        // `paused` packs next to `owner`.
        assert_eq!(
            allocations[3].pointer,
            Some(Pointer::Storage {
                slot: Slot::literal(U256::ZERO),
                offset: 20,
                length: 1
            })
        );
    }
}
