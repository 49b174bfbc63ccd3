//! Memory layout of structs.
//!
//! Every member takes one word. Reference members hold an absolute memory
//! address; mappings do not exist in memory and are left out.

use evm_codec_types::conversion::WORD_SIZE;
use evm_codec_types::{Type, TypeId, UserDefinedTypes};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryMemberAllocation {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryAllocation {
    pub length: usize,
    pub members: Vec<MemoryMemberAllocation>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct MemoryAllocations {
    structs: HashMap<TypeId, MemoryAllocation>,
}

impl MemoryAllocations {
    pub fn build(udts: &UserDefinedTypes) -> Self {
        let mut structs = HashMap::new();
        for id in udts.struct_ids() {
            let Some(members) = udts.struct_members(id) else {
                continue;
            };
            let members: Vec<_> = members
                .iter()
                .filter(|m| !matches!(m.ty, Type::Mapping { .. }))
                .enumerate()
                .map(|(i, m)| MemoryMemberAllocation {
                    name: m.name.clone(),
                    ty: m.ty.clone(),
                    offset: i * WORD_SIZE,
                })
                .collect();
            structs.insert(
                id.clone(),
                MemoryAllocation {
                    length: members.len() * WORD_SIZE,
                    members,
                },
            );
        }
        Self { structs }
    }

    pub fn get(&self, id: &str) -> Option<&MemoryAllocation> {
        self.structs.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evm_codec_types::{NamedType, UserDefinedType};

    #[test]
    fn test_mappings_are_skipped() {
        let udts = UserDefinedTypes::new().with(
            "s",
            UserDefinedType::Struct {
                name: "S".to_string(),
                members: vec![
                    NamedType::new("a", Type::uint(8)),
                    NamedType::new("m", Type::mapping(Type::uint(8), Type::uint(8))),
                    NamedType::new("b", Type::string()),
                ],
            },
        );
        let table = MemoryAllocations::build(&udts);
        let s = table.get("s").unwrap();
        assert_eq!(s.length, 64);
        let layout: Vec<_> = s
            .members
            .iter()
            .map(|m| (m.name.as_deref(), m.offset))
            .collect();
        assert_eq!(layout, vec![(Some("a"), 0), (Some("b"), 32)]);
    }
}
