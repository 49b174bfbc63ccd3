//! Everything a decode reads besides the pointer: the snapshot, type and
//! layout tables, known mapping keys, contract contexts and options.

use crate::allocate::Allocations;
use crate::mapping_keys::MappingKeyTracker;
use crate::options::DecoderOptions;
use alloy_primitives::Address;
use evm_codec_types::{EvmState, UserDefinedTypes};
use serde::{Deserialize, Serialize};

/// An entry of a contract's internal function table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalFunctionEntry {
    /// Entry pc of the function (deployed or constructor code).
    pub pc: u32,
    pub name: String,
    #[serde(default)]
    pub defining_contract: Option<String>,
    /// The compiler's designated invalid function (`assert(false)` target).
    #[serde(default)]
    pub designated_invalid: bool,
}

/// A contract known to the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractContext {
    pub name: String,
    /// Deployed bytecode, matched against code fetched for contract
    /// identification.
    #[serde(default, with = "evm_codec_types::conversion::serde_hex")]
    pub deployed_binary: Vec<u8>,
    #[serde(default)]
    pub internal_functions: Vec<InternalFunctionEntry>,
}

impl ContractContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_deployed_binary(mut self, binary: Vec<u8>) -> Self {
        self.deployed_binary = binary;
        self
    }

    pub fn with_internal_function(mut self, entry: InternalFunctionEntry) -> Self {
        self.internal_functions.push(entry);
        self
    }

    pub fn internal_function(&self, pc: u32) -> Option<&InternalFunctionEntry> {
        self.internal_functions.iter().find(|f| f.pc == pc)
    }
}

/// Borrowed decode inputs. Cheap to copy; nothing in here is mutated by a
/// decode.
#[derive(Debug, Clone, Copy)]
pub struct DecoderInfo<'a> {
    pub state: &'a EvmState,
    pub user_defined_types: &'a UserDefinedTypes,
    pub allocations: &'a Allocations,
    pub mapping_keys: Option<&'a MappingKeyTracker>,
    /// All known contracts, for contract identification.
    pub contexts: &'a [ContractContext],
    /// The contract whose code is executing (internal function pointers,
    /// immutables).
    pub current_context: Option<&'a ContractContext>,
    pub current_address: Option<Address>,
    pub in_constructor: bool,
    pub options: DecoderOptions,
}

impl<'a> DecoderInfo<'a> {
    pub fn new(
        state: &'a EvmState,
        user_defined_types: &'a UserDefinedTypes,
        allocations: &'a Allocations,
    ) -> Self {
        Self {
            state,
            user_defined_types,
            allocations,
            mapping_keys: None,
            contexts: &[],
            current_context: None,
            current_address: None,
            in_constructor: false,
            options: DecoderOptions::default(),
        }
    }

    pub fn with_mapping_keys(mut self, keys: &'a MappingKeyTracker) -> Self {
        self.mapping_keys = Some(keys);
        self
    }

    pub fn with_contexts(mut self, contexts: &'a [ContractContext]) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_current_context(mut self, context: &'a ContractContext) -> Self {
        self.current_context = Some(context);
        self
    }

    pub fn with_current_address(mut self, address: Address) -> Self {
        self.current_address = Some(address);
        self
    }

    pub fn with_constructor(mut self, in_constructor: bool) -> Self {
        self.in_constructor = in_constructor;
        self
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Identify deployed code against the known contexts.
    pub fn identify_code(&self, code: &[u8]) -> Option<&'a ContractContext> {
        if code.is_empty() {
            return None;
        }
        self.contexts
            .iter()
            .find(|c| !c.deployed_binary.is_empty() && c.deployed_binary == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_json_shape() {
        let context: ContractContext = serde_json::from_str(
            r#"{
                "name": "Token",
                "deployedBinary": "0x6080",
                "internalFunctions": [
                    {"pc": 0, "name": "assert", "designatedInvalid": true},
                    {"pc": 120, "name": "_mint", "definingContract": "ERC20"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(context.deployed_binary, vec![0x60, 0x80]);
        assert!(context.internal_function(0).unwrap().designated_invalid);
        assert_eq!(
            context.internal_function(120).unwrap().defining_contract.as_deref(),
            Some("ERC20")
        );
        assert!(context.internal_function(7).is_none());
    }

    #[test]
    fn test_identify_code_requires_exact_match() {
        let state = EvmState::new();
        let udts = UserDefinedTypes::new();
        let allocations = Allocations::default();
        let contexts = vec![
            ContractContext::new("Empty"),
            ContractContext::new("Token").with_deployed_binary(vec![1, 2, 3]),
        ];
        let info = DecoderInfo::new(&state, &udts, &allocations).with_contexts(&contexts);

        assert_eq!(info.identify_code(&[1, 2, 3]).map(|c| c.name.as_str()), Some("Token"));
        assert!(info.identify_code(&[1, 2]).is_none());
        assert!(info.identify_code(&[]).is_none());
    }
}
