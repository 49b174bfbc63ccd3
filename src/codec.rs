//! The decoding facade.
//!
//! [`Codec`] builds every layout table once from [`Metadata`] and then decodes
//! variables, state, call data and events against any number of snapshots.
//!
//! # Example
//!
//! ```ignore
//! let codec = Codec::new(Metadata::load(path)?)?;
//! let frame = Frame::new(&state).with_contract("Token").with_address(token);
//! for variable in codec.decode_state_variables(frame, &mut SnapshotOnly)? {
//!     println!("{} = {}", variable.name, variable.value);
//! }
//! ```

use crate::driver::{drive, StateSource};
use crate::metadata::{ContractMetadata, Metadata};
use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use evm_codec_core::allocate::{
    allocate_state_variables, ArgumentAllocation, EventAllocation, FunctionAllocation,
    StateVariableAllocation,
};
use evm_codec_core::{
    decode, Allocations, ContractContext, DecoderInfo, DecoderOptions, MappingKeyTracker, Pointer,
    Request,
};
use evm_codec_types::{DecodedResult, EvmState, NamedResult, Type};
use serde::Serialize;
use std::collections::HashMap;

/// Where a decode happens: the snapshot plus what is known about the
/// executing contract.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub state: &'a EvmState,
    /// Name of the contract whose code is executing.
    pub contract: Option<&'a str>,
    pub address: Option<Address>,
    pub in_constructor: bool,
    pub mapping_keys: Option<&'a MappingKeyTracker>,
}

impl<'a> Frame<'a> {
    pub fn new(state: &'a EvmState) -> Self {
        Self {
            state,
            contract: None,
            address: None,
            in_constructor: false,
            mapping_keys: None,
        }
    }

    pub fn with_contract(mut self, contract: &'a str) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_constructor(mut self, in_constructor: bool) -> Self {
        self.in_constructor = in_constructor;
        self
    }

    pub fn with_mapping_keys(mut self, keys: &'a MappingKeyTracker) -> Self {
        self.mapping_keys = Some(keys);
        self
    }
}

/// A decoded state variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedVariable {
    pub name: String,
    pub defining_contract: Option<String>,
    pub value: DecodedResult,
}

/// A decoded function call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedCall {
    pub contract: String,
    pub function: String,
    pub arguments: Vec<NamedResult>,
}

/// A decoded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent {
    pub contract: String,
    pub event: String,
    pub arguments: Vec<NamedResult>,
}

/// Per-contract allocations.
#[derive(Debug, Clone)]
struct ContractAllocations {
    variables: Vec<StateVariableAllocation>,
    functions: Vec<FunctionAllocation>,
    events: Vec<EventAllocation>,
}

#[derive(Debug)]
pub struct Codec {
    metadata: Metadata,
    allocations: Allocations,
    contexts: Vec<ContractContext>,
    contracts: HashMap<String, ContractAllocations>,
    options: DecoderOptions,
}

impl Codec {
    /// Build every layout table for `metadata`.
    pub fn new(metadata: Metadata) -> Result<Self> {
        let udts = &metadata.user_defined_types;
        let allocations = Allocations::build(udts);

        let mut contracts = HashMap::with_capacity(metadata.contracts.len());
        for contract in &metadata.contracts {
            let allocated = allocate_contract(contract, udts, &allocations)
                .with_context(|| format!("Failed to allocate contract {}", contract.name()))?;
            contracts.insert(contract.name().to_string(), allocated);
        }
        let contexts = metadata.contracts.iter().map(|c| c.context.clone()).collect();

        tracing::debug!(
            contracts = contracts.len(),
            storage_structs = allocations.storage.len(),
            "codec: built allocations"
        );
        Ok(Self {
            metadata,
            allocations,
            contexts,
            contracts,
            options: DecoderOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn allocations(&self) -> &Allocations {
        &self.allocations
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    /// State variable locations of `contract`, in declaration order.
    pub fn state_variable_allocations(&self, contract: &str) -> Option<&[StateVariableAllocation]> {
        self.contracts.get(contract).map(|c| c.variables.as_slice())
    }

    /// Decoder inputs for `frame`.
    pub fn info<'a>(&'a self, frame: Frame<'a>) -> Result<DecoderInfo<'a>> {
        let mut info = DecoderInfo::new(
            frame.state,
            &self.metadata.user_defined_types,
            &self.allocations,
        )
        .with_contexts(&self.contexts)
        .with_constructor(frame.in_constructor)
        .with_options(self.options);
        if let Some(name) = frame.contract {
            let context = self
                .contexts
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| anyhow!("Unknown contract {}", name))?;
            info = info.with_current_context(context);
        }
        if let Some(address) = frame.address {
            info = info.with_current_address(address);
        }
        if let Some(keys) = frame.mapping_keys {
            info = info.with_mapping_keys(keys);
        }
        Ok(info)
    }

    /// Decode one value of `ty` at `pointer`.
    pub fn decode_variable(
        &self,
        ty: &Type,
        pointer: &Pointer,
        frame: Frame<'_>,
        source: &mut dyn StateSource,
    ) -> Result<DecodedResult> {
        let info = self.info(frame)?;
        let mut process = decode(ty, pointer, info);
        drive(&mut process, source).with_context(|| format!("Failed to decode {}", ty))
    }

    /// Decode every state variable of the frame's contract. Variables with
    /// no known location are skipped.
    pub fn decode_state_variables(
        &self,
        frame: Frame<'_>,
        source: &mut dyn StateSource,
    ) -> Result<Vec<DecodedVariable>> {
        let name = frame
            .contract
            .ok_or_else(|| anyhow!("Decoding state variables requires a contract"))?;
        let contract = self
            .contracts
            .get(name)
            .ok_or_else(|| anyhow!("Unknown contract {}", name))?;

        let mut decoded = Vec::with_capacity(contract.variables.len());
        for variable in &contract.variables {
            let Some(pointer) = &variable.pointer else {
                tracing::debug!(variable = %variable.name, "codec: skipping unlocated variable");
                continue;
            };
            let value = self
                .decode_variable(&variable.ty, pointer, frame, source)
                .with_context(|| format!("Failed to decode {}.{}", name, variable.name))?;
            decoded.push(DecodedVariable {
                name: variable.name.clone(),
                defining_contract: variable.defining_contract.clone(),
                value,
            });
        }
        Ok(decoded)
    }

    /// Decode the call in the frame's call data by matching its selector
    /// against the known functions (of the frame's contract, when set).
    /// `Ok(None)` when no function matches.
    pub fn decode_function_arguments(
        &self,
        frame: Frame<'_>,
        source: &mut dyn StateSource,
    ) -> Result<Option<DecodedCall>> {
        let selector = self.selector(frame.state, source)?;
        let found = self.candidates(frame.contract).find_map(|(contract, allocated)| {
            allocated
                .functions
                .iter()
                .find(|f| f.selector == selector)
                .map(|f| (contract, f))
        });
        let Some((contract, function)) = found else {
            tracing::debug!(selector = %hex::encode(selector), "codec: no function for selector");
            return Ok(None);
        };

        let arguments = self.decode_arguments(&function.arguments, frame, source)?;
        Ok(Some(DecodedCall {
            contract: contract.to_string(),
            function: function.name.clone(),
            arguments,
        }))
    }

    /// Decode the event in the frame's topics and event data. Non-anonymous
    /// events are matched by topic 0; failing that, an anonymous event with
    /// as many indexed parameters as there are topics is used.
    pub fn decode_event(
        &self,
        frame: Frame<'_>,
        source: &mut dyn StateSource,
    ) -> Result<Option<DecodedEvent>> {
        let topics = &frame.state.eventtopics;
        let by_topic = topics.first().and_then(|topic0| {
            self.candidates(frame.contract).find_map(|(contract, allocated)| {
                allocated
                    .events
                    .iter()
                    .find(|e| e.topic0.as_ref() == Some(topic0))
                    .map(|e| (contract, e))
            })
        });
        let found = by_topic.or_else(|| {
            self.candidates(frame.contract).find_map(|(contract, allocated)| {
                allocated
                    .events
                    .iter()
                    .find(|e| e.topic0.is_none() && indexed_count(e) == topics.len())
                    .map(|e| (contract, e))
            })
        });
        let Some((contract, event)) = found else {
            tracing::debug!(topics = topics.len(), "codec: no matching event");
            return Ok(None);
        };

        let arguments = self.decode_arguments(&event.arguments, frame, source)?;
        Ok(Some(DecodedEvent {
            contract: contract.to_string(),
            event: event.name.clone(),
            arguments,
        }))
    }

    fn decode_arguments(
        &self,
        arguments: &[ArgumentAllocation],
        frame: Frame<'_>,
        source: &mut dyn StateSource,
    ) -> Result<Vec<NamedResult>> {
        arguments
            .iter()
            .map(|arg| {
                let value = self.decode_variable(&arg.ty, &arg.pointer, frame, source)?;
                Ok(NamedResult::new(arg.name.clone(), value))
            })
            .collect()
    }

    /// Contracts to search: the named one, or all of them in metadata order.
    fn candidates<'s>(
        &'s self,
        contract: Option<&'s str>,
    ) -> impl Iterator<Item = (&'s str, &'s ContractAllocations)> + 's {
        self.metadata
            .contracts
            .iter()
            .map(|c| c.name())
            .filter(move |name| contract.map_or(true, |wanted| wanted == *name))
            .filter_map(move |name| self.contracts.get(name).map(|allocated| (name, allocated)))
    }

    fn selector(&self, state: &EvmState, source: &mut dyn StateSource) -> Result<[u8; 4]> {
        let bytes = match &state.calldata {
            Some(calldata) => calldata.iter().take(4).copied().collect::<Vec<u8>>(),
            None => source
                .fetch(&Request::Calldata {
                    start: 0,
                    length: 4,
                })
                .context("Failed to fetch the function selector")?,
        };
        if bytes.len() < 4 {
            return Err(anyhow!("Call data too short for a selector ({} bytes)", bytes.len()));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&bytes[..4]);
        Ok(selector)
    }
}

fn indexed_count(event: &EventAllocation) -> usize {
    event
        .arguments
        .iter()
        .filter(|a| matches!(a.pointer, Pointer::Eventtopic { .. }))
        .count()
}

fn allocate_contract(
    contract: &ContractMetadata,
    udts: &evm_codec_types::UserDefinedTypes,
    allocations: &Allocations,
) -> Result<ContractAllocations> {
    let variables =
        allocate_state_variables(&contract.state_variables, udts, &allocations.storage)?;
    let functions = contract
        .functions
        .iter()
        .map(|f| {
            allocations
                .abi
                .allocate_function(f, udts)
                .with_context(|| format!("Failed to allocate function {}", f.name))
        })
        .collect::<Result<Vec<_>>>()?;
    let events = contract
        .events
        .iter()
        .map(|e| {
            allocations
                .abi
                .allocate_event(e, udts)
                .with_context(|| format!("Failed to allocate event {}", e.name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ContractAllocations {
        variables,
        functions,
        events,
    })
}
