//! Compiler metadata: user-defined types and per-contract declarations.
//!
//! A metadata document is JSON:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "userDefinedTypes": { "12": { "typeClass": "struct", "name": "Pair", "members": [...] } },
//!   "contracts": [
//!     {
//!       "name": "Token",
//!       "deployedBinary": "0x6080...",
//!       "internalFunctions": [{ "pc": 80, "name": "_transfer" }],
//!       "stateVariables": [{ "name": "totalSupply", "type": { "typeClass": "uint", "bits": 256 } }],
//!       "functions": [...],
//!       "events": [...]
//!     }
//!   ]
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use evm_codec_core::allocate::{EventAbi, FunctionAbi, StateVariable};
use evm_codec_core::ContractContext;
use evm_codec_types::UserDefinedTypes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub user_defined_types: UserDefinedTypes,
    #[serde(default)]
    pub contracts: Vec<ContractMetadata>,
}

/// One contract: its decoding context plus its declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractMetadata {
    #[serde(flatten)]
    pub context: ContractContext,
    /// In declaration order, inherited variables first.
    #[serde(default)]
    pub state_variables: Vec<StateVariable>,
    #[serde(default)]
    pub functions: Vec<FunctionAbi>,
    #[serde(default)]
    pub events: Vec<EventAbi>,
}

impl ContractMetadata {
    pub fn new(context: ContractContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn with_state_variable(mut self, variable: StateVariable) -> Self {
        self.state_variables.push(variable);
        self
    }

    pub fn with_function(mut self, function: FunctionAbi) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_event(mut self, event: EventAbi) -> Self {
        self.events.push(event);
        self
    }
}

impl Metadata {
    pub fn new(user_defined_types: UserDefinedTypes) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            user_defined_types,
            contracts: Vec::new(),
        }
    }

    pub fn with_contract(mut self, contract: ContractMetadata) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn contract(&self, name: &str) -> Option<&ContractMetadata> {
        self.contracts.iter().find(|c| c.name() == name)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let metadata: Metadata = serde_json::from_str(raw).context("Invalid metadata JSON")?;
        if metadata.schema_version != SCHEMA_VERSION {
            return Err(anyhow!(
                "Unsupported metadata schema version {}",
                metadata.schema_version
            ));
        }
        Ok(metadata)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata {}", path.display()))?;
        let metadata = Self::from_json_str(&raw)
            .with_context(|| format!("Invalid metadata in {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            contracts = metadata.contracts.len(),
            types = metadata.user_defined_types.len(),
            "metadata: loaded"
        );
        Ok(metadata)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata")
    }
}
