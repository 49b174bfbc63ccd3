//! Decoder configuration.
//!
//! Options have sensible defaults and can be overridden programmatically with
//! the `with_*` builders or from the environment via [`DecoderOptions::from_env`]:
//!
//! | Variable                          | Effect                                    |
//! |-----------------------------------|-------------------------------------------|
//! | `EVM_CODEC_PADDING_MODE`          | `default`, `permissive` or `strict`       |
//! | `EVM_CODEC_IDENTIFY_CONTRACTS`    | `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off` |
//! | `EVM_CODEC_MAX_COLLECTION_LENGTH` | upper bound on decoded collection lengths |

use crate::pointer::Location;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When padding around sub-word values is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    /// Validate in storage, memory, calldata, event data and code; tolerate
    /// garbage on the stack and in literals.
    #[default]
    Default,
    /// Never validate; always keep only the bytes the type needs.
    Permissive,
    /// Validate everywhere, including the stack.
    Strict,
}

impl PaddingMode {
    /// Whether values read from `location` must have clean padding.
    pub fn validates(self, location: Location) -> bool {
        match self {
            PaddingMode::Permissive => false,
            PaddingMode::Strict => !matches!(location, Location::Definition),
            PaddingMode::Default => !matches!(
                location,
                Location::Stack | Location::StackLiteral | Location::Definition
            ),
        }
    }
}

impl FromStr for PaddingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(PaddingMode::Default),
            "permissive" => Ok(PaddingMode::Permissive),
            "strict" => Ok(PaddingMode::Strict),
            other => Err(format!("unknown padding mode '{}'", other)),
        }
    }
}

/// Configuration for a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderOptions {
    /// Padding validation policy (default: [`PaddingMode::Default`]).
    pub padding_mode: PaddingMode,
    /// Request contract code to identify the class of contract addresses
    /// and external function targets (default: false).
    pub identify_contracts: bool,
    /// Collections longer than this decode to an overlong-collection error
    /// instead of being read (default: 2^20).
    pub max_collection_length: u64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            padding_mode: PaddingMode::Default,
            identify_contracts: false,
            max_collection_length: 1 << 20,
        }
    }
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `EVM_CODEC_*` environment variables that are
    /// set. A value that does not parse is logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(mode) = env_override("EVM_CODEC_PADDING_MODE", |v| v.parse().ok()) {
            options.padding_mode = mode;
        }
        if let Some(identify) = env_override("EVM_CODEC_IDENTIFY_CONTRACTS", parse_flag) {
            options.identify_contracts = identify;
        }
        if let Some(max) = env_override("EVM_CODEC_MAX_COLLECTION_LENGTH", |v| v.trim().parse().ok())
        {
            options.max_collection_length = max;
        }
        options
    }

    pub fn with_padding_mode(mut self, mode: PaddingMode) -> Self {
        self.padding_mode = mode;
        self
    }

    pub fn with_contract_identification(mut self, identify: bool) -> Self {
        self.identify_contracts = identify;
        self
    }

    pub fn with_max_collection_length(mut self, max: u64) -> Self {
        self.max_collection_length = max;
        self
    }
}

/// Read `key` and convert it with `parse`; `None` when unset or rejected.
fn env_override<T>(key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(variable = key, value = %raw, "options: ignoring unparsable override");
    }
    parsed
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_mode_by_location() {
        assert!(PaddingMode::Default.validates(Location::Memory));
        assert!(PaddingMode::Default.validates(Location::Storage));
        assert!(PaddingMode::Default.validates(Location::Calldata));
        assert!(!PaddingMode::Default.validates(Location::Stack));
        assert!(!PaddingMode::Default.validates(Location::StackLiteral));

        assert!(PaddingMode::Strict.validates(Location::Stack));
        assert!(!PaddingMode::Permissive.validates(Location::Memory));
    }

    #[test]
    fn test_padding_mode_from_str() {
        assert_eq!("Strict".parse::<PaddingMode>(), Ok(PaddingMode::Strict));
        assert_eq!(
            " permissive ".parse::<PaddingMode>(),
            Ok(PaddingMode::Permissive)
        );
        assert!("loose".parse::<PaddingMode>().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("EVM_CODEC_PADDING_MODE", "strict");
        std::env::set_var("EVM_CODEC_IDENTIFY_CONTRACTS", "yes");
        std::env::set_var("EVM_CODEC_MAX_COLLECTION_LENGTH", "64");

        let options = DecoderOptions::from_env();
        assert_eq!(options.padding_mode, PaddingMode::Strict);
        assert!(options.identify_contracts);
        assert_eq!(options.max_collection_length, 64);

        std::env::remove_var("EVM_CODEC_PADDING_MODE");
        std::env::remove_var("EVM_CODEC_IDENTIFY_CONTRACTS");
        std::env::remove_var("EVM_CODEC_MAX_COLLECTION_LENGTH");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_unparsable_override_keeps_default() {
        std::env::set_var("EVM_CODEC_TEST_UNPARSABLE", "lots");
        let parsed: Option<u64> =
            env_override("EVM_CODEC_TEST_UNPARSABLE", |v| v.trim().parse().ok());
        assert_eq!(parsed, None);
        assert_eq!(env_override("EVM_CODEC_TEST_UNSET", parse_flag), None);
        std::env::remove_var("EVM_CODEC_TEST_UNPARSABLE");
    }

    #[test]
    fn test_builders() {
        let options = DecoderOptions::new()
            .with_padding_mode(PaddingMode::Permissive)
            .with_contract_identification(true)
            .with_max_collection_length(10);
        assert_eq!(options.padding_mode, PaddingMode::Permissive);
        assert!(options.identify_contracts);
        assert_eq!(options.max_collection_length, 10);
    }
}
