//! End-to-end decoding through the [`Codec`] facade.

mod common;

use alloy_primitives::U256;
use common::fixtures::set_name_calldata;
use common::*;
use evm_codec_core::{MappingKeyTracker, Request};
use evm_codec_types::conversion::{checksum_address, left_pad, word_from_u256};
use evm_codec_types::{DecodedResult, EvmState, StringValue, Value};
use evm_codec::{DecodedVariable, Frame, Metadata, SnapshotOnly};
use std::io::Write;
use tempfile::NamedTempFile;

fn value_of<'a>(variables: &'a [DecodedVariable], name: &str) -> &'a Value {
    let variable = variables
        .iter()
        .find(|v| v.name == name)
        .unwrap_or_else(|| panic!("no variable {}", name));
    variable
        .value
        .as_value()
        .unwrap_or_else(|| panic!("{} decoded to an error: {:?}", name, variable.value))
}

fn text(value: &str) -> Value {
    Value::String(StringValue::Valid {
        value: value.to_string(),
    })
}

fn uint(result: &DecodedResult) -> U256 {
    match result.as_value() {
        Some(Value::Uint(v)) => *v,
        other => panic!("expected uint, got {:?}", other),
    }
}

// =============================================================================
// State variables
// =============================================================================

#[test]
fn test_state_variables_from_snapshot() {
    let codec = token_codec();
    let state = token_state();
    let frame = Frame::new(&state)
        .with_contract("Token")
        .with_address(token_address());

    let variables = assert_ok(
        codec.decode_state_variables(frame, &mut SnapshotOnly),
        "decode token state",
    );
    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "name",
            "totalSupply",
            "balances",
            "status",
            "owner",
            "checkpoints",
            "DECIMALS",
            "cap"
        ]
    );

    assert_eq!(value_of(&variables, "name"), &text("Token"));
    assert_eq!(
        value_of(&variables, "totalSupply"),
        &Value::Uint(U256::from(1000u64))
    );
    assert_eq!(value_of(&variables, "balances"), &Value::Mapping(Vec::new()));
    assert_eq!(
        value_of(&variables, "status"),
        &Value::Enum {
            name: "Paused".to_string(),
            numeric: U256::from(1u64),
        }
    );
    assert_eq!(
        value_of(&variables, "owner"),
        &Value::Address(checksum_address(bob().as_slice()))
    );
    assert_eq!(
        value_of(&variables, "DECIMALS"),
        &Value::Uint(U256::from(18u64))
    );
    assert_eq!(
        value_of(&variables, "cap"),
        &Value::Uint(U256::from(1_000_000u64))
    );

    let Value::Array(checkpoints) = value_of(&variables, "checkpoints") else {
        panic!("checkpoints should be an array");
    };
    assert_eq!(checkpoints.len(), 1);
    let checkpoint = &checkpoints[0];
    assert_eq!(uint(checkpoint.member("block").unwrap()), U256::from(5u64));
    assert_eq!(uint(checkpoint.member("votes").unwrap()), U256::from(7u64));
}

#[test]
fn test_state_variables_fetched_lazily() {
    let codec = token_codec();
    let snapshot = token_state();
    let expected = codec
        .decode_state_variables(
            Frame::new(&snapshot)
                .with_contract("Token")
                .with_address(token_address()),
            &mut SnapshotOnly,
        )
        .unwrap();

    let empty = EvmState::new();
    let mut source = token_source();
    let lazy = assert_ok(
        codec.decode_state_variables(
            Frame::new(&empty)
                .with_contract("Token")
                .with_address(token_address()),
            &mut source,
        ),
        "lazy decode",
    );

    assert_eq!(lazy, expected);
    assert!(source
        .fetched()
        .contains(&Request::Storage { slot: U256::ZERO }));
    assert!(source.fetched().contains(&Request::Code {
        address: token_address()
    }));
}

#[test]
fn test_tracked_balance_is_listed() {
    let codec = token_codec();
    let state = token_state();
    let mut keys = MappingKeyTracker::new();
    let preimage = [
        left_pad(alice().as_slice()).as_slice(),
        word_from_u256(U256::from(2u64)).as_slice(),
    ]
    .concat();
    assert!(keys.track_preimage(&preimage));

    let frame = Frame::new(&state)
        .with_contract("Token")
        .with_address(token_address())
        .with_mapping_keys(&keys);
    let variables = codec.decode_state_variables(frame, &mut SnapshotOnly).unwrap();

    let Value::Mapping(entries) = value_of(&variables, "balances") else {
        panic!("balances should be a mapping");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].key.as_value(),
        Some(&Value::Address(checksum_address(alice().as_slice())))
    );
    assert_eq!(uint(&entries[0].value), U256::from(50u64));
}

#[test]
fn test_missing_state_without_fetching_fails() {
    let codec = token_codec();
    let empty = EvmState::new();
    let frame = Frame::new(&empty).with_contract("Token");

    let err = codec
        .decode_state_variables(frame, &mut SnapshotOnly)
        .unwrap_err();
    assert_error_contains(&err, "not in the snapshot", "snapshot-only decode");
    assert_error_contains(&err, "Token.name", "snapshot-only decode");
}

#[test]
fn test_failing_source_reports_reason() {
    let codec = token_codec();
    let empty = EvmState::new();
    let frame = Frame::new(&empty).with_contract("Token");
    let mut source = token_source().with_error("node unavailable");

    let err = codec.decode_state_variables(frame, &mut source).unwrap_err();
    assert_error_contains(&err, "node unavailable", "failing source");
    assert_eq!(source.fetched().len(), 1);
}

#[test]
fn test_unknown_contract() {
    let codec = token_codec();
    let state = token_state();
    let frame = Frame::new(&state).with_contract("Vault");

    let err = codec
        .decode_state_variables(frame, &mut SnapshotOnly)
        .unwrap_err();
    assert_error_contains(&err, "Unknown contract Vault", "unknown contract");
    assert!(codec.state_variable_allocations("Vault").is_none());
}

// =============================================================================
// Calls and events
// =============================================================================

#[test]
fn test_function_arguments_by_selector() {
    let codec = token_codec();
    let state = EvmState::new().with_calldata(transfer_calldata(&codec));

    let call = assert_ok(
        codec.decode_function_arguments(Frame::new(&state), &mut SnapshotOnly),
        "decode transfer",
    )
    .expect("transfer should match");
    assert_eq!(call.contract, "Token");
    assert_eq!(call.function, "transfer");
    assert_eq!(call.arguments.len(), 2);
    assert_eq!(call.arguments[0].name.as_deref(), Some("to"));
    assert_eq!(
        call.arguments[0].value.as_value(),
        Some(&Value::Address(checksum_address(bob().as_slice())))
    );
    assert_eq!(uint(&call.arguments[1].value), U256::from(25u64));
}

#[test]
fn test_dynamic_argument() {
    let codec = token_codec();
    let state = EvmState::new().with_calldata(set_name_calldata(&codec));

    let call = codec
        .decode_function_arguments(Frame::new(&state).with_contract("Token"), &mut SnapshotOnly)
        .unwrap()
        .unwrap();
    assert_eq!(call.function, "setName");
    assert_eq!(call.arguments[0].value.as_value(), Some(&text("Renamed")));
}

#[test]
fn test_unknown_selector() {
    let codec = token_codec();
    let state = EvmState::new().with_calldata(vec![0xde, 0xad, 0xbe, 0xef]);
    let call = codec
        .decode_function_arguments(Frame::new(&state), &mut SnapshotOnly)
        .unwrap();
    assert!(call.is_none());

    let short = EvmState::new().with_calldata(vec![0x01]);
    let err = codec
        .decode_function_arguments(Frame::new(&short), &mut SnapshotOnly)
        .unwrap_err();
    assert_error_contains(&err, "too short", "short call data");
}

#[test]
fn test_call_data_fetched_on_demand() {
    let codec = token_codec();
    let empty = EvmState::new();
    let mut source = token_source().with_calldata(transfer_calldata(&codec));

    let call = codec
        .decode_function_arguments(Frame::new(&empty), &mut source)
        .unwrap()
        .unwrap();
    assert_eq!(call.function, "transfer");
    assert_eq!(uint(&call.arguments[1].value), U256::from(25u64));
    assert_eq!(
        source.fetched()[0],
        Request::Calldata {
            start: 0,
            length: 4
        }
    );
}

#[test]
fn test_event_by_topic() {
    let codec = token_codec();
    let state = transfer_state(&codec);

    let event = assert_ok(
        codec.decode_event(Frame::new(&state), &mut SnapshotOnly),
        "decode Transfer",
    )
    .expect("Transfer should match");
    assert_eq!(event.event, "Transfer");
    let values: Vec<Option<&Value>> = event.arguments.iter().map(|a| a.value.as_value()).collect();
    assert_eq!(
        values,
        vec![
            Some(&Value::Address(checksum_address(alice().as_slice()))),
            Some(&Value::Address(checksum_address(bob().as_slice()))),
            Some(&Value::Uint(U256::from(25u64))),
        ]
    );
}

#[test]
fn test_event_without_match() {
    let codec = token_codec();
    let state = EvmState::new().with_eventtopics(vec![left_pad(&[0x42])]);
    let event = codec
        .decode_event(Frame::new(&state), &mut SnapshotOnly)
        .unwrap();
    assert!(event.is_none());
}

// =============================================================================
// Metadata files
// =============================================================================

#[test]
fn test_metadata_file_round_trip() {
    let metadata = token_metadata();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(metadata.to_json_pretty().unwrap().as_bytes())
        .unwrap();

    let loaded = assert_ok(Metadata::load(file.path()), "load metadata");
    assert_eq!(loaded, metadata);

    let codec = assert_ok(evm_codec::Codec::new(loaded), "build codec");
    let state = token_state();
    let variables = codec
        .decode_state_variables(
            Frame::new(&state)
                .with_contract("Token")
                .with_address(token_address()),
            &mut SnapshotOnly,
        )
        .unwrap();
    assert_eq!(value_of(&variables, "name"), &text("Token"));
}

#[test]
fn test_invalid_metadata_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{ \"contracts\": 12 }").unwrap();

    let err = Metadata::load(file.path()).unwrap_err();
    assert_error_contains(&err, "Invalid metadata", "invalid metadata file");

    let missing = file.path().with_extension("missing");
    let err = Metadata::load(&missing).unwrap_err();
    assert_error_contains(&err, "Failed to read metadata", "missing metadata file");
}
