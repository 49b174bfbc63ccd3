//! A small token contract:
//!
//! ```solidity
//! contract Token {
//!     enum Status { Active, Paused }
//!     struct Checkpoint { uint64 block; uint192 votes; }
//!
//!     string name;                                  // slot 0
//!     uint256 totalSupply;                          // slot 1
//!     mapping(address => uint256) balances;         // slot 2
//!     Status status;                                // slot 3, offset 0
//!     address owner;                                // slot 3, offset 1
//!     Checkpoint[] checkpoints;                     // slot 4
//!     uint8 constant DECIMALS = 18;
//!     uint256 immutable cap;                        // code offset 5
//!
//!     event Transfer(address indexed from, address indexed to, uint256 value);
//!     function transfer(address to, uint256 amount) external;
//!     function setName(string calldata name) external;
//! }
//! ```

#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use evm_codec_core::allocate::{AbiParameter, EventAbi, FunctionAbi, StateVariable};
use evm_codec_core::{ConstantExpression, ContractContext};
use evm_codec_types::conversion::{keccak_u256, left_pad, right_pad, word_from_u256};
use evm_codec_types::{EvmState, NamedType, Type, UserDefinedType, UserDefinedTypes, Word};
use evm_codec::{Codec, ContractMetadata, Metadata, MockSource};

pub const TOKEN_BINARY: [u8; 6] = [0x60, 0x80, 0x60, 0x40, 0x52, 0x00];

pub fn token_address() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn alice() -> Address {
    Address::repeat_byte(0x11)
}

pub fn bob() -> Address {
    Address::repeat_byte(0x22)
}

pub fn token_metadata() -> Metadata {
    let udts = UserDefinedTypes::new()
        .with(
            "9",
            UserDefinedType::Enum {
                name: "Status".to_string(),
                options: vec!["Active".to_string(), "Paused".to_string()],
            },
        )
        .with(
            "7",
            UserDefinedType::Struct {
                name: "Checkpoint".to_string(),
                members: vec![
                    NamedType::new("block", Type::uint(64)),
                    NamedType::new("votes", Type::uint(192)),
                ],
            },
        );

    let token = ContractMetadata::new(
        ContractContext::new("Token").with_deployed_binary(TOKEN_BINARY.to_vec()),
    )
    .with_state_variable(StateVariable::new("name", Type::string()))
    .with_state_variable(StateVariable::new("totalSupply", Type::uint(256)))
    .with_state_variable(StateVariable::new(
        "balances",
        Type::mapping(Type::address(), Type::uint(256)),
    ))
    .with_state_variable(StateVariable::new(
        "status",
        Type::Enum {
            id: "9".to_string(),
            name: "Status".to_string(),
        },
    ))
    .with_state_variable(StateVariable::new("owner", Type::address()))
    .with_state_variable(StateVariable::new(
        "checkpoints",
        Type::dynamic_array(Type::struct_type("7", "Checkpoint")),
    ))
    .with_state_variable(StateVariable::constant(
        "DECIMALS",
        Type::uint(8),
        ConstantExpression::Number {
            value: U256::from(18u64),
            negative: false,
        },
    ))
    .with_state_variable(StateVariable::immutable("cap", Type::uint(256), 5))
    .with_function(FunctionAbi::new(
        "transfer",
        vec![
            AbiParameter::new("to", Type::address()),
            AbiParameter::new("amount", Type::uint(256)),
        ],
    ))
    .with_function(FunctionAbi::new(
        "setName",
        vec![AbiParameter::new("name", Type::string())],
    ))
    .with_event(EventAbi::new(
        "Transfer",
        vec![
            AbiParameter::indexed("from", Type::address()),
            AbiParameter::indexed("to", Type::address()),
            AbiParameter::new("value", Type::uint(256)),
        ],
    ));

    Metadata::new(udts).with_contract(token)
}

pub fn token_codec() -> Codec {
    Codec::new(token_metadata()).expect("token metadata allocates")
}

/// Storage slots and values of a deployed token, as `(slot, word)`.
fn token_storage() -> Vec<(U256, Word)> {
    let mut name = [0u8; 32];
    name[..5].copy_from_slice(b"Token");
    name[31] = 10;

    let mut packed = [0u8; 32];
    packed[31] = 1;
    packed[11..31].copy_from_slice(bob().as_slice());

    let mut checkpoint = [0u8; 32];
    checkpoint[31] = 5;
    checkpoint[23] = 7;

    let balance_slot = keccak_u256(
        &[
            left_pad(alice().as_slice()).as_slice(),
            word_from_u256(U256::from(2u64)).as_slice(),
        ]
        .concat(),
    );
    let checkpoints = keccak_u256(word_from_u256(U256::from(4u64)).as_slice());

    vec![
        (U256::ZERO, Word::from(name)),
        (U256::from(1u64), word_from_u256(U256::from(1000u64))),
        (balance_slot, word_from_u256(U256::from(50u64))),
        (U256::from(3u64), Word::from(packed)),
        (U256::from(4u64), word_from_u256(U256::from(1u64))),
        (checkpoints, Word::from(checkpoint)),
    ]
}

fn token_code() -> Vec<u8> {
    let mut code = TOKEN_BINARY[..5].to_vec();
    code.extend_from_slice(word_from_u256(U256::from(1_000_000u64)).as_slice());
    code
}

/// A snapshot holding the token's full storage and code.
pub fn token_state() -> EvmState {
    token_storage()
        .into_iter()
        .fold(EvmState::new(), |state, (slot, word)| {
            state.with_storage(slot, word)
        })
        .with_code(token_address(), token_code())
}

/// A source serving the token's storage and code on request.
pub fn token_source() -> MockSource {
    token_storage()
        .into_iter()
        .fold(MockSource::new(), |source, (slot, word)| {
            source.with_storage(slot, U256::from_be_bytes(word.0))
        })
        .with_code(token_address(), token_code())
}

/// Call data for `transfer(bob, 25)`.
pub fn transfer_calldata(codec: &Codec) -> Vec<u8> {
    let udts = &codec.metadata().user_defined_types;
    let transfer = &codec.metadata().contracts[0].functions[0];
    let mut calldata = transfer.selector(udts).expect("selector").to_vec();
    calldata.extend_from_slice(left_pad(bob().as_slice()).as_slice());
    calldata.extend_from_slice(word_from_u256(U256::from(25u64)).as_slice());
    calldata
}

/// Topics and data of `Transfer(alice, bob, 25)`.
pub fn transfer_state(codec: &Codec) -> EvmState {
    let udts = &codec.metadata().user_defined_types;
    let event = &codec.metadata().contracts[0].events[0];
    let topic0 = event.topic0(udts).expect("topic").expect("not anonymous");
    EvmState::new()
        .with_eventtopics(vec![
            topic0,
            left_pad(alice().as_slice()),
            left_pad(bob().as_slice()),
        ])
        .with_eventdata(word_from_u256(U256::from(25u64)).to_vec())
}

/// Call data for `setName("Renamed")`.
pub fn set_name_calldata(codec: &Codec) -> Vec<u8> {
    let udts = &codec.metadata().user_defined_types;
    let set_name = &codec.metadata().contracts[0].functions[1];
    let mut calldata = set_name.selector(udts).expect("selector").to_vec();
    calldata.extend_from_slice(word_from_u256(U256::from(0x20u64)).as_slice());
    calldata.extend_from_slice(word_from_u256(U256::from(7u64)).as_slice());
    calldata.extend_from_slice(right_pad(b"Renamed").as_slice());
    calldata
}
