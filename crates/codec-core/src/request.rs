//! Data requests issued by a suspended decode, and the caller's responses.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::fmt;

/// The kind of state a [`Request`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Stack,
    Memory,
    Storage,
    Calldata,
    Code,
}

/// A range of machine state the decoder needs but the snapshot lacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request {
    /// One stack word, counted from the bottom.
    Stack { index: usize },
    Memory { start: usize, length: usize },
    /// One 32-byte storage slot.
    Storage { slot: U256 },
    Calldata { start: usize, length: usize },
    /// The full deployed code at an address.
    Code { address: Address },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Stack { .. } => RequestKind::Stack,
            Request::Memory { .. } => RequestKind::Memory,
            Request::Storage { .. } => RequestKind::Storage,
            Request::Calldata { .. } => RequestKind::Calldata,
            Request::Code { .. } => RequestKind::Code,
        }
    }

    /// Expected response length in bytes; `None` when open-ended (code).
    pub fn length(&self) -> Option<usize> {
        match self {
            Request::Stack { .. } | Request::Storage { .. } => Some(32),
            Request::Memory { length, .. } | Request::Calldata { length, .. } => Some(*length),
            Request::Code { .. } => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Stack { index } => write!(f, "stack[{}]", index),
            Request::Memory { start, length } => write!(f, "memory[{}..+{}]", start, length),
            Request::Storage { slot } => write!(f, "storage[{}]", slot),
            Request::Calldata { start, length } => write!(f, "calldata[{}..+{}]", start, length),
            Request::Code { address } => write!(f, "code({})", address),
        }
    }
}

/// The caller's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The requested bytes. Short storage/stack words are left-padded; short
    /// memory/calldata ranges are zero-filled on the right.
    Bytes(Vec<u8>),
    /// The fetch failed; decoding cannot continue.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_and_length() {
        let storage = Request::Storage {
            slot: U256::from(5u64),
        };
        assert_eq!(storage.kind(), RequestKind::Storage);
        assert_eq!(storage.length(), Some(32));

        let code = Request::Code {
            address: Address::ZERO,
        };
        assert_eq!(code.kind(), RequestKind::Code);
        assert_eq!(code.length(), None);
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(Request::Memory {
            start: 64,
            length: 32,
        })
        .unwrap();
        assert_eq!(json["kind"], "memory");
        assert_eq!(json["start"], 64);
        assert_eq!(json["length"], 32);
    }

    #[test]
    fn test_request_display() {
        let r = Request::Storage {
            slot: U256::from(255u64),
        };
        assert_eq!(r.to_string(), "storage[255]");
    }
}
