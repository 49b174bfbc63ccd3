//! Fatal decoder faults.
//!
//! Malformed on-chain data never produces a fault; it becomes a
//! [`DecodingError`](evm_codec_types::DecodingError) value. Faults are reserved
//! for conditions where decoding cannot continue: a failed fetch, a stack
//! index beyond the captured stack, or a type/location combination that
//! consistent metadata can never produce.

use crate::request::Request;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFault {
    /// Fetching requested bytes failed, or a required buffer was not captured.
    ReadFailure {
        request: Option<Request>,
        reason: String,
    },
    /// A stack pointer beyond the captured stack.
    StackIndexOutOfRange { index: usize, depth: usize },
    /// A type/location combination that cannot occur.
    Unsupported { what: String },
    /// `resume` called while no request was outstanding.
    NoPendingRequest,
}

impl DecodeFault {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        DecodeFault::Unsupported { what: what.into() }
    }
}

impl fmt::Display for DecodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFault::ReadFailure { request, reason } => match request {
                Some(request) => write!(f, "ReadFailure: {} ({})", request, reason),
                None => write!(f, "ReadFailure: {}", reason),
            },
            DecodeFault::StackIndexOutOfRange { index, depth } => write!(
                f,
                "StackIndexOutOfRange: index {} with stack depth {}",
                index, depth
            ),
            DecodeFault::Unsupported { what } => write!(f, "Unsupported: {}", what),
            DecodeFault::NoPendingRequest => write!(f, "resume called with no pending request"),
        }
    }
}

impl std::error::Error for DecodeFault {}
