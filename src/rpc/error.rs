//! The well-known RPC error envelopes, named after their `ElaRpc*` constants
//! in the original interface layer. Each carries a fixed JSON-RPC-ish `(code,
//! message)` pair; handlers never let a domain error escape raw.

use std::fmt;

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    InvalidParameter,
    InvalidTransaction,
    InvalidBlock,
    InvalidHash,
    UnknownBlock,
    UnknownTransaction,
    InternalError,
    Failed,
    /// A required parameter was missing entirely (`ElaRpcNil`) — distinct
    /// from a present-but-wrong-typed parameter (`InvalidParameter`).
    Nil,
}

impl RpcError {
    fn code(self) -> i64 {
        match self {
            RpcError::InvalidParameter => -1,
            RpcError::InvalidTransaction => -2,
            RpcError::InvalidBlock => -3,
            RpcError::InvalidHash => -4,
            RpcError::UnknownBlock => -5,
            RpcError::UnknownTransaction => -6,
            RpcError::InternalError => -7,
            RpcError::Failed => -8,
            RpcError::Nil => -9,
        }
    }

    fn message(self) -> &'static str {
        match self {
            RpcError::InvalidParameter => "invalid parameter",
            RpcError::InvalidTransaction => "invalid transaction",
            RpcError::InvalidBlock => "invalid block",
            RpcError::InvalidHash => "invalid hash",
            RpcError::UnknownBlock => "unknown block",
            RpcError::UnknownTransaction => "unknown transaction",
            RpcError::InternalError => "internal error",
            RpcError::Failed => "failed",
            RpcError::Nil => "missing required argument",
        }
    }

    pub fn to_value(self) -> Value {
        json!({ "code": self.code(), "message": self.message() })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for RpcError {}
