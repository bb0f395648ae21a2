/// Chain communication module
///
/// JSON-RPC client for the public node, fallback client for the private
/// relay, and raw-transaction decoding.

pub mod decode;
pub mod private_relay;
pub mod rpc_client;

use serde_json::Value;

pub use decode::{decode_raw_transaction, DecodedTx};
pub use private_relay::PrivateRelayClient;
pub use rpc_client::{EthRpcClient, TxReceipt};

/// Errors at the chain-client boundary.
///
/// A closed enum so the gateway can pattern-match instead of string-sniffing:
/// `InvalidPayload` is the caller's fault and never retried, `Unavailable` is
/// transport-level and transient, `Rpc` carries the node's own error object
/// verbatim (contract-revert decoding downstream depends on the message and
/// data being preserved).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("chain unavailable: {0}")]
    Unavailable(String),
    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl ChainError {
    pub fn from_rpc_error(error: &Value) -> Self {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-32000);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        let data = error.get("data").cloned().filter(|d| !d.is_null());
        ChainError::Rpc {
            code,
            message,
            data,
        }
    }
}
