/// Private (MEV-protected) relay client
///
/// Fallback submission path only. Speaks the same JSON-RPC envelope as the
/// public node but through a simple reqwest client with its own timeout.

use serde_json::{json, Value};
use std::time::Duration;

use super::ChainError;

pub struct PrivateRelayClient {
    url: String,
    client: reqwest::Client,
}

impl PrivateRelayClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Unavailable(format!("relay client build failed: {}", e)))?;

        tracing::info!("PrivateRelayClient initialized: {}", url);

        Ok(Self { url, client })
    }

    /// Submit a raw signed transaction through the private relay.
    pub async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String, ChainError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendRawTransaction",
            "params": [raw_tx],
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("private relay unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Unavailable(format!(
                "private relay HTTP error: {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Unavailable(format!("private relay response parse failed: {}", e)))?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ChainError::from_rpc_error(error));
        }

        body.get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ChainError::Unavailable("private relay returned no transaction hash".to_string())
            })
    }
}
