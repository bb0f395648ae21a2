/// Ethereum JSON-RPC client with circuit breaker
///
/// All gateway submissions and reconciliation receipt lookups go through
/// here. Every call carries a bounded timeout; repeated transport failures
/// trip the breaker so a dead node does not hold every request for the full
/// timeout budget. JSON-RPC level errors (reverts, bad params) do not trip
/// the breaker.

use alloy_primitives::U256;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Buf, Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::ChainError;
use crate::metrics::prometheus as metrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Receipt fields the reconciler and reward pipeline care about.
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub status: bool,
    pub block_number: u64,
    pub gas_used: U256,
    pub effective_gas_price: U256,
}

impl TxReceipt {
    /// Parse an `eth_getTransactionReceipt` result object.
    pub fn from_rpc_value(v: &Value) -> Result<Self, ChainError> {
        let status = parse_quantity(v.get("status"))
            .ok_or_else(|| ChainError::Unavailable("receipt missing status".to_string()))?;
        let block_number = parse_quantity(v.get("blockNumber"))
            .ok_or_else(|| ChainError::Unavailable("receipt missing blockNumber".to_string()))?;
        let gas_used = parse_quantity(v.get("gasUsed"))
            .ok_or_else(|| ChainError::Unavailable("receipt missing gasUsed".to_string()))?;
        let effective_gas_price = parse_quantity(v.get("effectiveGasPrice"))
            .ok_or_else(|| ChainError::Unavailable("receipt missing effectiveGasPrice".to_string()))?;
        Ok(Self {
            status: status == U256::from(1),
            block_number: block_number.try_into().map_err(|_| {
                ChainError::Unavailable("receipt blockNumber out of range".to_string())
            })?,
            gas_used,
            effective_gas_price,
        })
    }
}

/// Parse a JSON-RPC hex quantity ("0x1b4") or plain integer.
fn parse_quantity(v: Option<&Value>) -> Option<U256> {
    match v? {
        Value::String(s) => {
            let stripped = s.strip_prefix("0x").unwrap_or(s);
            U256::from_str_radix(stripped, 16).ok()
        }
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

const BREAKER_TRIP_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
enum BreakerState {
    Closed,
    Open { since: Instant },
    /// One probe call is in flight; everyone else waits for its verdict.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    trip_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(trip_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            trip_threshold,
            cooldown,
        }
    }

    /// Whether a call may proceed. Once the cooldown elapses exactly one
    /// caller is admitted as the probe; the circuit stays half-open until
    /// that probe resolves.
    fn admit(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    tracing::info!("Chain RPC circuit half-open, sending probe");
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&mut self) {
        if self.state != BreakerState::Closed || self.consecutive_failures > 0 {
            tracing::info!("Chain RPC circuit closed");
        }
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        match self.state {
            BreakerState::HalfOpen => {
                tracing::warn!(
                    "Chain RPC probe failed, circuit re-opened for {}s",
                    self.cooldown.as_secs()
                );
                self.state = BreakerState::Open {
                    since: Instant::now(),
                };
            }
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.trip_threshold {
                    tracing::error!(
                        "Chain RPC circuit opened after {} consecutive failures, cooling down for {}s",
                        self.consecutive_failures,
                        self.cooldown.as_secs()
                    );
                    self.state = BreakerState::Open {
                        since: Instant::now(),
                    };
                }
            }
            BreakerState::Open { .. } => {}
        }
    }
}

pub struct EthRpcClient {
    base_url: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
    circuit_breaker: Arc<RwLock<CircuitBreaker>>,
}

impl EthRpcClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build_http();

        tracing::info!("EthRpcClient initialized: {}", base_url);

        Self {
            base_url,
            timeout,
            client,
            circuit_breaker: Arc::new(RwLock::new(CircuitBreaker::new(
                BREAKER_TRIP_THRESHOLD,
                BREAKER_COOLDOWN,
            ))),
        }
    }

    /// Make a JSON-RPC call to the node.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        metrics::inc_rpc_requests();

        let res = self.call_inner(method, params).await;
        if res.is_err() {
            metrics::inc_rpc_errors();
        }
        res
    }

    async fn call_inner(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        {
            let mut breaker = self.circuit_breaker.write().await;
            if !breaker.admit() {
                return Err(ChainError::Unavailable(
                    "chain RPC circuit is open".to_string(),
                ));
            }
        }

        let payload = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: method.to_string(),
            params,
        };

        let body_bytes = serde_json::to_vec(&payload)
            .map_err(|e| ChainError::Unavailable(format!("request encoding failed: {}", e)))?;
        let body = Full::new(Bytes::from(body_bytes));

        let req = Request::builder()
            .method(Method::POST)
            .uri(&self.base_url)
            .header("Content-Type", "application/json")
            .body(body)
            .map_err(|e| ChainError::Unavailable(format!("request build failed: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| {
                // A timeout counts against the breaker like any transport fault
                ChainError::Unavailable("RPC request timeout".to_string())
            })
            .and_then(|r| {
                r.map_err(|e| ChainError::Unavailable(format!("RPC connection failed: {}", e)))
            });

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let mut breaker = self.circuit_breaker.write().await;
                breaker.record_failure();
                return Err(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let mut breaker = self.circuit_breaker.write().await;
            breaker.record_failure();
            return Err(ChainError::Unavailable(format!("RPC HTTP error: {}", status)));
        }

        let body_bytes = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                self.circuit_breaker.write().await.record_failure();
                return Err(ChainError::Unavailable(format!("RPC body read failed: {}", e)));
            }
        };
        let rpc_response: RpcResponse = match serde_json::from_reader(body_bytes.reader()) {
            Ok(r) => r,
            Err(e) => {
                self.circuit_breaker.write().await.record_failure();
                return Err(ChainError::Unavailable(format!(
                    "RPC response parse failed: {}",
                    e
                )));
            }
        };

        // A well-formed node reply means the transport is healthy, even when
        // it carries an application-level error (revert, bad params), so it
        // closes the circuit either way.
        {
            let mut breaker = self.circuit_breaker.write().await;
            breaker.record_success();
        }
        if let Some(error) = rpc_response.error {
            tracing::debug!("RPC error from node for {}: {:?}", method, error);
            return Err(ChainError::from_rpc_error(&error));
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    /// Submit a raw signed transaction; returns the node-reported hash.
    pub async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String, ChainError> {
        let result = self.call("eth_sendRawTransaction", json!([raw_tx])).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ChainError::Unavailable("node returned no transaction hash".to_string()))
    }

    /// Fetch a transaction receipt; `None` means the transaction is not mined.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let result = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        TxReceipt::from_rpc_value(&result).map(Some)
    }

    /// Forward an arbitrary read method unchanged.
    pub async fn forward(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.call(method, params).await
    }
}
