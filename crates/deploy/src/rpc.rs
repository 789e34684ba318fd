//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::{future::Future, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("transport failure calling {method}: {message}")]
    Transport { method: String, message: String },

    /// The node answered with a JSON-RPC error object.
    #[error("{method} returned error {code}: {message}")]
    Response {
        method: String,
        code: i64,
        message: String,
    },

    /// The node answered with something that is not a valid response.
    #[error("invalid {method} response: {message}")]
    Decode { method: String, message: String },
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let transport = |e: reqwest::Error| RpcError::Transport {
        method: method.to_string(),
        message: e.to_string(),
    };

    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(transport)?;

    let body: Value = response.json().await.map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })?;

    parse_response(method, body)
}

/// Extract the `result` of a JSON-RPC response body.
pub fn parse_response<T: DeserializeOwned>(method: &str, mut body: Value) -> Result<T, RpcError> {
    if let Some(error) = body.get("error") {
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result = body
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            message: "no result in response".to_string(),
        })?;

    serde_json::from_value(result).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(method: &str, quantity: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: format!("invalid quantity {quantity:?}: {e}"),
    })
}

/// [`poll_until`] gave up before `check` yielded a value.
#[derive(Debug)]
pub struct PollTimeout {
    /// The most recent failure of `check`, if any.
    pub last_error: Option<RpcError>,
}

/// Repeatedly call `check` until it yields a value or `timeout` elapses.
///
/// Errors returned by `check` are logged and polling continues; the last one
/// is reported in the [`PollTimeout`].
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check: F,
) -> Result<T, PollTimeout>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, RpcError>>,
{
    let mut last_error = None;

    let polled = tokio::time::timeout(timeout, async {
        loop {
            match check().await {
                Ok(Some(value)) => return value,
                Ok(None) => {
                    tracing::trace!(target_name = %name, "Not ready yet, polling again...");
                }
                Err(e) => {
                    tracing::warn!(error = %e, target_name = %name, "Poll failed, retrying...");
                    last_error = Some(e);
                }
            }

            tokio::time::sleep(interval).await;
        }
    })
    .await;

    polled.map_err(|_| PollTimeout { last_error })
}
