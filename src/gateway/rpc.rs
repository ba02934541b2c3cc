use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::RetrySettings,
    utils::{is_transient_error, with_retry},
};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Minimal Solana JSON-RPC client used to locate the chain head.
pub struct SolanaRpcClient {
    http: reqwest::Client,
    url: String,
    retry: RetrySettings,
}

impl SolanaRpcClient {
    pub fn new(url: &str, timeout: Duration, retry: RetrySettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            url: url.to_string(),
            retry,
        })
    }

    /// Latest finalized slot.
    pub async fn get_slot(&self) -> anyhow::Result<u64> {
        with_retry(&self.retry, "getSlot", is_transient_error, || {
            self.call::<u64>("getSlot", json!([{"commitment": "finalized"}]))
        })
        .await
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("RPC {} request failed", method))?
            .error_for_status()
            .with_context(|| format!("RPC {} returned an error status", method))?
            .json()
            .await
            .with_context(|| format!("RPC {} returned an invalid body", method))?;

        parse_response(method, response)
    }
}

fn parse_response<T>(method: &str, response: RpcResponse<T>) -> anyhow::Result<T> {
    if let Some(err) = response.error {
        return Err(anyhow!("RPC {} failed: {} ({})", method, err.message, err.code));
    }
    response
        .result
        .ok_or_else(|| anyhow!("RPC {} returned no result", method))
}
