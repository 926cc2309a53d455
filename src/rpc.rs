//! JSON-RPC client for the execution service.
//!
//! The service keeps the chain state in-process and exposes deploy, declare,
//! invoke, read-only call and snapshot/restore as `tayt_*` methods. Felts
//! travel as `0x`-prefixed hex strings.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tayt_core::{
    CallInfo, ClassHash, ExecutionClient, ExecutionError, Invocation, RevertError, StateHandle,
};
use tayt_types::{CompiledArtifact, Felt};
use tracing::trace;

/// JSON-RPC error code the service uses for reverted calls.
pub const REVERT_ERROR_CODE: i64 = 40;

/// Blocking JSON-RPC client implementing [`ExecutionClient`].
pub struct RpcExecutionClient {
    endpoint: String,
    agent: ureq::Agent,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClassHashResult {
    class_hash: Felt,
}

#[derive(Debug, Deserialize)]
struct SnapshotResult {
    id: u64,
}

impl RpcExecutionClient {
    const DEFAULT_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    pub fn new(endpoint: &str) -> Self {
        Self::with_timeouts(
            endpoint,
            Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .timeout_connect(connect_timeout)
                .build(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Class hash the service computes for `artifact`, without declaring it.
    pub fn class_hash(&self, artifact: &CompiledArtifact) -> Result<ClassHash> {
        let result = self
            .request("tayt_classHash", json!({ "artifact": artifact.raw }))
            .map_err(|e| anyhow!("{e}"))?;
        let parsed: ClassHashResult = serde_json::from_value(result)
            .map_err(|e| anyhow!("malformed tayt_classHash result: {e}"))?;
        Ok(parsed.class_hash)
    }

    fn request(&self, method: &str, params: Value) -> Result<Value, ExecutionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "rpc request");

        let response = match self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(&body)
        {
            Ok(response) => response,
            // Some servers answer JSON-RPC errors with a non-2xx status.
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => {
                return Err(ExecutionError::Client(format!(
                    "{method} request to {} failed: {e}",
                    self.endpoint
                )))
            }
        };
        let parsed: RpcResponse = response.into_json().map_err(|e| {
            ExecutionError::Client(format!("failed to parse {method} response: {e}"))
        })?;
        decode_response(method, parsed)
    }

    fn request_as<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ExecutionError> {
        let result = self.request(method, params)?;
        serde_json::from_value(result)
            .map_err(|e| ExecutionError::Client(format!("malformed {method} result: {e}")))
    }
}

fn decode_response(method: &str, response: RpcResponse) -> Result<Value, ExecutionError> {
    match (response.result, response.error) {
        (_, Some(error)) if error.code == REVERT_ERROR_CODE => {
            Err(ExecutionError::Revert(RevertError::new(error.message)))
        }
        (_, Some(error)) => Err(ExecutionError::Client(format!(
            "{method} failed with code {}: {}",
            error.code, error.message
        ))),
        (Some(result), None) => Ok(result),
        (None, None) => Err(ExecutionError::Client(format!(
            "{method} response has neither result nor error"
        ))),
    }
}

fn invocation_params(call: &Invocation<'_>) -> Value {
    json!({
        "contract_address": call.instance,
        "function": call.function,
        "calldata": call.args,
        "caller_address": call.sender,
        "value": call.value,
        "entry_point_type": call.kind,
        "nonce": call.nonce,
    })
}

impl ExecutionClient for RpcExecutionClient {
    fn deploy(
        &mut self,
        artifact: &CompiledArtifact,
        constructor_args: &[Felt],
    ) -> Result<CallInfo, ExecutionError> {
        self.request_as(
            "tayt_deploy",
            json!({
                "artifact": artifact.raw,
                "constructor_calldata": constructor_args,
            }),
        )
    }

    fn declare(&mut self, artifact: &CompiledArtifact) -> Result<ClassHash, ExecutionError> {
        let result: ClassHashResult =
            self.request_as("tayt_declare", json!({ "artifact": artifact.raw }))?;
        Ok(result.class_hash)
    }

    fn invoke(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError> {
        self.request_as("tayt_invoke", invocation_params(call))
    }

    fn call_readonly(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError> {
        self.request_as("tayt_call", invocation_params(call))
    }

    fn snapshot(&mut self) -> Result<StateHandle, ExecutionError> {
        let result: SnapshotResult = self.request_as("tayt_snapshot", json!({}))?;
        Ok(StateHandle(result.id))
    }

    fn restore(&mut self, handle: &StateHandle) -> Result<(), ExecutionError> {
        self.request("tayt_restore", json!({ "id": handle.0 }))?;
        Ok(())
    }
}
