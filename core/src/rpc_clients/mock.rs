//! Scripted JSON-RPC transport for exercising clients without a live endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task;

use alloy::{
    providers::RootProvider,
    rpc::{
        client::RpcClient,
        json_rpc::{RequestPacket, ResponsePacket, SerializedRequest},
    },
    transports::{TransportError, TransportErrorKind, TransportFut},
};
use serde::Serialize;
use serde_json::{Value, json};
use tower::Service;

use super::{BundlerClient, WalletClient};

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Success(Value),
    Error { code: i64, message: String },
    TransportFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Default)]
struct ScriptState {
    queued: HashMap<String, VecDeque<ScriptedResponse>>,
    sticky: HashMap<String, ScriptedResponse>,
    calls: Vec<RecordedCall>,
}

/// Answers each method from a per-method queue, falling back to a sticky answer.
///
/// Unscripted methods fail with a `-32601` error response.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: &str, response: ScriptedResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(method.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn push_success(&self, method: &str, result: impl Serialize) -> &Self {
        self.push(
            method,
            ScriptedResponse::Success(serde_json::to_value(result).unwrap()),
        )
    }

    pub fn push_error(&self, method: &str, code: i64, message: &str) -> &Self {
        self.push(
            method,
            ScriptedResponse::Error {
                code,
                message: message.to_string(),
            },
        )
    }

    pub fn push_transport_failure(&self, method: &str, message: &str) -> &Self {
        self.push(method, ScriptedResponse::TransportFailure(message.to_string()))
    }

    /// Answer used whenever the method's queue is empty.
    pub fn set_sticky(&self, method: &str, result: impl Serialize) -> &Self {
        self.state.lock().unwrap().sticky.insert(
            method.to_string(),
            ScriptedResponse::Success(serde_json::to_value(result).unwrap()),
        );
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls_to(method).len()
    }

    pub fn rpc_client(&self) -> RpcClient {
        RpcClient::builder().transport(self.clone(), true)
    }

    pub fn wallet_client(&self) -> WalletClient {
        WalletClient::from_rpc_client(self.rpc_client())
    }

    pub fn bundler_client(&self) -> BundlerClient {
        BundlerClient::from_rpc_client(self.rpc_client())
    }

    pub fn provider(&self) -> RootProvider {
        RootProvider::new(self.rpc_client())
    }

    fn answer(&self, req: &SerializedRequest) -> Result<Value, TransportError> {
        let params = req
            .params()
            .and_then(|raw| serde_json::from_str(raw.get()).ok())
            .unwrap_or(Value::Null);

        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: req.method().to_string(),
            params,
        });

        let queued = state
            .queued
            .get_mut(req.method())
            .and_then(VecDeque::pop_front);
        let scripted = match queued {
            Some(response) => Some(response),
            None => state.sticky.get(req.method()).cloned(),
        };

        let id = serde_json::to_value(req.id()).unwrap_or(Value::Null);
        match scripted {
            Some(ScriptedResponse::Success(result)) => {
                Ok(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            }
            Some(ScriptedResponse::Error { code, message }) => Ok(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message },
            })),
            Some(ScriptedResponse::TransportFailure(message)) => {
                Err(TransportErrorKind::custom_str(&message))
            }
            None => Ok(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("unscripted method {}", req.method()) },
            })),
        }
    }

    fn respond(&self, req: RequestPacket) -> Result<ResponsePacket, TransportError> {
        let body = match &req {
            RequestPacket::Single(single) => self.answer(single)?,
            RequestPacket::Batch(batch) => Value::Array(
                batch
                    .iter()
                    .map(|single| self.answer(single))
                    .collect::<Result<_, _>>()?,
            ),
        };

        let text = body.to_string();
        serde_json::from_str(&text).map_err(|err| TransportError::deser_err(err, text.as_str()))
    }
}

impl Service<RequestPacket> for ScriptedTransport {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let result = self.respond(req);
        Box::pin(async move { result })
    }
}
