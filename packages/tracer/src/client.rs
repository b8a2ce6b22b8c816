//! Enrichment Client
//!
//! [`Connection`] bundles the streaming and call transports with the chain id
//! fetched at construction. It performs the per-hash lookup and the traced
//! call, each under its own timeout.

use alloy::primitives::TxHash;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use crate::config::CallSettings;
use crate::decoder::{decode_call_frame, CallFrame, DecodeError};
use crate::request::{CallArgs, PendingTransaction};
use crate::rpc::{NodeRpc, PendingSubscription, RpcError, DEBUG_TRACE_CALL};

/// Errors raised while building a [`Connection`]
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unsupported endpoint {0}: subscriptions need a ws:// or IPC endpoint")]
    UnsupportedEndpoint(String),

    #[error("Failed to open streaming transport: {0}")]
    StreamDial(RpcError),

    #[error("Failed to open call transport: {0}")]
    CallDial(RpcError),

    #[error("Failed to fetch chain id: {0}")]
    ChainId(RpcError),
}

/// Errors from a transaction lookup (not-found is `Ok(None)`, not an error)
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Lookup failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from a traced call
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Trace call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Trace call failed: {0}")]
    Rpc(RpcError),

    #[error("Failed to encode trace params: {0}")]
    Encode(serde_json::Error),

    #[error("Failed to decode trace: {0}")]
    Decode(#[from] DecodeError),
}

/// Log settings the node applies while tracing
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfig {
    pub disable_stack: bool,
    pub disable_storage: bool,
    pub debug: bool,
}

/// Trace config object passed as the third `debug_traceCall` param
///
/// The node embeds its log config, so its fields sit at the top level.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TraceOptions {
    pub tracer: String,
    #[serde(flatten)]
    pub log_config: LogConfig,
}

impl TraceOptions {
    /// Options for the given tracer with stack and storage capture disabled
    pub fn for_tracer(tracer: impl Into<String>) -> Self {
        Self {
            tracer: tracer.into(),
            log_config: LogConfig {
                disable_stack: true,
                disable_storage: true,
                debug: true,
            },
        }
    }
}

/// A looked-up transaction together with its call trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedCall {
    pub transaction: PendingTransaction,
    pub frame: CallFrame,
}

/// Node connection shared by the dispatcher and every trace worker
///
/// Read-only after construction.
pub struct Connection<R> {
    stream: R,
    calls: R,
    chain_id: u64,
    settings: CallSettings,
}

impl<R: NodeRpc> Connection<R> {
    /// Open the streaming transport, then the call transport, then fetch the
    /// chain id, calling `dial` once per transport
    ///
    /// Fails on the first step that errors; transports opened by earlier
    /// steps are dropped before returning.
    pub async fn open<F, Fut>(mut dial: F, settings: CallSettings) -> Result<Self, ConnectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, RpcError>>,
    {
        let stream = dial().await.map_err(ConnectionError::StreamDial)?;

        let calls = match dial().await {
            Ok(calls) => calls,
            Err(e) => {
                drop(stream);
                debug!("Released streaming transport after call transport failure");
                return Err(ConnectionError::CallDial(e));
            }
        };

        Self::from_parts(stream, calls, settings).await
    }

    /// Finish construction from two opened transports by fetching the chain id
    ///
    /// On failure both transports are dropped before the error is returned.
    pub async fn from_parts(
        stream: R,
        calls: R,
        settings: CallSettings,
    ) -> Result<Self, ConnectionError> {
        let chain_id = match calls.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                drop(calls);
                drop(stream);
                debug!("Released transports after chain id failure");
                return Err(ConnectionError::ChainId(e));
            }
        };

        Ok(Self {
            stream,
            calls,
            chain_id,
            settings,
        })
    }

    /// Chain id cached at construction
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Per-call settings
    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Subscribe to pending transaction hashes over the streaming transport
    pub async fn subscribe(
        &self,
        sink: mpsc::Sender<TxHash>,
    ) -> Result<PendingSubscription, RpcError> {
        self.stream.subscribe_pending(sink).await
    }

    /// Look up a transaction by hash
    ///
    /// # Returns
    /// `Ok(None)` when the node does not know the hash (nothing to do)
    pub async fn lookup(&self, hash: TxHash) -> Result<Option<PendingTransaction>, LookupError> {
        let limit = self.settings.lookup_timeout;
        match timeout(limit, self.calls.transaction_by_hash(hash)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LookupError::Timeout(limit)),
        }
    }

    /// Look up a transaction and trace it as a call
    ///
    /// # Returns
    /// `Ok(None)` when the transaction is unknown or cannot be turned into
    /// call arguments; such hashes are skipped, not failed.
    pub async fn trace(&self, hash: TxHash, mode: &str) -> Result<Option<TracedCall>, TraceError> {
        let Some(transaction) = self.lookup(hash).await? else {
            return Ok(None);
        };

        let Ok(args) = CallArgs::from_transaction(&transaction, self.chain_id) else {
            return Ok(None);
        };

        let frame = self.trace_call(&args, mode).await?;
        Ok(Some(TracedCall { transaction, frame }))
    }

    /// Issue `debug_traceCall` for the given arguments
    pub async fn trace_call(&self, args: &CallArgs, mode: &str) -> Result<CallFrame, TraceError> {
        let options = TraceOptions::for_tracer(self.settings.tracer.as_str());
        let params = serde_json::to_value((args, mode, &options)).map_err(TraceError::Encode)?;

        let limit = self.settings.call_timeout;
        let raw = match timeout(limit, self.calls.call(DEBUG_TRACE_CALL, params)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(TraceError::Rpc(e)),
            Err(_) => return Err(TraceError::Timeout(limit)),
        };

        Ok(decode_call_frame(raw)?)
    }
}
