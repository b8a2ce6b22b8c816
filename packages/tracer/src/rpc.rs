//! Node RPC Seam
//!
//! The subset of node functionality the trace pipeline depends on: chain id,
//! pending-hash subscription, transaction lookup and a generic JSON-RPC call.
//! The alloy-backed implementation lives in [`crate::connection`].

use alloy::primitives::TxHash;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::request::PendingTransaction;

/// Name of the node's pending transaction subscription
pub const PENDING_TRANSACTIONS_TOPIC: &str = "newPendingTransactions";

/// Method name of the node's call tracing endpoint
pub const DEBUG_TRACE_CALL: &str = "debug_traceCall";

/// Method name of the transaction point lookup
pub const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";

/// Errors returned by a node call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node returned error: {0}")]
    Remote(String),

    #[error("Malformed response: {0}")]
    Response(String),
}

/// Errors signalled by (or while re-establishing) the pending subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Subscription stream closed")]
    Closed,

    #[error("Subscription transport error: {0}")]
    Transport(String),

    #[error("Subscribe request failed: {0}")]
    Subscribe(#[from] RpcError),

    #[error("Resubscription failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Handle to a live pending-hash subscription
///
/// Hashes flow into the sink handed to [`NodeRpc::subscribe_pending`]; this
/// handle carries the subscription's error signal. Dropping it stops the
/// forwarding task, if any.
#[derive(Debug)]
pub struct PendingSubscription {
    errors: oneshot::Receiver<SubscriptionError>,
    forwarder: Option<JoinHandle<()>>,
}

impl PendingSubscription {
    /// Create a handle fed by the given error signal
    pub fn new(errors: oneshot::Receiver<SubscriptionError>) -> Self {
        Self {
            errors,
            forwarder: None,
        }
    }

    /// Attach the task forwarding subscription items into the sink
    pub fn with_forwarder(mut self, forwarder: JoinHandle<()>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Wait until the subscription fails
    ///
    /// A signal sender dropped without an error counts as [`SubscriptionError::Closed`].
    /// Must not be awaited again once it has resolved.
    pub async fn closed(&mut self) -> SubscriptionError {
        match (&mut self.errors).await {
            Ok(err) => err,
            Err(_) => SubscriptionError::Closed,
        }
    }
}

impl Drop for PendingSubscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// What the trace pipeline needs from a node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeRpc: Send + Sync + 'static {
    /// Chain identifier of the connected network
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Subscribe to pending transaction hashes, pushing each into `sink`
    async fn subscribe_pending(
        &self,
        sink: mpsc::Sender<TxHash>,
    ) -> Result<PendingSubscription, RpcError>;

    /// Look up a transaction; `Ok(None)` when the node does not know it
    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<PendingTransaction>, RpcError>;

    /// Issue a generic JSON-RPC call with positional params
    async fn call(&self, method: &'static str, params: Value) -> Result<Value, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_closed_returns_signalled_error() {
        let (tx, rx) = oneshot::channel();
        let mut sub = PendingSubscription::new(rx);
        tx.send(SubscriptionError::Transport("socket reset".into()))
            .unwrap();

        assert_eq!(
            sub.closed().await,
            SubscriptionError::Transport("socket reset".into())
        );
    }

    #[tokio::test]
    async fn test_closed_when_signal_dropped() {
        let (tx, rx) = oneshot::channel::<SubscriptionError>();
        let mut sub = PendingSubscription::new(rx);
        drop(tx);

        assert_eq!(sub.closed().await, SubscriptionError::Closed);
    }

    #[test]
    fn test_closed_pending_while_signal_alive() {
        let (tx, rx) = oneshot::channel::<SubscriptionError>();
        let mut sub = PendingSubscription::new(rx);
        let mut closed = task::spawn(sub.closed());

        assert_pending!(closed.poll());
        tx.send(SubscriptionError::Closed).unwrap();
        assert!(closed.is_woken());
        assert_ready_eq!(closed.poll(), SubscriptionError::Closed);
    }

    #[tokio::test]
    async fn test_drop_aborts_forwarder() {
        let (_tx, rx) = oneshot::channel::<SubscriptionError>();
        let (guard_tx, guard_rx) = oneshot::channel::<()>();
        let forwarder = tokio::spawn(async move {
            let _guard = guard_tx;
            std::future::pending::<()>().await
        });
        let sub = PendingSubscription::new(rx).with_forwarder(forwarder);

        drop(sub);
        assert!(guard_rx.await.is_err());
    }

    #[test]
    fn test_error_display() {
        let err = SubscriptionError::RetriesExhausted {
            attempts: 10,
            last_error: "connection refused".into(),
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("connection refused"));

        let err = SubscriptionError::from(RpcError::Transport("eof".into()));
        assert!(err.to_string().contains("eof"));
    }
}
