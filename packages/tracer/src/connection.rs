//! Node Transport
//!
//! Endpoint parsing and the alloy pub/sub provider behind [`NodeRpc`].
//! Supports WebSocket (`ws://`, `wss://`) and Unix IPC socket endpoints; plain
//! HTTP cannot carry subscriptions and is rejected.

use alloy::primitives::TxHash;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::pubsub::PubSubFrontend;
use alloy::transports::ipc::IpcConnect;
use alloy::transports::ws::WsConnect;
use alloy::transports::{RpcError as TransportRpcError, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::{Connection, ConnectionError};
use crate::config::CallSettings;
use crate::request::PendingTransaction;
use crate::rpc::{
    NodeRpc, PendingSubscription, RpcError, SubscriptionError, GET_TRANSACTION_BY_HASH,
    PENDING_TRANSACTIONS_TOPIC,
};

/// Default IPC socket paths to try
pub const DEFAULT_IPC_PATHS: &[&str] = &[
    "/tmp/anvil.ipc",
    "~/.foundry/anvil.ipc",
    "/var/run/geth.ipc",
    "~/.ethereum/geth.ipc",
];

/// A node endpoint able to carry subscriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Ws(String),
    /// Absolute IPC socket path (`~` already expanded)
    Ipc(String),
}

impl Endpoint {
    /// Parse an endpoint string
    pub fn parse(raw: &str) -> Result<Self, ConnectionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConnectionError::InvalidEndpoint(
                "Endpoint cannot be empty".to_string(),
            ));
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            return Ok(Endpoint::Ws(raw.to_string()));
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Err(ConnectionError::UnsupportedEndpoint(raw.to_string()));
        }
        if lower.contains("://") {
            return Err(ConnectionError::InvalidEndpoint(raw.to_string()));
        }

        let expanded = expand_path(raw);
        if !expanded.ends_with(".ipc") && !expanded.contains("geth") && !expanded.contains("anvil") {
            warn!("IPC path '{}' may not be a valid socket path", raw);
        }
        Ok(Endpoint::Ipc(expanded))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ws(url) => f.write_str(url),
            Endpoint::Ipc(path) => write!(f, "ipc:{path}"),
        }
    }
}

/// Check if an IPC socket exists at the given path
pub fn socket_exists(path: &str) -> bool {
    let expanded = expand_path(path);
    Path::new(&expanded).exists()
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Find the first available IPC socket from default paths
pub fn find_ipc_socket() -> Option<String> {
    DEFAULT_IPC_PATHS
        .iter()
        .find(|path| socket_exists(path))
        .map(|path| expand_path(path))
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportRpcError::ErrorResp(payload) => RpcError::Remote(payload.to_string()),
            TransportRpcError::DeserError { err, .. } => RpcError::Response(err.to_string()),
            other => RpcError::Transport(other.to_string()),
        }
    }
}

/// [`NodeRpc`] backed by an alloy pub/sub provider
pub struct AlloyNode {
    provider: RootProvider<PubSubFrontend>,
}

impl AlloyNode {
    /// Open a provider on the endpoint
    pub async fn dial(endpoint: &Endpoint) -> Result<Self, RpcError> {
        let provider = match endpoint {
            Endpoint::Ws(url) => {
                ProviderBuilder::new()
                    .on_ws(WsConnect::new(url.clone()))
                    .await?
            }
            Endpoint::Ipc(path) => {
                if !Path::new(path).exists() {
                    return Err(RpcError::Transport(format!(
                        "IPC socket not found at path: {path}"
                    )));
                }
                let ipc: IpcConnect<String> = IpcConnect::new(path.clone());
                ProviderBuilder::new().on_ipc(ipc).await?
            }
        };
        Ok(Self { provider })
    }
}

#[async_trait]
impl NodeRpc for AlloyNode {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn subscribe_pending(
        &self,
        sink: mpsc::Sender<TxHash>,
    ) -> Result<PendingSubscription, RpcError> {
        let mut subscription = self.provider.subscribe_pending_transactions().await?;
        debug!(topic = PENDING_TRANSACTIONS_TOPIC, "Subscribed to pending transactions");

        let (err_tx, err_rx) = oneshot::channel();
        let forwarder = tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(hash) => {
                        // Receiver gone means the dispatcher stopped
                        if sink.send(hash).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Pending transaction subscription lagged");
                    }
                    Err(RecvError::Closed) => {
                        let _ = err_tx.send(SubscriptionError::Closed);
                        return;
                    }
                }
            }
        });

        Ok(PendingSubscription::new(err_rx).with_forwarder(forwarder))
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<PendingTransaction>, RpcError> {
        Ok(self
            .provider
            .raw_request(GET_TRANSACTION_BY_HASH.into(), (hash,))
            .await?)
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        Ok(self.provider.raw_request(method.into(), params).await?)
    }
}

impl Connection<AlloyNode> {
    /// Connect to a node: streaming transport, call transport, then chain id
    ///
    /// Fails on the first step that errors; transports opened by earlier
    /// steps are dropped before returning.
    pub async fn connect(
        endpoint: &Endpoint,
        settings: CallSettings,
    ) -> Result<Self, ConnectionError> {
        info!(%endpoint, "Connecting to node");

        let connection = Self::open(|| AlloyNode::dial(endpoint), settings).await?;
        info!(%endpoint, chain_id = connection.chain_id(), "Connected to node");
        Ok(connection)
    }
}
