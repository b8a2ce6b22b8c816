//! Trace Worker
//!
//! One detached task per pending hash: lookup, traced call, report. Nothing
//! flows back to the dispatcher; failures and panics end as a reporter call.

use alloy::primitives::TxHash;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;

use crate::client::Connection;
use crate::report::TraceReporter;
use crate::rpc::NodeRpc;

/// Trace one hash and report the outcome
pub async fn trace_transaction<R: NodeRpc>(
    connection: Arc<Connection<R>>,
    hash: TxHash,
    mode: Arc<str>,
    reporter: Arc<dyn TraceReporter>,
) {
    let outcome = AssertUnwindSafe(connection.trace(hash, &mode))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(Some(call))) => reporter.traced(hash, &call),
        Ok(Ok(None)) => reporter.skipped(hash),
        Ok(Err(err)) => reporter.failed(hash, &err),
        Err(payload) => reporter.panicked(hash, &panic_message(payload.as_ref())),
    }
}

/// Spawn a detached worker holding `permit` until it finishes
pub fn spawn_trace_worker<R: NodeRpc>(
    connection: Arc<Connection<R>>,
    hash: TxHash,
    mode: Arc<str>,
    reporter: Arc<dyn TraceReporter>,
    permit: OwnedSemaphorePermit,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _permit = permit;
        trace_transaction(connection, hash, mode, reporter).await;
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
