//! Trace Reporting
//!
//! Every observable effect of the pipeline goes through a [`TraceReporter`].
//! [`LogReporter`] turns outcomes into structured log records.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::{TraceError, TracedCall};
use crate::rpc::SubscriptionError;

/// Receives the outcome of every dispatched hash and loop-level events
pub trait TraceReporter: Send + Sync + 'static {
    /// A transaction was traced
    fn traced(&self, hash: TxHash, call: &TracedCall);

    /// Nothing to do for this hash (unknown or untraceable transaction)
    fn skipped(&self, _hash: TxHash) {}

    /// Lookup or trace failed
    fn failed(&self, hash: TxHash, error: &TraceError);

    /// The worker panicked; the panic did not escape the worker
    fn panicked(&self, hash: TxHash, message: &str);

    /// All worker permits were taken and the hash was not traced
    fn dropped(&self, hash: TxHash);

    /// No hash arrived within the idle timeout
    fn idle(&self, waited: Duration);

    /// The pending subscription failed; a resubscription follows
    fn subscription_lost(&self, error: &SubscriptionError);
}

/// Summary of one traced call, as logged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    /// Transaction hash with 0x prefix
    pub hash: String,
    pub from: String,
    /// Recipient, empty for contract creation
    pub to: String,
    /// Method selector with 0x prefix, empty for plain transfers
    pub selector: String,
    pub gas_used: String,
    /// Number of nested calls below the top-level frame
    pub sub_calls: usize,
    pub depth: usize,
    pub reverted: bool,
}

impl TraceSummary {
    pub fn from_traced(hash: TxHash, call: &TracedCall) -> Self {
        let frame = &call.frame;
        TraceSummary {
            hash: format_hash(hash),
            from: frame.from.clone(),
            to: frame.to.clone(),
            selector: frame
                .selector()
                .map(|id| format!("0x{}", hex::encode(id)))
                .unwrap_or_default(),
            gas_used: frame.gas_used.clone(),
            sub_calls: frame.node_count() - 1,
            depth: frame.depth(),
            reverted: frame.is_reverted(),
        }
    }
}

/// Format a transaction hash as hex string with 0x prefix
pub fn format_hash(hash: TxHash) -> String {
    format!("{:#x}", hash)
}

/// Reporter writing every outcome to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl TraceReporter for LogReporter {
    fn traced(&self, hash: TxHash, call: &TracedCall) {
        let summary = TraceSummary::from_traced(hash, call);
        info!(
            hash = %summary.hash,
            from = %summary.from,
            to = %summary.to,
            selector = %summary.selector,
            gas_used = %summary.gas_used,
            sub_calls = summary.sub_calls,
            depth = summary.depth,
            reverted = summary.reverted,
            "Traced pending transaction"
        );
    }

    fn failed(&self, hash: TxHash, error: &TraceError) {
        error!(hash = %format_hash(hash), %error, "Trace failed");
    }

    fn panicked(&self, hash: TxHash, message: &str) {
        error!(hash = %format_hash(hash), panic = message, "Trace worker panicked");
    }

    fn dropped(&self, hash: TxHash) {
        warn!(hash = %format_hash(hash), "Worker pool saturated, dropping transaction");
    }

    fn idle(&self, waited: Duration) {
        warn!(?waited, "No pending transactions received");
    }

    fn subscription_lost(&self, error: &SubscriptionError) {
        error!(%error, "Pending transaction subscription lost");
    }

    fn skipped(&self, hash: TxHash) {
        debug!(hash = %format_hash(hash), "Nothing to trace");
    }
}
