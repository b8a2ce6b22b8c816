//! TxnScope Tracer Library
//!
//! This crate watches a node's pending transaction feed and traces every
//! pending transaction with `debug_traceCall`, fanning the work out to bounded,
//! isolated worker tasks.

pub mod client;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod dispatcher;
pub mod report;
pub mod request;
pub mod rpc;
pub mod worker;

#[cfg(test)]
mod log_capture;

// Re-export commonly used types
pub use client::{Connection, ConnectionError, TraceError, TracedCall};
pub use config::{SaturationPolicy, TracerConfig};
pub use connection::{AlloyNode, Endpoint};
pub use decoder::{decode_call_frame, CallFrame};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use report::{LogReporter, TraceReporter};
pub use request::{CallArgs, PendingTransaction};
pub use rpc::{NodeRpc, PendingSubscription, RpcError, SubscriptionError};
