//! Trace Dispatcher
//!
//! Single event loop racing four sources on every iteration: an inbound
//! pending hash, the idle timer, the subscription's error signal and the
//! shutdown signal. Hashes are handed to detached trace workers, gated by a
//! semaphore so the number of in-flight workers stays bounded.

use alloy::primitives::TxHash;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::client::Connection;
use crate::config::{DispatchConfig, SaturationPolicy};
use crate::report::TraceReporter;
use crate::rpc::{NodeRpc, PendingSubscription, SubscriptionError};
use crate::worker::spawn_trace_worker;

/// Counters updated by the dispatcher loop
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    spawned: AtomicU64,
    dropped: AtomicU64,
    idle_timeouts: AtomicU64,
    resubscriptions: AtomicU64,
}

impl DispatchStats {
    /// Hashes taken off the inbound channel
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Trace workers spawned
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Hashes dropped because the worker pool was saturated
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Idle timeouts fired with no hash received
    pub fn idle_timeouts(&self) -> u64 {
        self.idle_timeouts.load(Ordering::Relaxed)
    }

    /// Successful resubscriptions after a subscription failure
    pub fn resubscriptions(&self) -> u64 {
        self.resubscriptions.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumes the pending subscription and fans hashes out to trace workers
pub struct Dispatcher<R> {
    connection: Arc<Connection<R>>,
    config: DispatchConfig,
    reporter: Arc<dyn TraceReporter>,
    permits: Arc<Semaphore>,
    stats: Arc<DispatchStats>,
}

impl<R: NodeRpc> Dispatcher<R> {
    pub fn new(
        connection: Arc<Connection<R>>,
        config: DispatchConfig,
        reporter: Arc<dyn TraceReporter>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            connection,
            config,
            reporter,
            permits,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Shared handle to the loop counters
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the subscription fails for good
    pub async fn run(&self, mode: &str) -> Result<Infallible, SubscriptionError> {
        self.run_until(mode, std::future::pending::<Infallible>())
            .await
    }

    /// Run until `shutdown` completes or the subscription fails for good
    ///
    /// # Returns
    /// The shutdown future's output, or the terminal subscription error once
    /// the resubscription budget is spent
    pub async fn run_until<F: Future>(
        &self,
        mode: &str,
        shutdown: F,
    ) -> Result<F::Output, SubscriptionError> {
        let mode: Arc<str> = Arc::from(mode);
        let (sink, mut inbound) = mpsc::channel(self.config.channel_capacity);
        let mut subscription = self.connection.subscribe(sink.clone()).await?;

        info!(
            mode = %mode,
            channel_capacity = self.config.channel_capacity,
            max_in_flight = self.config.max_in_flight,
            "Dispatcher running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                output = &mut shutdown => {
                    info!(
                        received = self.stats.received(),
                        spawned = self.stats.spawned(),
                        "Dispatcher stopping"
                    );
                    return Ok(output);
                }
                Some(hash) = inbound.recv() => {
                    self.dispatch(hash, &mode).await;
                }
                _ = sleep(self.config.idle_timeout) => {
                    DispatchStats::bump(&self.stats.idle_timeouts);
                    self.reporter.idle(self.config.idle_timeout);
                }
                err = subscription.closed() => {
                    self.reporter.subscription_lost(&err);
                    subscription = self.resubscribe(&sink).await?;
                }
            }
        }
    }

    async fn dispatch(&self, hash: TxHash, mode: &Arc<str>) {
        DispatchStats::bump(&self.stats.received);

        let permit = match self.config.saturation {
            SaturationPolicy::Block => match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed
                Err(_) => return,
            },
            SaturationPolicy::Drop => match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    DispatchStats::bump(&self.stats.dropped);
                    self.reporter.dropped(hash);
                    return;
                }
            },
        };

        DispatchStats::bump(&self.stats.spawned);
        spawn_trace_worker(
            Arc::clone(&self.connection),
            hash,
            Arc::clone(mode),
            Arc::clone(&self.reporter),
            permit,
        );
    }

    /// Re-establish the subscription with exponential backoff
    async fn resubscribe(
        &self,
        sink: &mpsc::Sender<TxHash>,
    ) -> Result<PendingSubscription, SubscriptionError> {
        let policy = &self.config.resubscribe;
        let mut last_error = String::from("no attempts allowed");

        for attempt in 0..policy.max_attempts {
            let delay = policy.backoff_delay(attempt);
            warn!(
                "Resubscribing to pending transactions (attempt {}/{}), waiting {:?}",
                attempt + 1,
                policy.max_attempts,
                delay
            );
            sleep(delay).await;

            match self.connection.subscribe(sink.clone()).await {
                Ok(subscription) => {
                    DispatchStats::bump(&self.stats.resubscriptions);
                    info!(attempt = attempt + 1, "Resubscribed to pending transactions");
                    return Ok(subscription);
                }
                Err(e) => {
                    error!("Resubscription attempt {} failed: {}", attempt + 1, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SubscriptionError::RetriesExhausted {
            attempts: policy.max_attempts,
            last_error,
        })
    }
}
