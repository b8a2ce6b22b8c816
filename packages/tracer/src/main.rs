use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txnscope_tracer::config::{
    CallSettings, DispatchConfig, RetryPolicy, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_LOOKUP_TIMEOUT_MS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MODE,
    DEFAULT_TRACER, MAX_RESUBSCRIBE_ATTEMPTS,
};
use txnscope_tracer::connection::find_ipc_socket;
use txnscope_tracer::{Connection, Dispatcher, Endpoint, LogReporter, SaturationPolicy, TracerConfig};

#[derive(Parser)]
#[command(name = "txnscope-tracer")]
#[command(about = "Trace pending transactions with debug_traceCall", long_about = None)]
struct Cli {
    /// Node endpoint (ws://, wss:// or IPC socket path); defaults to a local IPC socket
    endpoint: Option<String>,

    /// Block tag to trace against
    #[arg(short, long, default_value = DEFAULT_MODE)]
    mode: String,

    #[arg(long, default_value = DEFAULT_TRACER)]
    tracer: String,

    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    call_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_LOOKUP_TIMEOUT_MS)]
    lookup_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    idle_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    /// What to do when every worker is busy: block or drop
    #[arg(long, default_value = "block")]
    on_saturation: SaturationPolicy,

    #[arg(long, default_value_t = MAX_RESUBSCRIBE_ATTEMPTS)]
    max_resubscribe_attempts: u32,
}

impl Cli {
    fn into_config(self, endpoint: String) -> TracerConfig {
        TracerConfig {
            endpoint,
            mode: self.mode,
            call: CallSettings {
                lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
                call_timeout: Duration::from_millis(self.call_timeout_ms),
                tracer: self.tracer,
            },
            dispatch: DispatchConfig {
                idle_timeout: Duration::from_millis(self.idle_timeout_ms),
                channel_capacity: self.channel_capacity,
                max_in_flight: self.max_in_flight,
                saturation: self.on_saturation,
                resubscribe: RetryPolicy {
                    max_attempts: self.max_resubscribe_attempts,
                    ..Default::default()
                },
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txnscope_tracer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let endpoint = match cli.endpoint.clone().or_else(find_ipc_socket) {
        Some(endpoint) => endpoint,
        None => {
            error!("No endpoint given and no local IPC socket found");
            return Err("missing node endpoint".into());
        }
    };

    let config = cli.into_config(endpoint);
    config.validate()?;

    let endpoint = Endpoint::parse(&config.endpoint)?;
    let connection = Arc::new(Connection::connect(&endpoint, config.call.clone()).await?);

    let dispatcher = Dispatcher::new(connection, config.dispatch.clone(), Arc::new(LogReporter));
    let stats = dispatcher.stats();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match dispatcher.run_until(&config.mode, shutdown).await {
        Ok(()) => {
            info!(
                received = stats.received(),
                spawned = stats.spawned(),
                dropped = stats.dropped(),
                "Shut down"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Pending transaction subscription failed for good");
            Err(e.into())
        }
    }
}
