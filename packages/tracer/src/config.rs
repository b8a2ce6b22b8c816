//! Tracer Configuration
//!
//! Timeouts, channel sizing, fan-out limits and resubscription policy for the
//! trace pipeline. Defaults match the reference deployment.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default trace mode (block tag passed to `debug_traceCall`)
pub const DEFAULT_MODE: &str = "latest";

/// Default tracer used by the node for `debug_traceCall`
pub const DEFAULT_TRACER: &str = "callTracer";

/// Timeout for a single `debug_traceCall` in milliseconds
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

/// Timeout for a single transaction lookup in milliseconds
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;

/// Time without any inbound hash before an idle timeout is reported
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

/// Capacity of the inbound hash channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2_000;

/// Maximum number of trace workers in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Maximum resubscription attempts before the dispatcher gives up
pub const MAX_RESUBSCRIBE_ATTEMPTS: u32 = 10;

/// Initial backoff delay for resubscription
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay for resubscription
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Errors raised by configuration validation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Trace mode cannot be empty")]
    EmptyMode,

    #[error("Tracer name cannot be empty")]
    EmptyTracer,

    #[error("Unknown saturation policy: {0} (expected 'block' or 'drop')")]
    UnknownSaturationPolicy(String),
}

/// Settings applied to every lookup and traced call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSettings {
    pub lookup_timeout: Duration,
    pub call_timeout: Duration,
    /// Tracer name sent in the trace config
    pub tracer: String,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            tracer: DEFAULT_TRACER.to_string(),
        }
    }
}

/// What the dispatcher does with a hash when every worker permit is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationPolicy {
    /// Wait for a permit; the inbound channel absorbs the burst
    #[default]
    Block,
    /// Report the hash as dropped and move on
    Drop,
}

impl FromStr for SaturationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(SaturationPolicy::Block),
            "drop" => Ok(SaturationPolicy::Drop),
            other => Err(ConfigError::UnknownSaturationPolicy(other.to_string())),
        }
    }
}

/// Bounded exponential backoff for resubscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RESUBSCRIBE_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.pow(attempt.min(10)));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Dispatcher loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub idle_timeout: Duration,
    pub channel_capacity: usize,
    pub max_in_flight: usize,
    pub saturation: SaturationPolicy,
    pub resubscribe: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            saturation: SaturationPolicy::default(),
            resubscribe: RetryPolicy::default(),
        }
    }
}

/// Complete configuration for one tracer process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// Node endpoint (ws://, wss:// or an IPC socket path)
    pub endpoint: String,
    /// Block tag passed to `debug_traceCall`
    pub mode: String,
    pub call: CallSettings,
    pub dispatch: DispatchConfig,
}

impl TracerConfig {
    /// Create a config for the given endpoint with default settings
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            mode: DEFAULT_MODE.to_string(),
            call: CallSettings::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.trim().is_empty() {
            return Err(ConfigError::EmptyMode);
        }
        if self.call.tracer.trim().is_empty() {
            return Err(ConfigError::EmptyTracer);
        }
        if self.call.call_timeout.is_zero() {
            return Err(ConfigError::Zero("call timeout"));
        }
        if self.call.lookup_timeout.is_zero() {
            return Err(ConfigError::Zero("lookup timeout"));
        }
        if self.dispatch.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle timeout"));
        }
        if self.dispatch.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel capacity"));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(ConfigError::Zero("max in-flight workers"));
        }
        Ok(())
    }
}
