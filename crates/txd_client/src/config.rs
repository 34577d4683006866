//! Client configuration.

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryStrategy;
use std::collections::HashMap;
use std::time::Duration;
use txd_protocol::DEFAULT_MAX_FRAME_LEN;

/// Property selecting the retry strategy: `backoff` or `n-times`.
pub const PROP_RETRY_STRATEGY: &str = "data.tx.client.retry.strategy";
/// Attempts for the `n-times` strategy.
pub const PROP_RETRY_ATTEMPTS: &str = "data.tx.client.retry.attempts";
/// Initial backoff delay in milliseconds.
pub const PROP_BACKOFF_INITIAL: &str = "data.tx.client.retry.backoff.initial";
/// Backoff growth factor.
pub const PROP_BACKOFF_FACTOR: &str = "data.tx.client.retry.backoff.factor";
/// Backoff delay limit in milliseconds.
pub const PROP_BACKOFF_LIMIT: &str = "data.tx.client.retry.backoff.limit";
/// Optional cap on backoff attempts.
pub const PROP_BACKOFF_MAX_ATTEMPTS: &str = "data.tx.client.retry.backoff.max.attempts";
/// Optional cap on total backoff time in milliseconds.
pub const PROP_BACKOFF_MAX_ELAPSED: &str = "data.tx.client.retry.backoff.max.elapsed";
/// Socket timeout in milliseconds.
pub const PROP_CLIENT_TIMEOUT: &str = "data.tx.client.timeout";

/// Configuration for exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Factor the delay grows by after each retry.
    pub multiplier: u32,
    /// Retrying stops once the delay reaches this value.
    pub max_delay: Duration,
    /// Optional cap on attempts, the first one included.
    pub max_attempts: Option<u32>,
    /// Optional cap on time spent since the first failure.
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            multiplier: 4,
            max_delay: Duration::from_millis(30_000),
            max_attempts: None,
            max_elapsed: None,
        }
    }
}

impl BackoffConfig {
    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the delay limit.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Caps the number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Caps the time spent retrying.
    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }
}

/// Which retry strategy a client builds for each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryConfig {
    /// Up to `attempts` attempts, no delay.
    NTimes {
        /// Total attempts, the first one included.
        attempts: u32,
    },
    /// Growing delays between attempts.
    Backoff(BackoffConfig),
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Backoff(BackoffConfig::default())
    }
}

impl RetryConfig {
    /// Creates an `n-times` configuration.
    pub fn n_times(attempts: u32) -> Self {
        RetryConfig::NTimes { attempts }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        RetryConfig::NTimes { attempts: 1 }
    }

    /// Builds a fresh strategy for one call.
    pub fn strategy(&self) -> RetryStrategy {
        match self {
            RetryConfig::NTimes { attempts } => RetryStrategy::n_times(*attempts),
            RetryConfig::Backoff(backoff) => RetryStrategy::backoff(backoff),
        }
    }

    /// Reads the retry configuration from string properties.
    ///
    /// Missing keys take their defaults; an unknown strategy name or an
    /// unparsable value is an error.
    pub fn from_properties(props: &HashMap<String, String>) -> ClientResult<Self> {
        let strategy = props
            .get(PROP_RETRY_STRATEGY)
            .map_or("backoff", |s| s.trim());
        match strategy {
            "n-times" => Ok(RetryConfig::NTimes {
                attempts: parse_prop(props, PROP_RETRY_ATTEMPTS)?.unwrap_or(2),
            }),
            "backoff" => {
                let defaults = BackoffConfig::default();
                Ok(RetryConfig::Backoff(BackoffConfig {
                    initial_delay: parse_prop(props, PROP_BACKOFF_INITIAL)?
                        .map_or(defaults.initial_delay, Duration::from_millis),
                    multiplier: parse_prop(props, PROP_BACKOFF_FACTOR)?
                        .unwrap_or(defaults.multiplier),
                    max_delay: parse_prop(props, PROP_BACKOFF_LIMIT)?
                        .map_or(defaults.max_delay, Duration::from_millis),
                    max_attempts: parse_prop(props, PROP_BACKOFF_MAX_ATTEMPTS)?,
                    max_elapsed: parse_prop(props, PROP_BACKOFF_MAX_ELAPSED)?
                        .map(Duration::from_millis),
                }))
            }
            other => Err(ClientError::config(format!(
                "unknown retry strategy '{other}', expected 'backoff' or 'n-times'"
            ))),
        }
    }
}

/// Configuration for a remote client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service address, `host:port`.
    pub address: String,
    /// Retry behavior.
    pub retry: RetryConfig,
    /// Connect, read and write timeout.
    pub timeout: Duration,
    /// Idle connections kept in the pool.
    pub max_idle_connections: usize,
    /// Largest accepted frame.
    pub max_frame_len: usize,
}

impl ClientConfig {
    /// Creates a configuration for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            retry: RetryConfig::default(),
            timeout: Duration::from_millis(30_000),
            max_idle_connections: 8,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Reads the configuration for `address` from string properties.
    pub fn from_properties(
        address: impl Into<String>,
        props: &HashMap<String, String>,
    ) -> ClientResult<Self> {
        let mut config = Self::new(address).with_retry(RetryConfig::from_properties(props)?);
        if let Some(timeout) = parse_prop(props, PROP_CLIENT_TIMEOUT)? {
            config.timeout = Duration::from_millis(timeout);
        }
        Ok(config)
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the socket timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of idle pooled connections.
    pub fn with_max_idle_connections(mut self, count: usize) -> Self {
        self.max_idle_connections = count;
        self
    }

    /// Sets the largest accepted frame.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}

fn parse_prop<T: std::str::FromStr>(
    props: &HashMap<String, String>,
    key: &str,
) -> ClientResult<Option<T>> {
    props
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ClientError::config(format!("invalid value '{raw}' for {key}")))
        })
        .transpose()
}
