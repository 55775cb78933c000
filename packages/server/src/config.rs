//! Broker configuration.
//!
//! Built from command-line arguments by the binary; library users and tests
//! start from [`BrokerConfig::default`].

use std::time::Duration;

/// Default per-connection outbound buffer (frames)
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Frames buffered per connection before deliveries are skipped
    pub outbound_buffer: usize,
    /// How long a detached citizen may take to reconnect. Zero closes at once.
    pub citizen_reconnect_grace: Duration,
    /// Hand a claimed but silent session back to the queue after this long
    pub join_silence_timeout: Option<Duration>,
    /// Close requests nobody claimed within this long
    pub queue_idle_timeout: Option<Duration>,
    /// Keep closed sessions readable for this long before purging
    pub closed_retention: Duration,
    /// Period of the policy sweeper
    pub sweep_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            citizen_reconnect_grace: Duration::from_secs(30),
            join_silence_timeout: None,
            queue_idle_timeout: None,
            closed_retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(5),
        }
    }
}
