//! Server configuration.
//!
//! [`ServerConfig`] collects every tunable of the protocol engine. Values are
//! set with the `with_*` builder methods and clamped to workable bounds by
//! [`ServerConfig::normalized`] before the server starts.

use std::{num::NonZeroUsize, time::Duration};

use crate::{buffer_pool, frame::MAX_PAYLOAD_LENGTH, server::BackoffConfig};

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Default maximum packet payload length (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;
/// Missed heartbeat intervals tolerated before a session is timed out.
pub const HEARTBEAT_TIMEOUT_FACTOR: u32 = 3;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);
const MIN_TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Tunables for the protocol engine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use playwire::config::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_heartbeat_interval(Duration::from_secs(5))
///     .with_rate_limit(20)
///     .with_data_compression(true);
/// assert_eq!(config.heartbeat_timeout(), Duration::from_secs(15));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interval between heartbeat ticks; also the handshake deadline.
    pub heartbeat_interval: Duration,
    /// Compress the handshake response and route names.
    pub data_compression: bool,
    /// Capacity of each connection's inbound packet queue.
    pub inbound_queue_size: usize,
    /// Capacity of each sender shard's queue.
    pub outbound_queue_size: usize,
    /// Number of sender shards.
    pub sender_shards: usize,
    /// Data packets allowed per second per session; zero disables limiting.
    pub rate_limit_per_second: u32,
    /// Size of the scratch buffer each poller shard reads into.
    pub read_buffer_size: usize,
    /// Largest accepted packet payload.
    pub max_frame_length: usize,
    /// Number of poller shards.
    pub poller_shards: usize,
    /// Capacity of the queue carrying accepted connections to the server.
    pub connection_queue_size: usize,
    /// Idle buffers retained by the buffer pool.
    pub buffer_pool_size: usize,
    /// Buffers larger than this are not returned to the pool.
    pub buffer_max_capacity: usize,
    /// Granularity of the heartbeat timer wheel.
    pub timer_resolution: Duration,
    /// Deadline for a WebSocket client to finish the HTTP upgrade.
    pub upgrade_timeout: Duration,
    /// Back-off applied when `accept()` fails.
    pub backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            data_compression: false,
            inbound_queue_size: 16,
            outbound_queue_size: 128,
            sender_shards: cores,
            rate_limit_per_second: 0,
            read_buffer_size: 4096,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            poller_shards: cores,
            connection_queue_size: 16,
            buffer_pool_size: buffer_pool::DEFAULT_MAX_POOLED,
            buffer_max_capacity: buffer_pool::DEFAULT_MAX_BUFFER_CAPACITY,
            timer_resolution: Duration::from_millis(100),
            upgrade_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable or disable handshake and route compression.
    #[must_use]
    pub fn with_data_compression(mut self, enabled: bool) -> Self {
        self.data_compression = enabled;
        self
    }

    /// Set the per-connection inbound queue capacity.
    #[must_use]
    pub fn with_inbound_queue_size(mut self, size: usize) -> Self {
        self.inbound_queue_size = size;
        self
    }

    /// Set the per-shard outbound queue capacity.
    #[must_use]
    pub fn with_outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size;
        self
    }

    /// Set the number of sender shards.
    #[must_use]
    pub fn with_sender_shards(mut self, shards: usize) -> Self {
        self.sender_shards = shards;
        self
    }

    /// Allow `per_second` data packets per second per session.
    #[must_use]
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit_per_second = per_second;
        self
    }

    /// Set the poller read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the maximum packet payload length.
    #[must_use]
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Set the number of poller shards.
    #[must_use]
    pub fn with_poller_shards(mut self, shards: usize) -> Self {
        self.poller_shards = shards;
        self
    }

    /// Set the accepted-connection queue capacity.
    #[must_use]
    pub fn with_connection_queue_size(mut self, size: usize) -> Self {
        self.connection_queue_size = size;
        self
    }

    /// Bound the buffer pool.
    #[must_use]
    pub fn with_buffer_pool(mut self, pooled: usize, max_capacity: usize) -> Self {
        self.buffer_pool_size = pooled;
        self.buffer_max_capacity = max_capacity;
        self
    }

    /// Set the timer wheel resolution.
    #[must_use]
    pub fn with_timer_resolution(mut self, resolution: Duration) -> Self {
        self.timer_resolution = resolution;
        self
    }

    /// Set the WebSocket upgrade deadline.
    #[must_use]
    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Set the accept back-off.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Silence allowed before an active session is timed out.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration { self.heartbeat_interval * HEARTBEAT_TIMEOUT_FACTOR }

    /// Clamp every value to a workable range.
    ///
    /// Counts and capacities become at least one, the frame limit is capped
    /// by the 3-byte length field and the timer resolution never exceeds the
    /// heartbeat interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use playwire::config::ServerConfig;
    ///
    /// let config = ServerConfig::default()
    ///     .with_sender_shards(0)
    ///     .with_max_frame_length(usize::MAX)
    ///     .with_timer_resolution(Duration::from_secs(60))
    ///     .normalized();
    /// assert_eq!(config.sender_shards, 1);
    /// assert_eq!(config.max_frame_length, (1 << 24) - 1);
    /// assert_eq!(config.timer_resolution, config.heartbeat_interval);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        self.timer_resolution = self
            .timer_resolution
            .clamp(MIN_TIMER_RESOLUTION, self.heartbeat_interval);
        self.inbound_queue_size = self.inbound_queue_size.max(1);
        self.outbound_queue_size = self.outbound_queue_size.max(1);
        self.sender_shards = self.sender_shards.max(1);
        self.poller_shards = self.poller_shards.max(1);
        self.connection_queue_size = self.connection_queue_size.max(1);
        self.read_buffer_size = self.read_buffer_size.max(64);
        self.max_frame_length = self.max_frame_length.clamp(1, MAX_PAYLOAD_LENGTH);
        self.buffer_max_capacity = self.buffer_max_capacity.max(self.read_buffer_size);
        self.backoff = self.backoff.normalized();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ServerConfig;

    #[test]
    fn defaults_are_already_normal() {
        let config = ServerConfig::default();
        assert_eq!(config.clone().normalized(), config);
        assert_eq!(config.rate_limit_per_second, 0);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    }

    #[test]
    fn zero_sizes_are_raised_to_one() {
        let config = ServerConfig::default()
            .with_inbound_queue_size(0)
            .with_outbound_queue_size(0)
            .with_poller_shards(0)
            .with_connection_queue_size(0)
            .normalized();
        assert_eq!(config.inbound_queue_size, 1);
        assert_eq!(config.outbound_queue_size, 1);
        assert_eq!(config.poller_shards, 1);
        assert_eq!(config.connection_queue_size, 1);
    }

    #[test]
    fn tiny_heartbeat_is_raised() {
        let config = ServerConfig::default()
            .with_heartbeat_interval(Duration::ZERO)
            .normalized();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(10));
        assert!(config.timer_resolution <= config.heartbeat_interval);
    }
}
