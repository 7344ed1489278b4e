//! Client configuration and resource limits.

use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Minimum supported heartbeat interval. Shorter intervals are rejected at
/// connect time with [`ProtocolError::InvalidHeartbeatInterval`].
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Resource limits applied to inbound frames and reassembled messages.
///
/// These bound memory usage against a hostile or buggy peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes. Default: 16 MB.
    pub max_frame_size: usize,

    /// Maximum size of a complete message after reassembly. Default: 64 MB.
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message. Default: 128.
    pub max_fragment_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
        }
    }
}

impl Limits {
    /// Create limits with custom values.
    #[must_use]
    pub const fn new(max_frame_size: usize, max_message_size: usize, max_fragment_count: usize) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
        }
    }

    /// Validate a single frame size.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if `size` exceeds the maximum.
    pub fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }
        Ok(())
    }

    /// Validate a reassembled message size.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] if `size` exceeds the maximum.
    pub fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            }
            .into());
        }
        Ok(())
    }

    /// Validate a fragment count.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyFragments`] if `count` exceeds the maximum.
    pub fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            return Err(ProtocolError::TooManyFragments {
                count,
                max: self.max_fragment_count,
            }
            .into());
        }
        Ok(())
    }
}

/// Configuration for a WebSocket client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Allow plain-TCP `ws://` endpoints. Default: `false`.
    pub allow_insecure_connections: bool,

    /// Allow the transport to migrate to a better network path while
    /// connected. Pass-through option; the TCP transport ignores it.
    /// Default: `false`.
    pub allow_path_migration: bool,

    /// Interval between liveness pings. `None` disables the heartbeat.
    /// Must be at least [`MIN_HEARTBEAT_INTERVAL`]. Default: `None`.
    pub heartbeat_interval: Option<Duration>,

    /// Whether a peer-initiated close frame tears the connection down
    /// immediately. When `false` the connection replies to the close frame
    /// but keeps listening. Default: `true`.
    pub disconnect_on_close: bool,

    /// Disable Nagle's algorithm on the TCP socket. Default: `true`.
    pub tcp_nodelay: bool,

    /// Maximum time to establish the TCP connection and complete the
    /// upgrade handshake. Default: 30 seconds.
    pub connect_timeout: Duration,

    /// Initial capacity of the inbound frame buffer. Default: 16 KB.
    pub read_buffer_size: usize,

    /// Inbound frame and message limits.
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_insecure_connections: false,
            allow_path_migration: false,
            heartbeat_interval: None,
            disconnect_on_close: true,
            tcp_nodelay: true,
            connect_timeout: Duration::from_secs(30),
            read_buffer_size: 16 * 1024,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow plain-TCP `ws://` endpoints.
    #[must_use]
    pub fn with_insecure_connections(mut self, allow: bool) -> Self {
        self.allow_insecure_connections = allow;
        self
    }

    /// Enable path migration on transports that support it.
    #[must_use]
    pub fn with_path_migration(mut self, allow: bool) -> Self {
        self.allow_path_migration = allow;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Control teardown on a peer-initiated close frame.
    #[must_use]
    pub fn with_disconnect_on_close(mut self, disconnect: bool) -> Self {
        self.disconnect_on_close = disconnect;
        self
    }

    /// Replace the inbound limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Check the heartbeat interval against the supported minimum.
    ///
    /// Called at connect time, not at construction, so a `Config` can be
    /// built freely and fails only when used.
    pub(crate) fn validate_heartbeat(&self) -> Result<()> {
        if let Some(interval) = self.heartbeat_interval
            && interval < MIN_HEARTBEAT_INTERVAL
        {
            return Err(ProtocolError::InvalidHeartbeatInterval(interval).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert!(!config.allow_insecure_connections);
        assert!(!config.allow_path_migration);
        assert!(config.heartbeat_interval.is_none());
        assert!(config.disconnect_on_close);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new()
            .with_insecure_connections(true)
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_disconnect_on_close(false)
            .with_path_migration(true);
        assert!(config.allow_insecure_connections);
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(5)));
        assert!(!config.disconnect_on_close);
        assert!(config.allow_path_migration);
    }

    #[test]
    fn test_heartbeat_validation() {
        let config = Config::new().with_heartbeat_interval(Duration::from_millis(500));
        assert!(matches!(
            config.validate_heartbeat(),
            Err(Error::Protocol(ProtocolError::InvalidHeartbeatInterval(_)))
        ));

        let config = Config::new().with_heartbeat_interval(Duration::from_secs(1));
        assert!(config.validate_heartbeat().is_ok());

        assert!(Config::new().validate_heartbeat().is_ok());
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::new(1024, 100, 3);
        assert!(limits.check_frame_size(1024).is_ok());
        assert!(matches!(
            limits.check_frame_size(1025),
            Err(Error::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
        assert!(limits.check_message_size(100).is_ok());
        assert!(matches!(
            limits.check_message_size(150),
            Err(Error::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));
        assert!(limits.check_fragment_count(3).is_ok());
        assert!(matches!(
            limits.check_fragment_count(4),
            Err(Error::Protocol(ProtocolError::TooManyFragments { .. }))
        ));
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
    }
}
