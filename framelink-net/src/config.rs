//! Connection and acceptor configuration.

use std::time::Duration;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 100;

/// Configuration for a framed connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection timeout for outbound connects.
    pub connect_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            nodelay: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Configuration for the connection acceptor.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Listen backlog passed to the OS.
    pub backlog: u32,
    /// Configuration applied to every accepted connection.
    pub connection: ConnectionConfig,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            connection: ConnectionConfig::default(),
        }
    }
}

impl AcceptorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.nodelay);
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::new().with_read_buffer_size(100); // Below minimum
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new().with_read_buffer_size(10 * 1024 * 1024); // Above maximum
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_acceptor_config_defaults() {
        let config = AcceptorConfig::default();
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
        assert_eq!(
            config.connection.read_buffer_size,
            DEFAULT_READ_BUFFER_SIZE
        );
    }
}
