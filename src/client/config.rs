use std::time::Duration;

use crate::core::PeerId;
use crate::peer::BLOCK_SIZE;

/// Configuration settings for the client
#[derive(Clone, Debug)]
pub struct Config {
    // Identity and Network Settings
    /// Unique identifier for this client, sent to trackers and peers
    pub client_id: PeerId,
    /// Port number reported to the tracker
    pub port: u16,

    // Connection Settings
    /// Timeout for establishing new connections
    pub connect_timeout: Duration,
    /// Timeout for receiving the peer's handshake
    pub handshake_timeout: Duration,
    /// Deadline for each received message, `None` waits forever
    pub receive_timeout: Option<Duration>,
    /// Largest message length a peer may declare
    pub max_message_length: usize,

    // Download Settings
    /// Maximum number of block requests outstanding on one connection
    pub max_outstanding_requests: usize,
}

#[allow(dead_code)]
impl Config {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_max_outstanding_requests(mut self, n: usize) -> Self {
        self.max_outstanding_requests = n.max(1);
        self
    }

    pub fn with_max_message_length(mut self, length: usize) -> Self {
        self.max_message_length = length;
        self
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            client_id: PeerId::random(),
            port: 6881,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            receive_timeout: Some(Duration::from_secs(30)),
            // piece header (id, index, begin) on top of a full block
            max_message_length: BLOCK_SIZE + 9,
            max_outstanding_requests: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
