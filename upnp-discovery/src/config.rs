//! Discovery configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Parameters of one discovery round.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// `ST` header value, e.g. `ssdp:all` or a device/service type URN
    pub search_target: String,
    /// How long to collect search responses
    pub timeout: Duration,
    /// `MX` header value: maximum response jitter devices may apply, in seconds
    pub mx: u32,
    /// `USER-AGENT` for the M-SEARCH datagram and description requests
    pub user_agent: String,
    /// Timeout for each description fetch
    pub http_timeout: Duration,
    /// Where the M-SEARCH datagram is sent
    pub multicast_addr: SocketAddr,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: "ssdp:all".to_string(),
            timeout: Duration::from_secs(3),
            mx: 2,
            user_agent: default_user_agent(),
            http_timeout: Duration::from_secs(5),
            multicast_addr: SocketAddr::from(([239, 255, 255, 250], 1900)),
        }
    }
}

impl DiscoveryConfig {
    pub fn new(search_target: impl Into<String>) -> Self {
        Self {
            search_target: search_target.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mx(mut self, mx: u32) -> Self {
        self.mx = mx;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Send the search somewhere other than the SSDP multicast group
    pub fn with_multicast_addr(mut self, addr: SocketAddr) -> Self {
        self.multicast_addr = addr;
        self
    }
}

/// `<os>/<version> UPnP/1.1 upnp-cp/<crate version>`
pub fn default_user_agent() -> String {
    format!(
        "{}/1.0 UPnP/1.1 upnp-cp/{}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
}
