//! Dispatch server configuration.

use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackServerConfig {
    /// Inclusive range searched for a free listening port
    pub port_range: (u16, u16),
    /// Address the listener binds to
    pub bind_ip: IpAddr,
    /// Address put into callback and media URLs; detected when `None`
    pub advertised_ip: Option<IpAddr>,
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            port_range: (3400, 3500),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertised_ip: None,
        }
    }
}

impl CallbackServerConfig {
    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn with_advertised_ip(mut self, ip: IpAddr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }

    /// Bind and advertise on 127.0.0.1, for tests and single-host setups
    pub fn loopback() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self::default()
            .with_bind_ip(localhost)
            .with_advertised_ip(localhost)
    }
}
