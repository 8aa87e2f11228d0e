//! SSDP (Simple Service Discovery Protocol) search client
//!
//! Sends one M-SEARCH datagram and collects unicast responses until a deadline
//! passes. It is not part of the public API.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use crate::error::{DiscoveryError, Result};

/// Standard SSDP multicast group and port
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Fields captured from a `200 OK` search response
#[derive(Debug, Clone, PartialEq)]
pub struct SsdpResponse {
    pub location: String,
    pub search_target: Option<String>,
    pub usn: Option<String>,
    pub server: Option<String>,
}

/// SSDP client for device discovery
pub(crate) struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    /// Bind an ephemeral UDP socket
    pub fn new() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;

        socket.set_multicast_loop_v4(true)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set multicast loop: {}", e)))?;

        Ok(Self { socket })
    }

    /// Send an M-SEARCH request and return an iterator of responses that ends
    /// once `duration` has elapsed.
    pub fn search(
        &self,
        target_addr: SocketAddr,
        search_target: &str,
        mx: u32,
        user_agent: &str,
        duration: Duration,
    ) -> Result<SsdpResponseIterator<'_>> {
        let request = build_search_request(search_target, mx, user_agent);

        self.socket.send_to(request.as_bytes(), target_addr)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e)))?;
        tracing::debug!("M-SEARCH for {} sent to {}", search_target, target_addr);

        Ok(SsdpResponseIterator::new(&self.socket, Instant::now() + duration))
    }
}

/// Build the M-SEARCH datagram
pub(crate) fn build_search_request(search_target: &str, mx: u32, user_agent: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         CACHE-CONTROL: no-cache\r\n\
         PRAGMA: no-cache\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, mx, search_target, user_agent
    )
}

/// Iterator for SSDP responses
pub(crate) struct SsdpResponseIterator<'a> {
    socket: &'a UdpSocket,
    buffer: [u8; 2048],
    deadline: Instant,
    finished: bool,
}

impl<'a> SsdpResponseIterator<'a> {
    fn new(socket: &'a UdpSocket, deadline: Instant) -> Self {
        Self {
            socket,
            buffer: [0; 2048],
            deadline,
            finished: false,
        }
    }
}

impl<'a> Iterator for SsdpResponseIterator<'a> {
    type Item = Result<SsdpResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.finished = true;
                return None;
            }
            if let Err(e) = self.socket.set_read_timeout(Some(remaining)) {
                self.finished = true;
                return Some(Err(DiscoveryError::NetworkError(format!("Failed to set read timeout: {}", e))));
            }

            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, from)) => {
                    let Ok(text) = std::str::from_utf8(&self.buffer[..size]) else {
                        tracing::trace!("ignoring non UTF-8 datagram from {}", from);
                        continue;
                    };
                    match parse_ssdp_response(text) {
                        Some(response) => return Some(Ok(response)),
                        None => tracing::trace!("ignoring datagram from {}", from),
                    }
                }
                Err(e) => {
                    self.finished = true;
                    if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut {
                        return None;
                    }
                    return Some(Err(DiscoveryError::NetworkError(format!("Socket error: {}", e))));
                }
            }
        }
    }
}

/// Parse an SSDP search response. Anything but `HTTP/1.x 200` or a response
/// without `LOCATION` yields `None`.
pub(crate) fn parse_ssdp_response(response: &str) -> Option<SsdpResponse> {
    let mut lines = response.lines();
    if !is_ok_status_line(lines.next()?) {
        return None;
    }

    let mut location = None;
    let mut search_target = None;
    let mut usn = None;
    let mut server = None;

    for line in lines {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            search_target = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = extract_header_value(line, "SERVER:") {
            server = Some(value);
        }
    }

    let location = location.filter(|l| !l.is_empty())?;
    Some(SsdpResponse {
        location,
        search_target,
        usn,
        server,
    })
}

fn is_ok_status_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let version_ok = parts
        .next()
        .and_then(|v| v.get(..6))
        .map(|prefix| prefix.eq_ignore_ascii_case("HTTP/1"))
        .unwrap_or(false);
    version_ok && parts.next() == Some("200")
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    let value = line.get(header.len()..).filter(|v| !v.is_empty())?;
    line.get(..header.len())
        .filter(|name| name.eq_ignore_ascii_case(header))
        .map(|_| value.trim().to_string())
}
