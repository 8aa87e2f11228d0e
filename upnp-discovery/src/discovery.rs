//! Core discovery logic and iterator implementation.
//!
//! A discovery round:
//! 1. Sends one SSDP M-SEARCH request
//! 2. Collects `200 OK` responses until the timeout
//! 3. Drops responses whose location was already seen
//! 4. Fetches and parses each remaining device description
//! 5. Yields the resulting device trees in arrival order

use std::collections::HashSet;
use crate::config::DiscoveryConfig;
use crate::description::RootDevice;
use crate::error::{DiscoveryError, Result};
use crate::ssdp::{SsdpClient, SsdpResponse};
use crate::DiscoveryEvent;

/// Iterator that discovers UPnP devices on the local network.
///
/// Yields `DiscoveryEvent::Found` for each device whose description could be
/// fetched and parsed. Devices that fail are logged and skipped.
///
/// # Examples
///
/// ```no_run
/// use upnp_discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryIterator};
///
/// let config = DiscoveryConfig::new("upnp:rootdevice");
/// for event in DiscoveryIterator::new(config).unwrap() {
///     match event {
///         DiscoveryEvent::Found(root) => {
///             println!("Found: {}", root.device().udn);
///         }
///     }
/// }
/// ```
pub struct DiscoveryIterator {
    config: DiscoveryConfig,
    ssdp_client: Option<SsdpClient>,
    ssdp_buffer: Vec<SsdpResponse>,
    buffer_index: usize,
    http_client: reqwest::blocking::Client,
}

impl DiscoveryIterator {
    /// Create a new discovery iterator. Nothing is sent until the first
    /// call to `next()` or `search()`.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let ssdp_client = SsdpClient::new()?;
        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            ssdp_client: Some(ssdp_client),
            ssdp_buffer: Vec::new(),
            buffer_index: 0,
            http_client,
        })
    }

    /// Send the search and collect responses for the configured timeout.
    ///
    /// Only the send can fail; receive errors end the collection early.
    /// Calling this again after the search ran is a no-op.
    pub fn search(&mut self) -> Result<()> {
        let Some(client) = self.ssdp_client.take() else {
            return Ok(());
        };

        let responses = client.search(
            self.config.multicast_addr,
            &self.config.search_target,
            self.config.mx,
            &self.config.user_agent,
            self.config.timeout,
        )?;

        let mut collected = Vec::new();
        for result in responses {
            match result {
                Ok(response) => collected.push(response),
                Err(e) => {
                    tracing::warn!("SSDP receive failed, ending search early: {}", e);
                    break;
                }
            }
        }
        tracing::debug!("collected {} SSDP responses", collected.len());

        self.ssdp_buffer = unique_by_location(collected);
        Ok(())
    }

    fn resolve(&self, response: &SsdpResponse) -> Option<RootDevice> {
        match RootDevice::fetch(&response.location, &self.http_client) {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::debug!("skipping device at {}: {}", response.location, e);
                None
            }
        }
    }
}

impl Iterator for DiscoveryIterator {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ssdp_client.is_some() {
            if let Err(e) = self.search() {
                tracing::warn!("SSDP search failed: {}", e);
                return None;
            }
        }

        while self.buffer_index < self.ssdp_buffer.len() {
            let response = &self.ssdp_buffer[self.buffer_index];
            self.buffer_index += 1;

            if let Some(root) = self.resolve(response) {
                return Some(DiscoveryEvent::Found(root));
            }
        }
        None
    }
}

/// Keep the first response per literal location string, preserving order
pub(crate) fn unique_by_location(responses: Vec<SsdpResponse>) -> Vec<SsdpResponse> {
    let mut seen = HashSet::new();
    responses
        .into_iter()
        .filter(|r| seen.insert(r.location.clone()))
        .collect()
}
