//! UPnP device discovery library
//!
//! This crate finds UPnP devices on the local network using SSDP and turns
//! their description documents into navigable device trees.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use upnp_discovery::discover;
//!
//! let roots = discover("urn:schemas-upnp-org:device:MediaRenderer:1", Duration::from_secs(3), 2)?;
//! for root in roots {
//!     let device = root.device();
//!     println!("{} at {}", device.friendly_name.as_deref().unwrap_or("?"), root.location());
//!     if let Some(avt) = root.find_service("urn:schemas-upnp-org:service:AVTransport:1") {
//!         println!("  AVTransport control: {}", avt.control_endpoint()?);
//!     }
//! }
//! # Ok::<(), upnp_discovery::DiscoveryError>(())
//! ```
//!
//! # Iterator-based Discovery
//!
//! For streaming processing or early termination, use the iterator API:
//!
//! ```no_run
//! use upnp_discovery::{get_iter, DiscoveryEvent};
//!
//! for event in get_iter() {
//!     match event {
//!         DiscoveryEvent::Found(root) => {
//!             println!("Found: {}", root.device().udn);
//!             break;
//!         }
//!     }
//! }
//! ```

mod config;
pub mod description;
mod discovery;
mod error;
mod ssdp;

pub use config::{default_user_agent, DiscoveryConfig};
pub use description::{Device, Icon, RootDevice, Service, SpecVersion};
pub use discovery::DiscoveryIterator;
pub use error::{DiscoveryError, Result};
pub use ssdp::{SsdpResponse, SSDP_MULTICAST_ADDR};

use std::time::Duration;

/// Events emitted during device discovery.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A device description was fetched and parsed
    Found(RootDevice),
}

/// Search for `search_target`, collect responses for `duration`, and return
/// the parsed root devices in arrival order.
///
/// `mx` is sent as the maximum response jitter in seconds.
///
/// # Errors
///
/// Only a failure to create the socket or send the search fails the call.
/// Devices whose description cannot be fetched or parsed are left out.
pub fn discover(search_target: &str, duration: Duration, mx: u32) -> Result<Vec<RootDevice>> {
    let config = DiscoveryConfig::new(search_target)
        .with_timeout(duration)
        .with_mx(mx);
    discover_with_config(&config)
}

/// Like [`discover`], with every parameter taken from `config`.
pub fn discover_with_config(config: &DiscoveryConfig) -> Result<Vec<RootDevice>> {
    let mut iter = DiscoveryIterator::new(config.clone())?;
    iter.search()?;
    Ok(iter
        .map(|event| match event {
            DiscoveryEvent::Found(root) => root,
        })
        .collect())
}

/// Discover all root devices (`ssdp:all`) with a default 3-second timeout.
///
/// Failures are logged and produce an empty list.
pub fn get() -> Vec<RootDevice> {
    get_with_timeout(Duration::from_secs(3))
}

/// Discover all root devices (`ssdp:all`) with a custom timeout.
pub fn get_with_timeout(timeout: Duration) -> Vec<RootDevice> {
    get_iter_with_timeout(timeout)
        .map(|event| match event {
            DiscoveryEvent::Found(root) => root,
        })
        .collect()
}

/// Get an iterator for discovering all root devices with a default 3-second timeout.
pub fn get_iter() -> impl Iterator<Item = DiscoveryEvent> {
    get_iter_with_timeout(Duration::from_secs(3))
}

/// Get an iterator for discovering all root devices with a custom timeout.
///
/// If the socket cannot be created the iterator is empty.
pub fn get_iter_with_timeout(timeout: Duration) -> impl Iterator<Item = DiscoveryEvent> {
    let config = DiscoveryConfig::default().with_timeout(timeout);
    DiscoveryIterator::new(config)
        .map_err(|e| tracing::warn!("discovery unavailable: {}", e))
        .ok()
        .into_iter()
        .flatten()
}
