//! Service-level UPnP control point.
//!
//! This crate ties the workspace together: services found with
//! [`upnp_discovery`] are driven through a [`UpnpClient`], which resolves
//! control and event URLs from the description tree and speaks SOAP and GENA
//! via `soap_client`. Notifications and media are served by
//! [`callback_server`], re-exported here along with the description types.
//!
//! ```rust,no_run
//! use upnp_api::facets::{RenderingControl, MASTER_CHANNEL};
//! use upnp_api::UpnpClient;
//!
//! let client = UpnpClient::new();
//! for root in upnp_api::upnp_discovery::discover(
//!     "urn:schemas-upnp-org:device:MediaRenderer:1",
//!     std::time::Duration::from_secs(3),
//!     2,
//! )? {
//!     let Some(service) = root.find_service("urn:schemas-upnp-org:service:RenderingControl:1") else {
//!         continue;
//!     };
//!     let rendering = RenderingControl::try_from_service(&client, service)?;
//!     println!(
//!         "{:?}: volume {}",
//!         root.device().friendly_name,
//!         rendering.get_volume(0, MASTER_CHANNEL)?
//!     );
//! }
//! # Ok::<(), upnp_api::ApiError>(())
//! ```

mod client;
mod error;
pub mod facets;
pub mod logging;

pub use client::UpnpClient;
pub use error::{ApiError, Result};

pub use soap_client::{ActionArgument, ActionResponse, SoapClientConfig, SubscriptionResponse};
pub use upnp_discovery::{Device, Icon, RootDevice, Service, SpecVersion};

pub use callback_server;
pub use upnp_discovery;
pub use upnp_parser;
