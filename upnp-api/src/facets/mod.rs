//! Typed views over well-known services.
//!
//! A facet borrows a [`UpnpClient`](crate::UpnpClient) and a [`Service`] and
//! exposes the service's actions as methods with typed arguments and results.
//! Facets are obtained by checked conversion: `try_from_service` compares the
//! service type and fails with [`ApiError::UnsupportedService`] on a mismatch.
//! The version suffix of the service type is not checked.

mod av_transport;
mod connection_manager;
mod rendering_control;
mod wan_ip_connection;

pub use av_transport::{AvTransport, MediaInfo, PositionInfo, SeekTarget, TransportInfo, TransportState};
pub use connection_manager::{ConnectionInfo, ConnectionManager, ProtocolInfo};
pub use rendering_control::{RenderingControl, MASTER_CHANNEL};
pub use wan_ip_connection::{ConnectionStatus, PortMapping, PortMappingProtocol, WanIpConnection};

use soap_client::ActionResponse;
use std::str::FromStr;
use std::time::Duration;
use upnp_discovery::Service;

use crate::{ApiError, Result};

/// The `<family>` part of `urn:<domain>:service:<family>:<version>`
pub(crate) fn service_family(service_type: &str) -> Option<&str> {
    let mut parts = service_type.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(urn), Some(_domain), Some(kind), Some(family))
            if urn.eq_ignore_ascii_case("urn") && kind.eq_ignore_ascii_case("service") =>
        {
            Some(family)
        }
        _ => None,
    }
}

pub(crate) fn check_service(service: &Service, accepted: &[&str]) -> Result<()> {
    let supported = service_family(&service.service_type)
        .map(|family| accepted.iter().any(|a| a.eq_ignore_ascii_case(family)))
        .unwrap_or(false);

    if supported {
        Ok(())
    } else {
        Err(ApiError::UnsupportedService {
            expected: accepted.join(" or "),
            found: service.service_type.clone(),
        })
    }
}

/// Output argument that must be present; the value may be empty
pub(crate) fn required(response: &ActionResponse, action: &str, name: &str) -> Result<String> {
    response
        .get(name)
        .ok_or_else(|| ApiError::missing_argument(action, name))
}

pub(crate) fn required_parsed<T: FromStr>(response: &ActionResponse, action: &str, name: &str) -> Result<T> {
    let raw = required(response, action, name)?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidResponse(format!("{action}Response has invalid {name}: {raw:?}")))
}

/// UPnP boolean: `1`/`0`, `true`/`false`, `yes`/`no`
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn required_bool(response: &ActionResponse, action: &str, name: &str) -> Result<bool> {
    let raw = required(response, action, name)?;
    parse_bool(&raw)
        .ok_or_else(|| ApiError::InvalidResponse(format!("{action}Response has invalid {name}: {raw:?}")))
}

/// Parse `H+:MM:SS[.F+]`. Fractions are dropped; `NOT_IMPLEMENTED` and
/// empty values yield `None`.
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let whole = value.split('.').next()?;
    let mut fields = whole.split(':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds: u64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    let secs = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
    Some(Duration::from_secs(secs))
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
