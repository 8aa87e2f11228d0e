//! WANIPConnection / WANPPPConnection facet for internet gateway devices

use serde::Serialize;
use soap_client::{ActionArgument, ActionResponse};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use upnp_discovery::Service;

use super::{check_service, required, required_bool, required_parsed};
use crate::{ApiError, Result, UpnpClient};

const ACCEPTED: &[&str] = &["WANIPConnection", "WANPPPConnection"];

/// SpecifiedArrayIndexInvalid
const FAULT_INVALID_INDEX: u16 = 713;
/// NoSuchEntryInArray
const FAULT_NO_SUCH_ENTRY: u16 = 714;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortMappingProtocol {
    Tcp,
    Udp,
}

impl PortMappingProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortMappingProtocol::Tcp => "TCP",
            PortMappingProtocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for PortMappingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortMappingProtocol {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(PortMappingProtocol::Tcp),
            "UDP" => Ok(PortMappingProtocol::Udp),
            other => Err(ApiError::InvalidResponse(format!("unknown protocol {other:?}"))),
        }
    }
}

/// One entry of the gateway's port mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// `None` maps traffic from any remote host
    pub remote_host: Option<String>,
    pub external_port: u16,
    pub protocol: PortMappingProtocol,
    pub internal_port: u16,
    pub internal_client: String,
    pub enabled: bool,
    pub description: String,
    /// Seconds, 0 for a static mapping
    pub lease_duration: u32,
}

impl PortMapping {
    /// An enabled, permanent mapping of `external_port` to the same port on `internal_client`
    pub fn new(protocol: PortMappingProtocol, external_port: u16, internal_client: impl Into<String>) -> Self {
        Self {
            remote_host: None,
            external_port,
            protocol,
            internal_port: external_port,
            internal_client: internal_client.into(),
            enabled: true,
            description: String::new(),
            lease_duration: 0,
        }
    }

    pub fn with_internal_port(mut self, port: u16) -> Self {
        self.internal_port = port;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_lease_duration(mut self, seconds: u32) -> Self {
        self.lease_duration = seconds;
        self
    }

    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }
}

/// Result of `GetStatusInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// e.g. `Connected`, `Disconnected`
    pub connection_status: String,
    pub last_connection_error: String,
    /// Seconds since the connection came up
    pub uptime: u32,
}

/// Port mapping and address queries on a WAN connection service
#[derive(Debug, Clone, Copy)]
pub struct WanIpConnection<'a> {
    client: &'a UpnpClient,
    service: &'a Service,
}

impl<'a> WanIpConnection<'a> {
    /// Accepts both `WANIPConnection:*` and `WANPPPConnection:*` services
    pub fn try_from_service(client: &'a UpnpClient, service: &'a Service) -> Result<Self> {
        check_service(service, ACCEPTED)?;
        Ok(Self { client, service })
    }

    pub fn service(&self) -> &'a Service {
        self.service
    }

    /// Public address of the gateway, `None` while it has none
    pub fn get_external_ip_address(&self) -> Result<Option<IpAddr>> {
        let response = self.client.post_action(self.service, "GetExternalIPAddress", &[])?;
        let address = required(&response, "GetExternalIPAddress", "NewExternalIPAddress")?;
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }
        address
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidResponse(format!("invalid external address {address:?}")))
    }

    pub fn get_status_info(&self) -> Result<ConnectionStatus> {
        let response = self.client.post_action(self.service, "GetStatusInfo", &[])?;
        Ok(ConnectionStatus {
            connection_status: required(&response, "GetStatusInfo", "NewConnectionStatus")?,
            last_connection_error: response.get("NewLastConnectionError").unwrap_or_default(),
            uptime: required_parsed(&response, "GetStatusInfo", "NewUptime")?,
        })
    }

    pub fn add_port_mapping(&self, mapping: &PortMapping) -> Result<()> {
        if mapping.internal_client.trim().is_empty() {
            return Err(ApiError::InvalidParameter(
                "port mapping needs an internal client".to_string(),
            ));
        }

        let args = [
            ActionArgument::new("NewRemoteHost", mapping.remote_host.as_deref().unwrap_or("")),
            ActionArgument::new("NewExternalPort", mapping.external_port.to_string()),
            ActionArgument::new("NewProtocol", mapping.protocol.as_str()),
            ActionArgument::new("NewInternalPort", mapping.internal_port.to_string()),
            ActionArgument::new("NewInternalClient", mapping.internal_client.as_str()),
            ActionArgument::new("NewEnabled", if mapping.enabled { "1" } else { "0" }),
            ActionArgument::new("NewPortMappingDescription", mapping.description.as_str()),
            ActionArgument::new("NewLeaseDuration", mapping.lease_duration.to_string()),
        ];
        self.client.post_action(self.service, "AddPortMapping", &args)?;
        Ok(())
    }

    pub fn delete_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: PortMappingProtocol,
    ) -> Result<()> {
        let args = [
            ActionArgument::new("NewRemoteHost", remote_host.unwrap_or("")),
            ActionArgument::new("NewExternalPort", external_port.to_string()),
            ActionArgument::new("NewProtocol", protocol.as_str()),
        ];
        self.client.post_action(self.service, "DeletePortMapping", &args)?;
        Ok(())
    }

    /// Look up one mapping; `None` when the gateway has no such entry
    pub fn get_specific_port_mapping_entry(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: PortMappingProtocol,
    ) -> Result<Option<PortMapping>> {
        let args = [
            ActionArgument::new("NewRemoteHost", remote_host.unwrap_or("")),
            ActionArgument::new("NewExternalPort", external_port.to_string()),
            ActionArgument::new("NewProtocol", protocol.as_str()),
        ];
        let response = match self
            .client
            .post_action(self.service, "GetSpecificPortMappingEntry", &args)
        {
            Ok(response) => response,
            Err(e) if e.fault_code() == Some(FAULT_NO_SUCH_ENTRY) => return Ok(None),
            Err(e) => return Err(e),
        };

        const ACTION: &str = "GetSpecificPortMappingEntry";
        Ok(Some(PortMapping {
            remote_host: remote_host.filter(|h| !h.is_empty()).map(str::to_string),
            external_port,
            protocol,
            internal_port: required_parsed(&response, ACTION, "NewInternalPort")?,
            internal_client: required(&response, ACTION, "NewInternalClient")?,
            enabled: required_bool(&response, ACTION, "NewEnabled")?,
            description: response.get("NewPortMappingDescription").unwrap_or_default(),
            lease_duration: required_parsed(&response, ACTION, "NewLeaseDuration")?,
        }))
    }

    /// Entry at `index` of the mapping table; `None` past the end
    pub fn get_generic_port_mapping_entry(&self, index: u32) -> Result<Option<PortMapping>> {
        let args = [ActionArgument::new("NewPortMappingIndex", index.to_string())];
        match self
            .client
            .post_action(self.service, "GetGenericPortMappingEntry", &args)
        {
            Ok(response) => parse_generic_entry(&response).map(Some),
            Err(e) if matches!(e.fault_code(), Some(FAULT_INVALID_INDEX | FAULT_NO_SUCH_ENTRY)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walk the mapping table from index 0 until the gateway reports the end
    pub fn port_mappings(&self) -> Result<Vec<PortMapping>> {
        let mut mappings = Vec::new();
        let mut index = 0;
        while let Some(mapping) = self.get_generic_port_mapping_entry(index)? {
            mappings.push(mapping);
            index += 1;
        }
        Ok(mappings)
    }
}

fn parse_generic_entry(response: &ActionResponse) -> Result<PortMapping> {
    const ACTION: &str = "GetGenericPortMappingEntry";
    let remote_host = required(response, ACTION, "NewRemoteHost")?;
    Ok(PortMapping {
        remote_host: Some(remote_host).filter(|h| !h.trim().is_empty()),
        external_port: required_parsed(response, ACTION, "NewExternalPort")?,
        protocol: required_parsed(response, ACTION, "NewProtocol")?,
        internal_port: required_parsed(response, ACTION, "NewInternalPort")?,
        internal_client: required(response, ACTION, "NewInternalClient")?,
        enabled: required_bool(response, ACTION, "NewEnabled")?,
        description: response.get("NewPortMappingDescription").unwrap_or_default(),
        lease_duration: required_parsed(response, ACTION, "NewLeaseDuration")?,
    })
}
