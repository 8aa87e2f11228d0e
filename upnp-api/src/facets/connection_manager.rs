//! ConnectionManager facet for media servers and renderers

use serde::Serialize;
use soap_client::ActionArgument;
use upnp_discovery::Service;

use super::{check_service, required, required_parsed};
use crate::{ApiError, Result, UpnpClient};

const ACCEPTED: &[&str] = &["ConnectionManager"];

/// Protocol info strings (`<protocol>:<network>:<contentFormat>:<additionalInfo>`)
/// a device can send and receive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProtocolInfo {
    pub source: Vec<String>,
    pub sink: Vec<String>,
}

impl ProtocolInfo {
    /// Whether the device accepts content of `mime_type` over HTTP
    pub fn sink_supports(&self, mime_type: &str) -> bool {
        self.sink.iter().any(|entry| {
            let mut fields = entry.split(':');
            let protocol = fields.next().unwrap_or_default();
            let _network = fields.next();
            let format = fields.next().unwrap_or_default();
            protocol.eq_ignore_ascii_case("http-get")
                && (format == "*" || format.eq_ignore_ascii_case(mime_type))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub rcs_id: i32,
    pub av_transport_id: i32,
    pub protocol_info: String,
    pub peer_connection_manager: String,
    pub peer_connection_id: i32,
    /// `Input` or `Output`
    pub direction: String,
    /// e.g. `OK`, `ContentFormatMismatch`
    pub status: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionManager<'a> {
    client: &'a UpnpClient,
    service: &'a Service,
}

impl<'a> ConnectionManager<'a> {
    pub fn try_from_service(client: &'a UpnpClient, service: &'a Service) -> Result<Self> {
        check_service(service, ACCEPTED)?;
        Ok(Self { client, service })
    }

    pub fn service(&self) -> &'a Service {
        self.service
    }

    pub fn get_protocol_info(&self) -> Result<ProtocolInfo> {
        let response = self.client.post_action(self.service, "GetProtocolInfo", &[])?;
        Ok(ProtocolInfo {
            source: split_csv(&required(&response, "GetProtocolInfo", "Source")?),
            sink: split_csv(&required(&response, "GetProtocolInfo", "Sink")?),
        })
    }

    pub fn get_current_connection_ids(&self) -> Result<Vec<u32>> {
        let response = self
            .client
            .post_action(self.service, "GetCurrentConnectionIDs", &[])?;
        let ids = required(&response, "GetCurrentConnectionIDs", "ConnectionIDs")?;
        split_csv(&ids)
            .iter()
            .map(|id| {
                id.parse()
                    .map_err(|_| ApiError::InvalidResponse(format!("invalid connection id {id:?}")))
            })
            .collect()
    }

    pub fn get_current_connection_info(&self, connection_id: u32) -> Result<ConnectionInfo> {
        const ACTION: &str = "GetCurrentConnectionInfo";
        let args = [ActionArgument::new("ConnectionID", connection_id.to_string())];
        let response = self.client.post_action(self.service, ACTION, &args)?;
        Ok(ConnectionInfo {
            rcs_id: required_parsed(&response, ACTION, "RcsID")?,
            av_transport_id: required_parsed(&response, ACTION, "AVTransportID")?,
            protocol_info: required(&response, ACTION, "ProtocolInfo")?,
            peer_connection_manager: response.get("PeerConnectionManager").unwrap_or_default(),
            peer_connection_id: required_parsed(&response, ACTION, "PeerConnectionID")?,
            direction: required(&response, ACTION, "Direction")?,
            status: required(&response, ACTION, "Status")?,
        })
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
