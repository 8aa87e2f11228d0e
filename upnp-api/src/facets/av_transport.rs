//! AVTransport facet for media renderers

use serde::Serialize;
use soap_client::ActionArgument;
use std::fmt;
use std::time::Duration;
use upnp_discovery::Service;

use super::{check_service, format_duration, parse_duration, required, required_parsed};
use crate::{ApiError, Result, UpnpClient};

const ACCEPTED: &[&str] = &["AVTransport"];

/// Transport state as reported by `GetTransportInfo` and in LastChange events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransportState {
    Stopped,
    Playing,
    Transitioning,
    PausedPlayback,
    PausedRecording,
    Recording,
    NoMediaPresent,
    /// Vendor-defined state
    Other(String),
}

impl TransportState {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "STOPPED" => TransportState::Stopped,
            "PLAYING" => TransportState::Playing,
            "TRANSITIONING" => TransportState::Transitioning,
            "PAUSED_PLAYBACK" => TransportState::PausedPlayback,
            "PAUSED_RECORDING" => TransportState::PausedRecording,
            "RECORDING" => TransportState::Recording,
            "NO_MEDIA_PRESENT" => TransportState::NoMediaPresent,
            other => TransportState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::Transitioning => "TRANSITIONING",
            TransportState::PausedPlayback => "PAUSED_PLAYBACK",
            TransportState::PausedRecording => "PAUSED_RECORDING",
            TransportState::Recording => "RECORDING",
            TransportState::NoMediaPresent => "NO_MEDIA_PRESENT",
            TransportState::Other(s) => s,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportInfo {
    pub state: TransportState,
    /// `OK` or `ERROR_OCCURRED`
    pub status: String,
    pub speed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration: Option<Duration>,
    /// DIDL-Lite document, empty when the renderer has none
    pub track_metadata: String,
    pub track_uri: String,
    pub rel_time: Option<Duration>,
    pub abs_time: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub nr_tracks: u32,
    pub media_duration: Option<Duration>,
    pub current_uri: String,
    pub current_uri_metadata: String,
    pub next_uri: String,
}

/// Where `Seek` should move to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Position within the current track
    RelTime(Duration),
    /// Position within the whole media
    AbsTime(Duration),
    /// Track number, starting at 1
    TrackNr(u32),
}

impl SeekTarget {
    fn unit(&self) -> &'static str {
        match self {
            SeekTarget::RelTime(_) => "REL_TIME",
            SeekTarget::AbsTime(_) => "ABS_TIME",
            SeekTarget::TrackNr(_) => "TRACK_NR",
        }
    }

    fn target(&self) -> String {
        match self {
            SeekTarget::RelTime(d) | SeekTarget::AbsTime(d) => format_duration(*d),
            SeekTarget::TrackNr(n) => n.to_string(),
        }
    }
}

/// Playback control on a renderer's AVTransport service.
///
/// Every action takes the transport instance; renderers without
/// ConnectionManager::PrepareForConnection use instance 0.
#[derive(Debug, Clone, Copy)]
pub struct AvTransport<'a> {
    client: &'a UpnpClient,
    service: &'a Service,
}

impl<'a> AvTransport<'a> {
    pub fn try_from_service(client: &'a UpnpClient, service: &'a Service) -> Result<Self> {
        check_service(service, ACCEPTED)?;
        Ok(Self { client, service })
    }

    pub fn service(&self) -> &'a Service {
        self.service
    }

    /// Load `uri` into the transport. `metadata` is a DIDL-Lite document or
    /// empty; it is escaped on the wire.
    pub fn set_av_transport_uri(&self, instance_id: u32, uri: &str, metadata: &str) -> Result<()> {
        if uri.trim().is_empty() {
            return Err(ApiError::InvalidParameter("transport URI is empty".to_string()));
        }
        let args = [
            ActionArgument::new("InstanceID", instance_id.to_string()),
            ActionArgument::new("CurrentURI", uri),
            ActionArgument::new("CurrentURIMetaData", metadata),
        ];
        self.client.post_action(self.service, "SetAVTransportURI", &args)?;
        Ok(())
    }

    pub fn set_next_av_transport_uri(&self, instance_id: u32, uri: &str, metadata: &str) -> Result<()> {
        let args = [
            ActionArgument::new("InstanceID", instance_id.to_string()),
            ActionArgument::new("NextURI", uri),
            ActionArgument::new("NextURIMetaData", metadata),
        ];
        self.client.post_action(self.service, "SetNextAVTransportURI", &args)?;
        Ok(())
    }

    /// Start playback; `speed` is normally `"1"`
    pub fn play(&self, instance_id: u32, speed: &str) -> Result<()> {
        let args = [
            ActionArgument::new("InstanceID", instance_id.to_string()),
            ActionArgument::new("Speed", speed),
        ];
        self.client.post_action(self.service, "Play", &args)?;
        Ok(())
    }

    pub fn pause(&self, instance_id: u32) -> Result<()> {
        self.simple("Pause", instance_id)
    }

    pub fn stop(&self, instance_id: u32) -> Result<()> {
        self.simple("Stop", instance_id)
    }

    pub fn next(&self, instance_id: u32) -> Result<()> {
        self.simple("Next", instance_id)
    }

    pub fn previous(&self, instance_id: u32) -> Result<()> {
        self.simple("Previous", instance_id)
    }

    pub fn seek(&self, instance_id: u32, target: SeekTarget) -> Result<()> {
        let args = [
            ActionArgument::new("InstanceID", instance_id.to_string()),
            ActionArgument::new("Unit", target.unit()),
            ActionArgument::new("Target", target.target()),
        ];
        self.client.post_action(self.service, "Seek", &args)?;
        Ok(())
    }

    pub fn get_transport_info(&self, instance_id: u32) -> Result<TransportInfo> {
        const ACTION: &str = "GetTransportInfo";
        let response = self.client.post_action(self.service, ACTION, &[instance(instance_id)])?;
        Ok(TransportInfo {
            state: TransportState::parse(&required(&response, ACTION, "CurrentTransportState")?),
            status: response
                .get("CurrentTransportStatus")
                .unwrap_or_else(|| "OK".to_string()),
            speed: response.get("CurrentSpeed").unwrap_or_else(|| "1".to_string()),
        })
    }

    pub fn get_position_info(&self, instance_id: u32) -> Result<PositionInfo> {
        const ACTION: &str = "GetPositionInfo";
        let response = self.client.post_action(self.service, ACTION, &[instance(instance_id)])?;
        let duration_of = |name: &str| response.get(name).as_deref().and_then(parse_duration);
        Ok(PositionInfo {
            track: required_parsed(&response, ACTION, "Track")?,
            track_duration: duration_of("TrackDuration"),
            track_metadata: not_implemented_as_empty(response.get("TrackMetaData")),
            track_uri: response.get("TrackURI").unwrap_or_default(),
            rel_time: duration_of("RelTime"),
            abs_time: duration_of("AbsTime"),
        })
    }

    pub fn get_media_info(&self, instance_id: u32) -> Result<MediaInfo> {
        const ACTION: &str = "GetMediaInfo";
        let response = self.client.post_action(self.service, ACTION, &[instance(instance_id)])?;
        Ok(MediaInfo {
            nr_tracks: required_parsed(&response, ACTION, "NrTracks")?,
            media_duration: response.get("MediaDuration").as_deref().and_then(parse_duration),
            current_uri: response.get("CurrentURI").unwrap_or_default(),
            current_uri_metadata: not_implemented_as_empty(response.get("CurrentURIMetaData")),
            next_uri: not_implemented_as_empty(response.get("NextURI")),
        })
    }

    fn simple(&self, action: &str, instance_id: u32) -> Result<()> {
        self.client.post_action(self.service, action, &[instance(instance_id)])?;
        Ok(())
    }
}

fn instance(instance_id: u32) -> ActionArgument {
    ActionArgument::new("InstanceID", instance_id.to_string())
}

fn not_implemented_as_empty(value: Option<String>) -> String {
    value.filter(|v| v != "NOT_IMPLEMENTED").unwrap_or_default()
}
